//! Configuration parsing for the Vela trading agent.
//!
//! All components read their settings from a single JSON config file: the run
//! and trading modes, API credentials, and a `markets` array with one entry
//! per traded pair.
//!
//! # Example config
//!
//! ```json
//! {
//!   "run_type": "TEST",
//!   "trading_type": "SPOT",
//!   "allocated_currency": 50.0,
//!   "candle_interval": "1m",
//!   "markets": [
//!     { "base_asset": "BTC", "quote_asset": "USDT" },
//!     { "base_asset": "ETH", "quote_asset": "USDT" }
//!   ],
//!   "api": { "public_key": "...", "private_key": "..." }
//! }
//! ```

use serde::Deserialize;

use crate::error::VelaError;
use crate::pair::MarketPair;
use crate::types::enums::{RunType, TradingType};

/// Candle intervals the agent accepts.
pub const SUPPORTED_INTERVALS: &[&str] = &["1m", "3m", "5m", "15m", "30m", "1h", "4h"];

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// TEST (simulated fills) or REAL (live orders).
    pub run_type: RunType,

    /// SPOT (long book only) or MARGIN (long + short books).
    pub trading_type: TradingType,

    /// Quote currency each market is allowed to trade with (the allocation).
    pub allocated_currency: f64,

    /// Candle interval for the feed subscription (e.g. `"1m"`).
    pub candle_interval: String,

    /// Markets to trade — one trader task per entry.
    pub markets: Vec<MarketConfig>,

    /// API credentials (required for REAL runs and the user-data stream).
    pub api: Option<ApiConfig>,

    /// Candle window length kept per symbol (default: 500).
    pub max_candles: Option<usize>,

    /// Depth levels kept per symbol (default: 5).
    pub max_depth: Option<usize>,

    /// Directory for per-market cache records (default: `"cache"`).
    pub cache_dir: Option<String>,

    /// Maximum cache record age in seconds before it is ignored at startup
    /// (default: 1800).
    pub cache_max_age_secs: Option<u64>,

    /// Directory for per-market order logs (default: `"logs"`).
    pub order_log_dir: Option<String>,

    /// REST base URL override (default: Binance production).
    pub rest_url: Option<String>,

    /// WebSocket base URL override (default: Binance production).
    pub ws_url: Option<String>,
}

/// One traded market.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    pub base_asset: String,
    pub quote_asset: String,
}

impl MarketConfig {
    pub fn pair(&self) -> MarketPair {
        MarketPair::new(self.base_asset.clone(), self.quote_asset.clone())
    }
}

/// API credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub public_key: String,
    pub private_key: String,
    /// `recvWindow` for signed requests (ms, default 5000).
    pub recv_window: Option<u64>,
}

impl AppConfig {
    pub fn effective_max_candles(&self) -> usize {
        self.max_candles.unwrap_or(500)
    }

    pub fn effective_max_depth(&self) -> usize {
        self.max_depth.unwrap_or(5)
    }

    pub fn effective_cache_dir(&self) -> &str {
        self.cache_dir.as_deref().unwrap_or("cache")
    }

    pub fn effective_cache_max_age_secs(&self) -> u64 {
        self.cache_max_age_secs.unwrap_or(1800)
    }

    pub fn effective_order_log_dir(&self) -> &str {
        self.order_log_dir.as_deref().unwrap_or("logs")
    }

    pub fn effective_rest_url(&self) -> &str {
        self.rest_url.as_deref().unwrap_or("https://api.binance.com")
    }

    pub fn effective_ws_url(&self) -> &str {
        self.ws_url.as_deref().unwrap_or("wss://stream.binance.com:9443")
    }

    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), VelaError> {
        if self.markets.is_empty() {
            return Err(VelaError::Config("no markets configured".into()));
        }
        if self.allocated_currency <= 0.0 {
            return Err(VelaError::Config(
                "allocated_currency must be positive".into(),
            ));
        }
        if !SUPPORTED_INTERVALS.contains(&self.candle_interval.as_str()) {
            return Err(VelaError::Config(format!(
                "unsupported candle interval '{}'",
                self.candle_interval
            )));
        }
        if self.run_type == RunType::Real && self.api.is_none() {
            return Err(VelaError::Config(
                "REAL runs require api credentials".into(),
            ));
        }
        Ok(())
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

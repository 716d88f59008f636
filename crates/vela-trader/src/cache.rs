//! Per-market cache records.
//!
//! The full trader state is serialized to one JSON file per market, written
//! periodically while running and read once at startup. A restored record
//! resumes an in-flight round trip without re-querying trade history; records
//! older than the configured age are ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use vela_core::{
    MarketPrices, RuntimeState, SymbolRules, TradeRecord, WalletPair, time_util,
};

use crate::position::Position;
use crate::trader::TraderConfig;

// ---------------------------------------------------------------------------
// Record types
// ---------------------------------------------------------------------------

/// Runtime bookkeeping persisted alongside the positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateData {
    pub runtime_state: RuntimeState,
    /// The configured allocation this record was built with.
    pub base_allocation: f64,
    /// Realized outcomes of all completed round trips, net of commission.
    pub session_profit: f64,
    pub trades_completed: u32,
    pub last_update_ms: u64,
}

/// One market's complete trader state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraderRecord {
    pub configuration: TraderConfig,
    pub market_prices: MarketPrices,
    pub wallet_pair: WalletPair,
    pub long_position: Position,
    pub short_position: Option<Position>,
    pub trade_recorder: Vec<TradeRecord>,
    pub state_data: StateData,
    pub rules: SymbolRules,
}

/// On-disk wrapper stamping the write time.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    last_update_ms: u64,
    data: TraderRecord,
}

// ---------------------------------------------------------------------------
// TraderCache
// ---------------------------------------------------------------------------

/// Reads and writes per-market cache files under one directory.
pub struct TraderCache {
    dir: PathBuf,
    max_age: Duration,
}

impl TraderCache {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            max_age,
        }
    }

    fn file_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("trader_{symbol}.json"))
    }

    /// Load a market's record, or `None` when missing, stale, or unreadable.
    pub fn load(&self, symbol: &str) -> Option<TraderRecord> {
        let path = self.file_path(symbol);
        let envelope = read_envelope(&path).ok()?;

        let age_ms = time_util::now_ms().saturating_sub(envelope.last_update_ms);
        if age_ms > self.max_age.as_millis() as u64 {
            tracing::info!("[cache] record for {symbol} is stale ({age_ms} ms old), ignoring");
            return None;
        }

        Some(envelope.data)
    }

    /// Write a market's record, stamping the current time.
    pub fn save(&self, symbol: &str, record: &TraderRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating cache dir {}", self.dir.display()))?;

        let envelope = CacheEnvelope {
            last_update_ms: time_util::now_ms(),
            data: record.clone(),
        };

        let path = self.file_path(symbol);
        let json = serde_json::to_string(&envelope)?;
        std::fs::write(&path, json)
            .with_context(|| format!("writing cache file {}", path.display()))?;
        Ok(())
    }
}

fn read_envelope(path: &Path) -> Result<CacheEnvelope> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

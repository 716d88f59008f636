//! Trading-related data structures — orders, fills, wallets, and trade
//! records. These types flow between the trader state machine and the order
//! gateway, and are serialized verbatim into the per-market cache record.

use serde::{Deserialize, Serialize};

use super::enums::{ExecStatus, OrderKind, OrderSide, PositionSide, TradingType};

// ---------------------------------------------------------------------------
// Order request (trader → gateway)
// ---------------------------------------------------------------------------

/// An order request sent from a trader to the gateway.
///
/// `side` is the *exchange* direction (SHORT entries arrive here already
/// inverted to SELL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub trading_type: TradingType,
    /// Exchange symbol (e.g. `"BTCUSDT"`).
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    /// Quantity, already truncated to the symbol's lot-size digits.
    pub quantity: f64,
    /// Limit price (absent for market orders).
    pub price: Option<f64>,
    /// Stop trigger price (stop-loss variants and OCO).
    pub stop_price: Option<f64>,
    /// Stop-limit leg price (OCO).
    pub stop_limit_price: Option<f64>,
    /// Time in force for limit-style orders (`"GTC"`).
    pub time_in_force: Option<String>,
}

// ---------------------------------------------------------------------------
// Order ack (gateway → trader)
// ---------------------------------------------------------------------------

/// One fill reported inline with a placement ack (market orders).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderFill {
    pub price: f64,
    pub qty: f64,
}

/// Successful placement acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    /// Exchange-assigned order id.
    pub order_id: u64,
    /// Ack price (0.0 when the exchange does not echo one).
    pub price: f64,
    /// Immediate fills (market orders may fill in the ack).
    pub fills: Vec<OrderFill>,
    /// Set by the paper gateway: the simulated quantity for TEST runs.
    pub test_quantity: Option<f64>,
}

impl OrderAck {
    /// Best-known execution price: first fill, else the ack price.
    pub fn executed_price(&self) -> f64 {
        self.fills.first().map(|f| f.price).unwrap_or(self.price)
    }
}

// ---------------------------------------------------------------------------
// Push events (feed → trader)
// ---------------------------------------------------------------------------

/// An execution report pushed over the user-data stream.
///
/// `side` is the exchange direction of the reported order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub symbol: String,
    pub order_id: u64,
    pub side: OrderSide,
    pub status: ExecStatus,
    /// Cumulative filled quantity.
    pub fill_qty: f64,
    /// Last fill price.
    pub fill_price: f64,
    /// Exchange event time (ms since epoch) — monotonic per stream.
    pub event_time_ms: u64,
}

/// Free/locked amounts of one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    pub free: f64,
    pub locked: f64,
}

/// An account-balance delta pushed over the user-data stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceEvent {
    /// Exchange event time (ms since epoch), used for de-duplication.
    pub event_time_ms: u64,
    pub balances: Vec<AssetBalance>,
}

// ---------------------------------------------------------------------------
// WalletPair
// ---------------------------------------------------------------------------

/// Free/locked holdings of the traded pair's two assets.
///
/// Refreshed from push account events in REAL mode; a fixed placeholder in
/// TEST mode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WalletPair {
    pub base_free: f64,
    pub base_locked: f64,
    pub quote_free: f64,
    pub quote_locked: f64,
}

impl WalletPair {
    /// TEST-mode placeholder: the full allocation sits free in quote.
    pub fn placeholder(allocation: f64) -> Self {
        Self {
            quote_free: allocation,
            ..Self::default()
        }
    }

    /// Apply a push balance event. Assets not named in the event keep their
    /// previous values.
    pub fn apply_event(&mut self, event: &BalanceEvent, base_asset: &str, quote_asset: &str) {
        for b in &event.balances {
            if b.asset == base_asset {
                self.base_free = b.free;
                self.base_locked = b.locked;
            } else if b.asset == quote_asset {
                self.quote_free = b.free;
                self.quote_locked = b.locked;
            }
        }
    }

    /// Free amount of the named asset, if it is one of the pair.
    pub fn free_of(&self, asset: &str, base_asset: &str, quote_asset: &str) -> Option<f64> {
        if asset == base_asset {
            Some(self.base_free)
        } else if asset == quote_asset {
            Some(self.quote_free)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Margin account
// ---------------------------------------------------------------------------

/// One asset of the margin account, including outstanding loans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginAsset {
    pub asset: String,
    pub free: f64,
    pub borrowed: f64,
    pub interest: f64,
}

/// Margin account snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarginAccount {
    pub user_assets: Vec<MarginAsset>,
}

impl MarginAccount {
    /// Total amount owed for an asset: borrowed principal plus accrued
    /// interest.
    pub fn owed(&self, asset: &str) -> Option<f64> {
        self.user_assets
            .iter()
            .find(|a| a.asset == asset)
            .map(|a| a.borrowed + a.interest)
    }
}

// ---------------------------------------------------------------------------
// Symbol rules
// ---------------------------------------------------------------------------

/// Exchange quantization constraints, immutable per symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymbolRules {
    /// Fractional digits allowed on quantities (LOT_SIZE).
    pub lot_size_digits: u32,
    /// Fractional digits allowed on prices (PRICE_FILTER tick size).
    pub tick_size_digits: u32,
    /// Minimum order value in quote currency (MIN_NOTIONAL).
    pub min_notional: f64,
}

// ---------------------------------------------------------------------------
// Trade record
// ---------------------------------------------------------------------------

/// One completed order, appended to the trade recorder.
///
/// Records of one position book strictly alternate BUY, SELL, BUY, …
/// starting from BUY; a realized outcome exists only once a SELL record
/// closes the BUY it follows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub time_ms: u64,
    pub price: f64,
    pub quantity: f64,
    pub description: String,
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub kind: OrderKind,
}

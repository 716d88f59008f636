//! Market data structures flowing from the feed to the traders.
//!
//! The feed task owns the live candle window and depth book per symbol; each
//! update is sent to the owning trader as an immutable [`FeedEvent`] snapshot
//! over a per-symbol channel, so the trader never shares mutable state with
//! the feed.

use serde::{Deserialize, Serialize};

use super::trading::{BalanceEvent, ExecutionReport};

// ---------------------------------------------------------------------------
// Candle
// ---------------------------------------------------------------------------

/// One OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Candle open time (ms since epoch).
    pub open_time_ms: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

// ---------------------------------------------------------------------------
// Depth
// ---------------------------------------------------------------------------

/// One price level of the order book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: f64,
    pub qty: f64,
}

/// Top-of-book snapshot. `asks[0]` is the best (lowest) ask, `bids[0]` the
/// best (highest) bid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub asks: Vec<DepthLevel>,
    pub bids: Vec<DepthLevel>,
}

impl DepthSnapshot {
    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    /// Both sides populated.
    pub fn is_ready(&self) -> bool {
        !self.asks.is_empty() && !self.bids.is_empty()
    }
}

// ---------------------------------------------------------------------------
// MarketPrices
// ---------------------------------------------------------------------------

/// Last/ask/bid cache refreshed from the feed every tick.
///
/// Never persisted as ground truth — it is a per-tick view of the market.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketPrices {
    pub last_price: f64,
    pub ask_price: f64,
    pub bid_price: f64,
}

// ---------------------------------------------------------------------------
// FeedEvent — the per-symbol channel message
// ---------------------------------------------------------------------------

/// An immutable snapshot message from the feed task to one trader.
///
/// `seq` increases monotonically per feed instance and is used by the trader
/// for de-duplication of push events.
#[derive(Debug, Clone)]
pub struct FeedEvent {
    pub seq: u64,
    pub kind: FeedEventKind,
}

/// Payload of a [`FeedEvent`].
#[derive(Debug, Clone)]
pub enum FeedEventKind {
    /// Full candle window, most-recent-first, bounded length.
    Candles(Vec<Candle>),
    /// Top-of-book snapshot.
    Depth(DepthSnapshot),
    /// Order execution report from the user-data stream.
    Execution(ExecutionReport),
    /// Account balance delta from the user-data stream.
    Balance(BalanceEvent),
}

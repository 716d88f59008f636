//! Strategy conditions — the pluggable decision layer.
//!
//! Every tick the trader calls the entry function while its position is on
//! the BUY side and the exit function while on the SELL side. The returned
//! [`OrderIntent`] is either `Wait` (cancel anything outstanding and do
//! nothing) or a placeable order kind with its prices; the trade manager owns
//! quantities, quantization, and debouncing.

use vela_core::{Candle, MarketPrices, OrderKind, OrderSide, PositionSide};

use crate::indicators::IndicatorSet;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Read-only view of a position, enough for condition checks.
#[derive(Debug, Clone, Copy)]
pub struct PositionSnapshot {
    pub side: PositionSide,
    pub order_side: OrderSide,
    pub order_kind: OrderKind,
    /// Price of the order currently resting on the exchange (0 if none).
    pub order_price: f64,
    /// Entry price of the open round trip (0 while flat).
    pub buy_price: f64,
    pub buy_time_ms: u64,
    pub tokens_holding: f64,
}

/// Everything a strategy may look at for one decision.
pub struct ConditionCtx<'a> {
    pub position: PositionSnapshot,
    pub indicators: &'a IndicatorSet,
    pub prices: &'a MarketPrices,
    /// Candle window, most-recent-first.
    pub candles: &'a [Candle],
}

// ---------------------------------------------------------------------------
// OrderIntent
// ---------------------------------------------------------------------------

/// The strategy's answer: what kind of order (if any) should rest on the
/// exchange right now.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub kind: OrderKind,
    pub description: String,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    pub stop_limit_price: Option<f64>,
}

impl OrderIntent {
    /// No order should rest; cancel anything outstanding.
    pub fn wait() -> Self {
        Self {
            kind: OrderKind::Wait,
            description: String::new(),
            price: None,
            stop_price: None,
            stop_limit_price: None,
        }
    }

    /// A signal order — a limit order at the signal price.
    pub fn signal(description: impl Into<String>, price: f64) -> Self {
        Self {
            kind: OrderKind::Signal,
            description: description.into(),
            price: Some(price),
            stop_price: None,
            stop_limit_price: None,
        }
    }

    /// A stop-loss-limit order triggering at `stop_price`.
    pub fn stop_loss_limit(description: impl Into<String>, price: f64, stop_price: f64) -> Self {
        Self {
            kind: OrderKind::StopLossLimit,
            description: description.into(),
            price: Some(price),
            stop_price: Some(stop_price),
            stop_limit_price: Some(price),
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy trait
// ---------------------------------------------------------------------------

/// A trading strategy: entry/exit conditions plus an optional risk gate.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Called while the position is on the BUY side.
    fn entry(&self, ctx: &ConditionCtx<'_>) -> OrderIntent;

    /// Called while the position is on the SELL side.
    fn exit(&self, ctx: &ConditionCtx<'_>) -> OrderIntent;

    /// External risk gate evaluated before either condition; a `false`
    /// result blocks the position from ordering this tick.
    fn can_order(&self, _ctx: &ConditionCtx<'_>) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// MacdStrategy — the default
// ---------------------------------------------------------------------------

/// MACD crossover strategy with a fixed-percentage stop loss.
///
/// LONG entry: histogram positive, MACD line rising and above its signal.
/// LONG exit: MACD line below its signal, or price under the stop.
/// SHORT mirrors both conditions.
#[derive(Debug, Clone)]
pub struct MacdStrategy {
    pub stop_loss_pct: f64,
}

impl Default for MacdStrategy {
    fn default() -> Self {
        Self { stop_loss_pct: 0.02 }
    }
}

impl Strategy for MacdStrategy {
    fn name(&self) -> &str {
        "macd"
    }

    fn entry(&self, ctx: &ConditionCtx<'_>) -> OrderIntent {
        let m = &ctx.indicators.macd;
        if m.len() < 2 {
            return OrderIntent::wait();
        }

        match ctx.position.side {
            PositionSide::Long => {
                if m[0].hist > 0.0 && m[0].macd > m[1].macd && m[0].macd > m[0].signal {
                    return OrderIntent::signal("long entry signal", ctx.prices.bid_price);
                }
            }
            PositionSide::Short => {
                if m[0].hist < 0.0 && m[0].macd < m[1].macd && m[0].macd < m[0].signal {
                    return OrderIntent::signal("short entry signal", ctx.prices.ask_price);
                }
            }
        }

        OrderIntent::wait()
    }

    fn exit(&self, ctx: &ConditionCtx<'_>) -> OrderIntent {
        let m = &ctx.indicators.macd;
        if m.len() < 2 {
            return OrderIntent::wait();
        }

        let buy_price = ctx.position.buy_price;
        let last = ctx.prices.last_price;

        match ctx.position.side {
            PositionSide::Long => {
                if buy_price > 0.0 && last < buy_price * (1.0 - self.stop_loss_pct) {
                    let stop = buy_price * (1.0 - self.stop_loss_pct);
                    return OrderIntent::stop_loss_limit("long stop loss", stop, stop);
                }
                if m[0].macd < m[0].signal {
                    return OrderIntent::signal("long exit signal", ctx.prices.ask_price);
                }
            }
            PositionSide::Short => {
                if buy_price > 0.0 && last > buy_price * (1.0 + self.stop_loss_pct) {
                    let stop = buy_price * (1.0 + self.stop_loss_pct);
                    return OrderIntent::stop_loss_limit("short stop loss", stop, stop);
                }
                if m[0].macd > m[0].signal {
                    return OrderIntent::signal("short exit signal", ctx.prices.bid_price);
                }
            }
        }

        OrderIntent::wait()
    }
}

//! # vela-trader
//!
//! The per-market trading state machine — the core of the Vela agent.
//!
//! Each traded market gets one [`Trader`] running in its own tokio task,
//! holding exclusive ownership of its positions, wallet view, and trade
//! history. Every tick it:
//!
//! 1. drains its feed channel (candles, depth, push events),
//! 2. recomputes indicators and reconciles the wallet,
//! 3. runs the **order-status manager** — resolves fills against execution
//!    reports (REAL) or simulated price crossings (TEST),
//! 4. runs the **trade manager** — consults the strategy and places,
//!    replaces, or cancels the single outstanding order per side.
//!
//! Supporting modules: [`position`] (books + alternation-checked trade
//! recorder), [`cache`] (persisted per-market records), [`order_log`]
//! (round-trip audit lines).

pub mod cache;
pub mod order_log;
pub mod position;
pub mod trader;

mod order_status;
mod quantity;
mod trade_manager;

#[cfg(test)]
mod testkit;

pub use cache::{StateData, TraderCache, TraderRecord};
pub use order_log::OrderLog;
pub use position::{Position, TradeRecorder};
pub use trader::{Trader, TraderConfig, TraderController};

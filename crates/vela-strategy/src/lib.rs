//! # vela-strategy
//!
//! Indicator engine and strategy conditions for the Vela trading agent.
//!
//! - [`indicators`] — pure functions: candle history → named indicator series
//! - [`conditions`] — the [`Strategy`](conditions::Strategy) trait deciding
//!   order intents from indicators, prices, and the position snapshot
//!
//! Both layers are pluggable: the trader consumes the [`conditions::Strategy`]
//! trait and is agnostic to the indicator set behind it.

pub mod conditions;
pub mod indicators;

pub use conditions::{ConditionCtx, MacdStrategy, OrderIntent, PositionSnapshot, Strategy};
pub use indicators::IndicatorSet;

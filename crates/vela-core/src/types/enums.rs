//! Enumerations used throughout the trading agent.
//!
//! All state that used to be stringly-typed in ad-hoc trading bots is a closed
//! enum here, so invalid combinations are unrepresentable rather than
//! runtime-checked.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Run / market modes
// ---------------------------------------------------------------------------

/// Whether orders are placed for real or simulated against live prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunType {
    Test,
    Real,
}

/// The account type the agent trades on.
///
/// `Spot` trades the LONG book only; `Margin` additionally runs a SHORT book
/// backed by exchange loans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradingType {
    Spot,
    Margin,
}

// ---------------------------------------------------------------------------
// Order / position enums
// ---------------------------------------------------------------------------

/// Buy or sell direction, in *position* terms.
///
/// For a SHORT position the exchange-side direction is inverted (a SHORT
/// "buy" entry is an exchange SELL of borrowed tokens); see
/// [`PositionSide::exchange_side`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The opposite direction.
    pub fn flipped(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Which book a position belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Map a position-side order direction to the direction sent to the
    /// exchange. SHORT inverts: entry sells borrowed tokens, exit buys them
    /// back.
    pub fn exchange_side(self, side: OrderSide) -> OrderSide {
        match self {
            Self::Long => side,
            Self::Short => side.flipped(),
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// The kind of order a position currently wants or holds.
///
/// `Wait` and `Complete` are bookkeeping states (nothing resting on the
/// exchange); the remaining variants are placeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    Wait,
    Signal,
    Market,
    Limit,
    StopLoss,
    StopLossLimit,
    OcoLimit,
    Complete,
}

impl OrderKind {
    /// Whether this kind corresponds to a real exchange order.
    pub fn is_placeable(self) -> bool {
        !matches!(self, Self::Wait | Self::Complete)
    }
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Wait => "WAIT",
            Self::Signal => "SIGNAL",
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
            Self::StopLoss => "STOP_LOSS",
            Self::StopLossLimit => "STOP_LOSS_LIMIT",
            Self::OcoLimit => "OCO_LIMIT",
            Self::Complete => "COMPLETE",
        };
        write!(f, "{s}")
    }
}

/// Status of the single outstanding order of a position.
///
/// `Locked` means a partial fill is unresolved; the trade manager must not
/// replace or cancel a locked order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    Placed,
    Locked,
}

/// Round-trip status of a position book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketStatus {
    Trading,
    CompleteTrade,
}

// ---------------------------------------------------------------------------
// Execution report status
// ---------------------------------------------------------------------------

/// Order status reported by the exchange user-data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

// ---------------------------------------------------------------------------
// Trader runtime state
// ---------------------------------------------------------------------------

/// State of a trader's main loop.
///
/// `Stop` is terminal and cooperative: the loop observes it at the top of a
/// tick and exits after finishing the current tick — in-flight gateway calls
/// are never preempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuntimeState {
    /// Waiting for the first complete tick after startup.
    Setup,
    /// Normal operation.
    Run,
    /// Evaluation suspended.
    Standby,
    /// Evaluation suspended by an external override.
    ForceStandby,
    /// Evaluation suspended by the operator.
    ForcePause,
    /// Suspended until the quote balance exceeds the allocation again.
    PauseInsufBalance,
    /// A stale order id was seen; next tick resynchronizes order bookkeeping.
    CheckOrders,
    /// New BUY entries are blocked (drain mode during shutdown).
    ForcePreventBuy,
    /// Terminal.
    Stop,
}

impl RuntimeState {
    /// Whether position evaluation is suspended in this state.
    pub fn is_suspended(self) -> bool {
        matches!(
            self,
            Self::Standby | Self::ForceStandby | Self::ForcePause | Self::PauseInsufBalance
        )
    }
}

impl std::fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Setup => "SETUP",
            Self::Run => "RUN",
            Self::Standby => "STANDBY",
            Self::ForceStandby => "FORCE_STANDBY",
            Self::ForcePause => "FORCE_PAUSE",
            Self::PauseInsufBalance => "PAUSE_INSUFBALANCE",
            Self::CheckOrders => "CHECK_ORDERS",
            Self::ForcePreventBuy => "FORCE_PREVENT_BUY",
            Self::Stop => "STOP",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_flip() {
        assert_eq!(OrderSide::Buy.flipped(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.flipped(), OrderSide::Buy);
    }

    #[test]
    fn short_inverts_exchange_side() {
        assert_eq!(
            PositionSide::Short.exchange_side(OrderSide::Buy),
            OrderSide::Sell
        );
        assert_eq!(
            PositionSide::Long.exchange_side(OrderSide::Buy),
            OrderSide::Buy
        );
    }

    #[test]
    fn placeable_kinds() {
        assert!(OrderKind::Signal.is_placeable());
        assert!(OrderKind::StopLossLimit.is_placeable());
        assert!(!OrderKind::Wait.is_placeable());
        assert!(!OrderKind::Complete.is_placeable());
    }

    #[test]
    fn suspended_states() {
        assert!(RuntimeState::PauseInsufBalance.is_suspended());
        assert!(!RuntimeState::Run.is_suspended());
        assert!(!RuntimeState::CheckOrders.is_suspended());
    }
}

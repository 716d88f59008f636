//! Typed error definitions for the Vela trading agent.
//!
//! [`VelaError`] covers domain failures that are more informative than plain
//! `anyhow::Error` strings. [`GatewayError`] is the typed result of every
//! order-gateway operation; the trader's managers switch on its variants
//! explicitly instead of catching failures generically.

use thiserror::Error;

/// Binance rejection code for an order exceeding the available balance.
pub const CODE_INSUFFICIENT_BALANCE: i64 = -2010;

/// Domain-specific errors for the Vela trading agent.
#[derive(Debug, Error)]
pub enum VelaError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Market data feed connection or subscription error.
    #[error("feed error: {0}")]
    Feed(String),

    /// Market data or exchange response parsing error.
    #[error("parse error: {0}")]
    Parse(String),

    /// Trading state machine error (bookkeeping invariant violated).
    #[error("trading error: {0}")]
    Trading(String),
}

/// Typed failure of an order-gateway operation.
///
/// Transient failures are retried inside the gateway; only the variants below
/// surface to the trader.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Connection or transport failure that outlived the gateway's retries.
    #[error("gateway network error: {0}")]
    Network(String),

    /// The exchange throttled the request beyond the gateway's retries.
    #[error("gateway rate limited")]
    RateLimited,

    /// Business-rule rejection with the exchange's error code.
    #[error("gateway rejected (code {code}): {message}")]
    Rejected { code: i64, message: String },

    /// The referenced order id is unknown to the exchange (already filled,
    /// cancelled, or never existed).
    #[error("stale order id")]
    StaleOrder,
}

impl GatewayError {
    /// Whether this is the insufficient-balance rejection.
    pub fn is_insufficient_balance(&self) -> bool {
        matches!(
            self,
            Self::Rejected { code, .. } if *code == CODE_INSUFFICIENT_BALANCE
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_balance_detection() {
        let err = GatewayError::Rejected {
            code: CODE_INSUFFICIENT_BALANCE,
            message: "Account has insufficient balance".into(),
        };
        assert!(err.is_insufficient_balance());

        let other = GatewayError::Rejected {
            code: -1013,
            message: "Filter failure".into(),
        };
        assert!(!other.is_insufficient_balance());
        assert!(!GatewayError::StaleOrder.is_insufficient_balance());
    }
}

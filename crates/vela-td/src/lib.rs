//! # vela-td
//!
//! Order gateway for the Vela trading agent.
//!
//! The [`Gateway`] trait is the trader's only path to the exchange account:
//! order placement and cancellation, margin loans, and balance queries. Two
//! implementations ship:
//!
//! | Implementation | Used for                                   |
//! |----------------|--------------------------------------------|
//! | `binance`      | REAL runs — signed REST, retried internally |
//! | `paper`        | TEST runs — synthetic acks and balances     |
//!
//! Transient failures (connection drops, throttling) are retried with fixed
//! backoff *inside* the gateway; only typed [`GatewayError`]s surface, and the
//! trader's managers switch on them explicitly.

pub mod binance;
pub mod paper;

use async_trait::async_trait;
use vela_core::error::GatewayError;
use vela_core::{AssetBalance, MarginAccount, OrderAck, OrderRequest, TradingType};

/// Trait implemented by all order gateways.
///
/// All operations take `&self`; implementations are safe to share between
/// trader tasks behind an `Arc`.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Submit a new order. The request's quantity and prices are already
    /// quantized to the symbol's rules.
    async fn place_order(&self, req: &OrderRequest) -> Result<OrderAck, GatewayError>;

    /// Cancel an existing order by exchange id.
    async fn cancel_order(
        &self,
        trading_type: TradingType,
        symbol: &str,
        order_id: u64,
    ) -> Result<(), GatewayError>;

    /// Cancel the open OCO order list for a symbol.
    async fn cancel_oco_order(&self, symbol: &str) -> Result<(), GatewayError>;

    /// Apply for a margin loan. Returns the transaction id.
    async fn borrow(&self, asset: &str, amount: f64) -> Result<u64, GatewayError>;

    /// Repay a margin loan.
    async fn repay(&self, asset: &str, amount: f64) -> Result<(), GatewayError>;

    /// Free/locked balance of one asset.
    async fn get_balance(&self, asset: &str) -> Result<AssetBalance, GatewayError>;

    /// Margin account snapshot including outstanding loans and interest.
    async fn get_margin_account(&self) -> Result<MarginAccount, GatewayError>;
}

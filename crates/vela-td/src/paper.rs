//! Paper gateway — the TEST-run implementation of [`Gateway`](crate::Gateway).
//!
//! Accepts every order with a synthetic ack carrying the requested quantity
//! (`test_quantity`); the trader's order-status manager simulates fills by
//! price crossing against live market data. Loans are tracked in memory so a
//! margin TEST run exercises the same borrow/repay bookkeeping as a real one.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;
use vela_core::error::GatewayError;
use vela_core::{
    AssetBalance, MarginAccount, MarginAsset, OrderAck, OrderRequest, TradingType,
};

/// In-memory gateway for simulated runs.
pub struct PaperGateway {
    next_order_id: AtomicU64,
    next_tran_id: AtomicU64,
    /// asset → free balance.
    balances: Mutex<HashMap<String, f64>>,
    /// asset → outstanding borrowed amount.
    loans: Mutex<HashMap<String, f64>>,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self {
            next_order_id: AtomicU64::new(1),
            next_tran_id: AtomicU64::new(1),
            balances: Mutex::new(HashMap::new()),
            loans: Mutex::new(HashMap::new()),
        }
    }

    /// Seed a free balance (builder style).
    pub fn with_balance(self, asset: &str, free: f64) -> Self {
        self.balances
            .lock()
            .expect("paper balances poisoned")
            .insert(asset.to_string(), free);
        self
    }
}

impl Default for PaperGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl crate::Gateway for PaperGateway {
    async fn place_order(&self, req: &OrderRequest) -> Result<OrderAck, GatewayError> {
        let order_id = self.next_order_id.fetch_add(1, Ordering::Relaxed);
        info!(
            "[paper-td] accepted {} {} {} qty={} price={:?} (order {order_id})",
            req.symbol, req.side, req.kind, req.quantity, req.price
        );

        Ok(OrderAck {
            order_id,
            price: req.price.unwrap_or(0.0),
            fills: Vec::new(),
            test_quantity: Some(req.quantity),
        })
    }

    async fn cancel_order(
        &self,
        _trading_type: TradingType,
        symbol: &str,
        order_id: u64,
    ) -> Result<(), GatewayError> {
        info!("[paper-td] cancelled order {order_id} on {symbol}");
        Ok(())
    }

    async fn cancel_oco_order(&self, symbol: &str) -> Result<(), GatewayError> {
        info!("[paper-td] cancelled OCO list on {symbol}");
        Ok(())
    }

    async fn borrow(&self, asset: &str, amount: f64) -> Result<u64, GatewayError> {
        let mut loans = self.loans.lock().expect("paper loans poisoned");
        *loans.entry(asset.to_string()).or_insert(0.0) += amount;

        let tran_id = self.next_tran_id.fetch_add(1, Ordering::Relaxed);
        info!("[paper-td] borrowed {amount} {asset} (tran {tran_id})");
        Ok(tran_id)
    }

    async fn repay(&self, asset: &str, amount: f64) -> Result<(), GatewayError> {
        let mut loans = self.loans.lock().expect("paper loans poisoned");
        let owed = loans.entry(asset.to_string()).or_insert(0.0);
        *owed = (*owed - amount).max(0.0);

        info!("[paper-td] repaid {amount} {asset}");
        Ok(())
    }

    async fn get_balance(&self, asset: &str) -> Result<AssetBalance, GatewayError> {
        let balances = self.balances.lock().expect("paper balances poisoned");
        Ok(AssetBalance {
            asset: asset.to_string(),
            free: balances.get(asset).copied().unwrap_or(0.0),
            locked: 0.0,
        })
    }

    async fn get_margin_account(&self) -> Result<MarginAccount, GatewayError> {
        let loans = self.loans.lock().expect("paper loans poisoned");
        let user_assets = loans
            .iter()
            .map(|(asset, &borrowed)| MarginAsset {
                asset: asset.clone(),
                free: 0.0,
                borrowed,
                interest: 0.0,
            })
            .collect();

        Ok(MarginAccount { user_assets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Gateway;
    use vela_core::{OrderKind, OrderSide};

    fn request(qty: f64) -> OrderRequest {
        OrderRequest {
            trading_type: TradingType::Spot,
            symbol: "BTCUSDT".into(),
            side: OrderSide::Buy,
            kind: OrderKind::Signal,
            quantity: qty,
            price: Some(100.0),
            stop_price: None,
            stop_limit_price: None,
            time_in_force: Some("GTC".into()),
        }
    }

    #[tokio::test]
    async fn acks_carry_test_quantity() {
        let gw = PaperGateway::new();
        let ack = gw.place_order(&request(0.5)).await.unwrap();
        assert_eq!(ack.test_quantity, Some(0.5));
        assert_eq!(ack.price, 100.0);

        let second = gw.place_order(&request(0.1)).await.unwrap();
        assert!(second.order_id > ack.order_id);
    }

    #[tokio::test]
    async fn seeded_balances_are_returned() {
        let gw = PaperGateway::new().with_balance("USDT", 250.0);
        assert_eq!(gw.get_balance("USDT").await.unwrap().free, 250.0);
        assert_eq!(gw.get_balance("BTC").await.unwrap().free, 0.0);
    }

    #[tokio::test]
    async fn loans_are_tracked() {
        let gw = PaperGateway::new();
        gw.borrow("BTC", 0.4).await.unwrap();
        assert_eq!(gw.get_margin_account().await.unwrap().owed("BTC"), Some(0.4));

        gw.repay("BTC", 0.4).await.unwrap();
        assert_eq!(gw.get_margin_account().await.unwrap().owed("BTC"), Some(0.0));
    }
}

//! Shared test fixtures: a call-recording mock gateway, a scriptable
//! strategy, and a trader harness wired with both.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use vela_core::error::GatewayError;
use vela_core::pair::MarketPair;
use vela_core::{
    AssetBalance, Candle, DepthLevel, DepthSnapshot, FeedEvent, MarginAccount, MarginAsset,
    OrderAck, OrderRequest, RunType, SymbolRules, TradingType,
};
use vela_strategy::{ConditionCtx, OrderIntent, Strategy};
use vela_td::Gateway;

use crate::trader::{Trader, TraderConfig, TraderController};

// ---------------------------------------------------------------------------
// MockGateway
// ---------------------------------------------------------------------------

/// One recorded gateway interaction.
#[derive(Debug, Clone)]
pub(crate) enum Call {
    Place(OrderRequest),
    Cancel(u64),
    CancelOco,
    Borrow(String, f64),
    Repay(String, f64),
    MarginAccount,
}

/// Gateway double that records every call and answers from scripts.
pub(crate) struct MockGateway {
    calls: Mutex<Vec<Call>>,
    next_order_id: AtomicU64,
    next_tran_id: AtomicU64,
    place_results: Mutex<VecDeque<Result<OrderAck, GatewayError>>>,
    stale_next_cancel: AtomicBool,
    margin_owed: Mutex<HashMap<String, f64>>,
}

impl MockGateway {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_order_id: AtomicU64::new(1),
            next_tran_id: AtomicU64::new(1),
            place_results: Mutex::new(VecDeque::new()),
            stale_next_cancel: AtomicBool::new(false),
            margin_owed: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn place_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Place(_)))
            .count()
    }

    pub(crate) fn cancel_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Cancel(_) | Call::CancelOco))
            .count()
    }

    /// Queue the result of the next placement (default: synthetic ack).
    pub(crate) fn push_place_result(&self, result: Result<OrderAck, GatewayError>) {
        self.place_results.lock().unwrap().push_back(result);
    }

    pub(crate) fn fail_next_cancel_with_stale(&self) {
        self.stale_next_cancel.store(true, Ordering::Relaxed);
    }

    pub(crate) fn set_margin_owed(&self, asset: &str, owed: f64) {
        self.margin_owed
            .lock()
            .unwrap()
            .insert(asset.to_string(), owed);
    }

    pub(crate) fn repaid(&self, asset: &str, amount: f64) -> bool {
        self.calls()
            .iter()
            .any(|c| matches!(c, Call::Repay(a, q) if a == asset && *q == amount))
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn place_order(&self, req: &OrderRequest) -> Result<OrderAck, GatewayError> {
        self.record(Call::Place(req.clone()));

        if let Some(scripted) = self.place_results.lock().unwrap().pop_front() {
            return scripted;
        }

        Ok(OrderAck {
            order_id: self.next_order_id.fetch_add(1, Ordering::Relaxed),
            price: req.price.unwrap_or(0.0),
            fills: Vec::new(),
            test_quantity: Some(req.quantity),
        })
    }

    async fn cancel_order(
        &self,
        _trading_type: TradingType,
        _symbol: &str,
        order_id: u64,
    ) -> Result<(), GatewayError> {
        self.record(Call::Cancel(order_id));
        if self.stale_next_cancel.swap(false, Ordering::Relaxed) {
            return Err(GatewayError::StaleOrder);
        }
        Ok(())
    }

    async fn cancel_oco_order(&self, _symbol: &str) -> Result<(), GatewayError> {
        self.record(Call::CancelOco);
        Ok(())
    }

    async fn borrow(&self, asset: &str, amount: f64) -> Result<u64, GatewayError> {
        self.record(Call::Borrow(asset.to_string(), amount));
        Ok(self.next_tran_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn repay(&self, asset: &str, amount: f64) -> Result<(), GatewayError> {
        self.record(Call::Repay(asset.to_string(), amount));
        Ok(())
    }

    async fn get_balance(&self, asset: &str) -> Result<AssetBalance, GatewayError> {
        Ok(AssetBalance {
            asset: asset.to_string(),
            free: 0.0,
            locked: 0.0,
        })
    }

    async fn get_margin_account(&self) -> Result<MarginAccount, GatewayError> {
        self.record(Call::MarginAccount);
        let owed = self.margin_owed.lock().unwrap();
        Ok(MarginAccount {
            user_assets: owed
                .iter()
                .map(|(asset, &borrowed)| MarginAsset {
                    asset: asset.clone(),
                    free: 0.0,
                    borrowed,
                    interest: 0.0,
                })
                .collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedStrategy
// ---------------------------------------------------------------------------

/// Strategy whose entry/exit intents are set directly by the test.
pub(crate) struct ScriptedStrategy {
    entry: Mutex<OrderIntent>,
    exit: Mutex<OrderIntent>,
}

impl ScriptedStrategy {
    pub(crate) fn new() -> Self {
        Self {
            entry: Mutex::new(OrderIntent::wait()),
            exit: Mutex::new(OrderIntent::wait()),
        }
    }

    pub(crate) fn set_entry(&self, intent: OrderIntent) {
        *self.entry.lock().unwrap() = intent;
    }

    pub(crate) fn set_exit(&self, intent: OrderIntent) {
        *self.exit.lock().unwrap() = intent;
    }
}

impl Strategy for ScriptedStrategy {
    fn name(&self) -> &str {
        "scripted"
    }

    fn entry(&self, _ctx: &ConditionCtx<'_>) -> OrderIntent {
        self.entry.lock().unwrap().clone()
    }

    fn exit(&self, _ctx: &ConditionCtx<'_>) -> OrderIntent {
        self.exit.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// TraderHarness
// ---------------------------------------------------------------------------

/// A trader wired to the mock gateway and scripted strategy.
pub(crate) struct TraderHarness {
    pub(crate) trader: Trader,
    pub(crate) gateway: Arc<MockGateway>,
    pub(crate) strategy: Arc<ScriptedStrategy>,
    /// Keeps the feed channel open; tests drive the trader fields directly.
    #[allow(dead_code)]
    pub(crate) feed_tx: mpsc::UnboundedSender<FeedEvent>,
    pub(crate) controller: TraderController,
}

impl TraderHarness {
    fn build(run_type: RunType, trading_type: TradingType) -> Self {
        let gateway = Arc::new(MockGateway::new());
        let strategy = Arc::new(ScriptedStrategy::new());
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();

        let config = TraderConfig {
            pair: MarketPair::new("BTC", "USDT"),
            run_type,
            trading_type,
            allocation: 10.0,
        };
        let rules = SymbolRules {
            lot_size_digits: 3,
            tick_size_digits: 2,
            min_notional: 1.0,
        };

        let (trader, controller) = Trader::new(
            config,
            rules,
            Arc::clone(&gateway) as Arc<dyn Gateway>,
            Arc::clone(&strategy) as Arc<dyn Strategy>,
            feed_rx,
            None,
            None,
        );

        Self {
            trader,
            gateway,
            strategy,
            feed_tx,
            controller,
        }
    }

    pub(crate) fn spot_test() -> Self {
        Self::build(RunType::Test, TradingType::Spot)
    }

    pub(crate) fn spot_real() -> Self {
        Self::build(RunType::Real, TradingType::Spot)
    }

    pub(crate) fn margin_test() -> Self {
        Self::build(RunType::Test, TradingType::Margin)
    }

    pub(crate) fn margin_real() -> Self {
        Self::build(RunType::Real, TradingType::Margin)
    }
}

// ---------------------------------------------------------------------------
// Fixture builders
// ---------------------------------------------------------------------------

/// A one-candle window at the given close.
pub(crate) fn single_candle(close: f64) -> Vec<Candle> {
    vec![Candle {
        open_time_ms: 1_700_000_000_000,
        open: close,
        high: close,
        low: close,
        close,
        volume: 1.0,
    }]
}

/// A one-level book.
pub(crate) fn depth(ask: f64, bid: f64) -> DepthSnapshot {
    DepthSnapshot {
        asks: vec![DepthLevel { price: ask, qty: 1.0 }],
        bids: vec![DepthLevel { price: bid, qty: 1.0 }],
    }
}

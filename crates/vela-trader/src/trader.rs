//! The per-market trading state machine.
//!
//! One `Trader` instance runs per traded market, in its own tokio task. Every
//! tick it drains its feed channel, recomputes indicators, reconciles the
//! wallet against push events, and drives both managers over each applicable
//! position: the order-status manager (fill reconciliation, `order_status`)
//! followed by the trade manager (condition checking and order placement,
//! `trade_manager`).
//!
//! The trader owns all of its mutable state exclusively; nothing else writes
//! to its positions or wallet. Cancellation is cooperative — a stop request
//! is observed at the top of the next tick, and in-flight gateway calls from
//! the current tick always complete.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use vela_core::dedup::EventSeqDedup;
use vela_core::pair::MarketPair;
use vela_core::{
    Candle, DepthSnapshot, ExecutionReport, FeedEvent, FeedEventKind, MarketPrices, MarketStatus,
    PositionSide, RunType, RuntimeState, SymbolRules, TradingType, WalletPair, time_util,
};
use vela_strategy::{IndicatorSet, PositionSnapshot, Strategy};
use vela_td::Gateway;

use crate::cache::{StateData, TraderRecord};
use crate::order_log::OrderLog;
use crate::position::{Position, TradeRecorder};

/// Base sleep between ticks.
pub(crate) const TICK_INTERVAL: Duration = Duration::from_secs(4);

/// Poll interval while waiting for the first feed data.
const STARTUP_POLL: Duration = Duration::from_secs(1);

/// Courtesy pause between position passes within one tick.
const POSITION_PAUSE: Duration = Duration::from_millis(800);

/// Flat commission applied to the session profit figure per round trip.
pub(crate) const COMMISSION_FEE: f64 = 0.00075;

// ---------------------------------------------------------------------------
// Configuration & controller
// ---------------------------------------------------------------------------

/// Immutable per-trader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraderConfig {
    pub pair: MarketPair,
    pub run_type: RunType,
    pub trading_type: TradingType,
    /// Quote currency the trader is allowed to trade with.
    pub allocation: f64,
}

impl TraderConfig {
    pub fn symbol(&self) -> String {
        self.pair.symbol()
    }
}

/// Handle held by the runner: cooperative stop plus a live state snapshot.
pub struct TraderController {
    stop: Arc<AtomicBool>,
    drain: Arc<AtomicBool>,
    pub snapshot: watch::Receiver<TraderRecord>,
}

impl TraderController {
    /// Request a cooperative stop; observed at the top of the next tick.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Block new BUY entries while letting open round trips finish
    /// (`ForcePreventBuy`).
    pub fn prevent_new_entries(&self) {
        self.drain.store(true, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Trader
// ---------------------------------------------------------------------------

/// The per-market trading state machine.
pub struct Trader {
    pub(crate) config: TraderConfig,
    pub(crate) rules: SymbolRules,
    pub(crate) gateway: Arc<dyn Gateway>,
    pub(crate) strategy: Arc<dyn Strategy>,
    feed_rx: mpsc::UnboundedReceiver<FeedEvent>,

    // Live market view, refreshed each tick from feed events.
    pub(crate) candles: Vec<Candle>,
    pub(crate) depth: DepthSnapshot,
    pub(crate) indicators: IndicatorSet,
    pub(crate) market_prices: MarketPrices,
    pub(crate) wallet: WalletPair,
    dedup: EventSeqDedup,
    pub(crate) pending_reports: VecDeque<ExecutionReport>,
    /// Fills awaiting wallet confirmation; retried next tick.
    pub(crate) deferred_reports: Vec<ExecutionReport>,

    // Books.
    pub(crate) long: Position,
    pub(crate) short: Option<Position>,
    pub(crate) recorder: TradeRecorder,

    pub(crate) state: RuntimeState,
    pub(crate) session_profit: f64,
    pub(crate) trades_completed: u32,
    last_update_ms: u64,

    pub(crate) order_log: Option<OrderLog>,
    stop_flag: Arc<AtomicBool>,
    drain_flag: Arc<AtomicBool>,
    snapshot_tx: watch::Sender<TraderRecord>,
}

impl Trader {
    /// Build a trader, optionally resuming from a cached record.
    pub fn new(
        config: TraderConfig,
        rules: SymbolRules,
        gateway: Arc<dyn Gateway>,
        strategy: Arc<dyn Strategy>,
        feed_rx: mpsc::UnboundedReceiver<FeedEvent>,
        order_log: Option<OrderLog>,
        restore: Option<TraderRecord>,
    ) -> (Self, TraderController) {
        let allocation = config.allocation;

        let mut long = Position::new(PositionSide::Long, allocation);
        let mut short = match config.trading_type {
            TradingType::Margin => Some(Position::new(PositionSide::Short, allocation)),
            TradingType::Spot => None,
        };
        let mut recorder = TradeRecorder::new();
        let mut wallet = match config.run_type {
            RunType::Test => WalletPair::placeholder(allocation),
            RunType::Real => WalletPair::default(),
        };
        let mut session_profit = 0.0;
        let mut trades_completed = 0;

        if let Some(record) = restore {
            info!(
                "[trader] {} resuming from cached record ({} trades recorded)",
                config.pair,
                record.trade_recorder.len()
            );
            long = record.long_position;
            short = record.short_position;
            recorder = TradeRecorder::from_records(record.trade_recorder);
            wallet = record.wallet_pair;
            session_profit = record.state_data.session_profit;
            trades_completed = record.state_data.trades_completed;
        }

        let stop_flag = Arc::new(AtomicBool::new(false));
        let drain_flag = Arc::new(AtomicBool::new(false));

        let initial_record = TraderRecord {
            configuration: config.clone(),
            market_prices: MarketPrices::default(),
            wallet_pair: wallet.clone(),
            long_position: long.clone(),
            short_position: short.clone(),
            trade_recorder: recorder.records().to_vec(),
            state_data: StateData {
                runtime_state: RuntimeState::Setup,
                base_allocation: allocation,
                session_profit,
                trades_completed,
                last_update_ms: 0,
            },
            rules,
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(initial_record);

        let trader = Self {
            config,
            rules,
            gateway,
            strategy,
            feed_rx,
            candles: Vec::new(),
            depth: DepthSnapshot::default(),
            indicators: IndicatorSet::default(),
            market_prices: MarketPrices::default(),
            wallet,
            dedup: EventSeqDedup::new(),
            pending_reports: VecDeque::new(),
            deferred_reports: Vec::new(),
            long,
            short,
            recorder,
            state: RuntimeState::Setup,
            session_profit,
            trades_completed,
            last_update_ms: 0,
            order_log,
            stop_flag: Arc::clone(&stop_flag),
            drain_flag: Arc::clone(&drain_flag),
            snapshot_tx,
        };

        let controller = TraderController {
            stop: stop_flag,
            drain: drain_flag,
            snapshot: snapshot_rx,
        };
        (trader, controller)
    }

    /// Run the trader until stopped. Never returns early on tick errors.
    pub async fn run(mut self) -> Result<()> {
        let pair = self.config.pair.clone();
        info!("[trader] {pair} waiting for market data");

        // Block until the feed has delivered candles and a depth snapshot.
        loop {
            if self.stop_flag.load(Ordering::Relaxed) {
                self.state = RuntimeState::Stop;
                info!("[trader] {pair} stopped before first data");
                return Ok(());
            }
            self.drain_feed();
            if !self.candles.is_empty() && self.depth.is_ready() {
                break;
            }
            tokio::time::sleep(STARTUP_POLL).await;
        }

        self.state = RuntimeState::Setup;
        info!("[trader] {pair} started ({:?})", self.config.run_type);

        while self.state != RuntimeState::Stop {
            if self.stop_flag.load(Ordering::Relaxed) {
                self.state = RuntimeState::Stop;
                break;
            }

            // No error inside a tick may kill the loop.
            if let Err(e) = self.tick().await {
                error!("[trader] {pair} tick failed: {e:#}");
            }
            self.publish_snapshot();

            tokio::time::sleep(TICK_INTERVAL).await;
        }

        self.publish_snapshot();
        info!("[trader] {pair} stopped");
        Ok(())
    }

    /// One pass of the state machine.
    pub(crate) async fn tick(&mut self) -> Result<()> {
        self.drain_feed();
        self.indicators = IndicatorSet::compute(&self.candles);
        self.refresh_prices();

        // Drain mode: open round trips keep running, new entries stop.
        if self.drain_flag.load(Ordering::Relaxed) && self.state == RuntimeState::Run {
            info!("[trader] {} entering drain mode", self.config.pair);
            self.state = RuntimeState::ForcePreventBuy;
        }

        // Resume after the quote balance recovered.
        if self.state == RuntimeState::PauseInsufBalance
            && self.wallet.quote_free > self.config.allocation
        {
            info!(
                "[trader] {} quote balance recovered, resuming",
                self.config.pair
            );
            self.state = RuntimeState::Run;
        }

        // Resynchronize after a stale order id.
        if self.state == RuntimeState::CheckOrders {
            self.resync_orders();
            self.state = RuntimeState::Run;
        }

        if !self.state.is_suspended() {
            let sides = self.position_sides();
            for (i, side) in sides.iter().copied().enumerate() {
                if self.position_excluded(side) {
                    continue;
                }

                self.begin_pass(side);
                self.order_status_manager(side).await?;

                let pos = self.position(side);
                let evaluating = matches!(
                    self.state,
                    RuntimeState::Run | RuntimeState::ForcePreventBuy
                );
                if pos.can_order && evaluating && pos.market_status == MarketStatus::Trading {
                    self.trade_manager(side).await?;
                }

                if i + 1 < sides.len() {
                    tokio::time::sleep(POSITION_PAUSE).await;
                }
            }
        }

        // Leftover reports matched no position — ignore and log.
        for report in self.pending_reports.drain(..) {
            warn!(
                "[trader] {} ignoring unrecognized execution report (order {})",
                self.config.pair, report.order_id
            );
        }

        // Fills that await wallet confirmation are retried next tick.
        self.pending_reports.extend(self.deferred_reports.drain(..));

        if self.state == RuntimeState::Setup {
            self.state = RuntimeState::Run;
        }
        self.last_update_ms = time_util::now_ms();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Feed intake
    // -----------------------------------------------------------------------

    /// Drain the feed channel into the trader's own state.
    fn drain_feed(&mut self) {
        while let Ok(event) = self.feed_rx.try_recv() {
            match event.kind {
                FeedEventKind::Candles(candles) => self.candles = candles,
                FeedEventKind::Depth(depth) => self.depth = depth,
                FeedEventKind::Execution(report) => {
                    if self.config.run_type == RunType::Real
                        && self.dedup.accept("execution", report.event_time_ms)
                    {
                        self.pending_reports.push_back(report);
                    }
                }
                FeedEventKind::Balance(balance) => {
                    // Wallet reconciliation: only strictly newer events apply.
                    if self.config.run_type == RunType::Real
                        && self.dedup.accept("balance", balance.event_time_ms)
                    {
                        self.wallet.apply_event(
                            &balance,
                            &self.config.pair.base_asset,
                            &self.config.pair.quote_asset,
                        );
                    }
                }
            }
        }
    }

    fn refresh_prices(&mut self) {
        if let Some(newest) = self.candles.first() {
            self.market_prices.last_price = newest.close;
        }
        if let Some(ask) = self.depth.best_ask() {
            self.market_prices.ask_price = ask;
        }
        if let Some(bid) = self.depth.best_bid() {
            self.market_prices.bid_price = bid;
        }
    }

    // -----------------------------------------------------------------------
    // Position access & pass bookkeeping
    // -----------------------------------------------------------------------

    pub(crate) fn position_sides(&self) -> Vec<PositionSide> {
        match self.config.trading_type {
            TradingType::Spot => vec![PositionSide::Long],
            TradingType::Margin => vec![PositionSide::Long, PositionSide::Short],
        }
    }

    pub(crate) fn position(&self, side: PositionSide) -> &Position {
        match side {
            PositionSide::Long => &self.long,
            PositionSide::Short => self
                .short
                .as_ref()
                .expect("short position exists only under margin"),
        }
    }

    pub(crate) fn position_mut(&mut self, side: PositionSide) -> &mut Position {
        match side {
            PositionSide::Long => &mut self.long,
            PositionSide::Short => self
                .short
                .as_mut()
                .expect("short position exists only under margin"),
        }
    }

    /// Long/short mutual exclusion: while one book has an open round trip
    /// (its `market_type` is pinned), the other book is skipped.
    fn position_excluded(&self, side: PositionSide) -> bool {
        if self.config.trading_type != TradingType::Margin {
            return false;
        }
        let other = match side {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        };
        self.position(other).market_type.is_some()
    }

    /// Per-pass preamble: return a completed book to trading and evaluate the
    /// strategy's risk gate.
    fn begin_pass(&mut self, side: PositionSide) {
        if self.position(side).market_status == MarketStatus::CompleteTrade {
            self.position_mut(side).market_status = MarketStatus::Trading;
        }

        let can_order = {
            let ctx = self.condition_ctx(side);
            self.strategy.can_order(&ctx)
        };
        self.position_mut(side).can_order = can_order;
    }

    /// After a stale order id, forget the outstanding order bookkeeping so
    /// evaluation resumes from a clean slate.
    fn resync_orders(&mut self) {
        for side in self.position_sides() {
            if self.position(side).has_open_order() {
                info!(
                    "[trader] {} resyncing {side} order bookkeeping (order {:?})",
                    self.config.pair,
                    self.position(side).order_id
                );
                let pos = self.position_mut(side);
                pos.order_id = None;
                pos.order_status = None;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Strategy context & snapshots
    // -----------------------------------------------------------------------

    pub(crate) fn condition_ctx(&self, side: PositionSide) -> vela_strategy::ConditionCtx<'_> {
        let pos = self.position(side);
        vela_strategy::ConditionCtx {
            position: PositionSnapshot {
                side: pos.side,
                order_side: pos.order_side,
                order_kind: pos.order_kind,
                order_price: pos.price,
                buy_price: pos.buy_price,
                buy_time_ms: pos.buy_time_ms,
                tokens_holding: pos.tokens_holding,
            },
            indicators: &self.indicators,
            prices: &self.market_prices,
            candles: &self.candles,
        }
    }

    /// The full serializable state of this trader.
    pub fn to_record(&self) -> TraderRecord {
        TraderRecord {
            configuration: self.config.clone(),
            market_prices: self.market_prices,
            wallet_pair: self.wallet.clone(),
            long_position: self.long.clone(),
            short_position: self.short.clone(),
            trade_recorder: self.recorder.records().to_vec(),
            state_data: StateData {
                runtime_state: self.state,
                base_allocation: self.config.allocation,
                session_profit: self.session_profit,
                trades_completed: self.trades_completed,
                last_update_ms: self.last_update_ms,
            },
            rules: self.rules,
        }
    }

    fn publish_snapshot(&mut self) {
        let _ = self.snapshot_tx.send(self.to_record());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{TraderHarness, depth, single_candle};
    use vela_core::{OrderKind, OrderSide};
    use vela_strategy::OrderIntent;

    #[tokio::test]
    async fn setup_transitions_to_run_after_first_tick() {
        let mut h = TraderHarness::spot_test();
        h.trader.candles = single_candle(100.0);
        h.trader.depth = depth(100.2, 99.8);

        assert_eq!(h.trader.state, RuntimeState::Setup);
        h.trader.tick().await.unwrap();
        assert_eq!(h.trader.state, RuntimeState::Run);
    }

    #[tokio::test]
    async fn spot_round_trip_records_alternating_sides() {
        let mut h = TraderHarness::spot_test();
        h.trader.candles = single_candle(100.0);
        h.trader.depth = depth(100.2, 100.0);

        // Tick 1: entry signal at 100 → BUY placed. Allocation 10 at bid 100
        // computes quantity 0.1.
        h.strategy.set_entry(OrderIntent::signal("entry", 100.0));
        h.trader.tick().await.unwrap();

        let pos = h.trader.position(PositionSide::Long);
        assert_eq!(pos.order_status, Some(vela_core::OrderState::Placed));
        assert_eq!(pos.tokens_holding, 0.1);
        assert_eq!(pos.price, 100.0);

        // Tick 2: last price crosses down to the order price → BUY fills,
        // side flips to SELL, buy price recorded.
        h.strategy.set_entry(OrderIntent::wait());
        h.trader.candles = single_candle(100.0);
        h.trader.tick().await.unwrap();

        let pos = h.trader.position(PositionSide::Long);
        assert_eq!(pos.order_side, OrderSide::Sell);
        assert_eq!(pos.buy_price, 100.0);
        let records = h.trader.recorder.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].side, OrderSide::Buy);
        assert_eq!(records[0].price, 100.0);

        // Tick 3: exit signal at 110 → SELL placed.
        h.strategy.set_exit(OrderIntent::signal("exit", 110.0));
        h.trader.tick().await.unwrap();
        assert_eq!(
            h.trader.position(PositionSide::Long).order_kind,
            OrderKind::Signal
        );

        // Tick 4: last crosses up to 110 → SELL fills, round trip closes.
        h.trader.candles = single_candle(110.0);
        h.strategy.set_exit(OrderIntent::wait());
        h.trader.tick().await.unwrap();

        let records = h.trader.recorder.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].side, OrderSide::Buy);
        assert_eq!(records[1].side, OrderSide::Sell);

        let pos = h.trader.position(PositionSide::Long);
        assert_eq!(pos.order_side, OrderSide::Buy);
        assert_eq!(pos.buy_price, 0.0);
        assert_eq!(pos.currency_left, 10.0);
        // Outcome (110 - 100) * 0.1 = 1.0, minus the session commission.
        let expected = 1.0 - 10.0 * COMMISSION_FEE;
        assert!((h.trader.session_profit - expected).abs() < 1e-9);
        assert_eq!(h.trader.trades_completed, 1);

        // The completed book returns to trading on its next pass.
        h.trader.tick().await.unwrap();
        assert_eq!(
            h.trader.position(PositionSide::Long).market_status,
            MarketStatus::Trading
        );
    }

    #[tokio::test]
    async fn insufficient_balance_suspends_until_quote_recovers() {
        let mut h = TraderHarness::spot_real();
        h.trader.candles = single_candle(100.0);
        h.trader.depth = depth(100.2, 100.0);
        h.trader.wallet.quote_free = 10.0;

        h.gateway.push_place_result(Err(
            vela_core::error::GatewayError::Rejected {
                code: vela_core::error::CODE_INSUFFICIENT_BALANCE,
                message: "Account has insufficient balance".into(),
            },
        ));
        h.strategy.set_entry(OrderIntent::signal("entry", 100.0));

        h.trader.tick().await.unwrap();
        assert_eq!(h.trader.state, RuntimeState::PauseInsufBalance);
        assert_eq!(h.gateway.place_count(), 1);

        // Suspended: no further placement attempts while the balance is low.
        h.trader.tick().await.unwrap();
        assert_eq!(h.gateway.place_count(), 1);

        // Quote balance recovers above the allocation → trading resumes.
        h.trader.wallet.quote_free = 20.0;
        h.trader.tick().await.unwrap();
        assert_eq!(h.trader.state, RuntimeState::Run);
        assert_eq!(h.gateway.place_count(), 2);
    }

    #[tokio::test]
    async fn drain_mode_blocks_entries_but_allows_exits() {
        let mut h = TraderHarness::spot_test();
        h.trader.candles = single_candle(100.0);
        h.trader.depth = depth(100.2, 100.0);
        h.trader.tick().await.unwrap(); // Setup → Run

        // Mid round trip: holding tokens, waiting to exit.
        {
            let pos = h.trader.position_mut(PositionSide::Long);
            pos.order_side = OrderSide::Sell;
            pos.tokens_holding = 0.1;
            pos.buy_price = 100.0;
        }

        h.controller.prevent_new_entries();
        h.strategy.set_exit(OrderIntent::signal("exit", 110.0));
        h.trader.tick().await.unwrap();

        assert_eq!(h.trader.state, RuntimeState::ForcePreventBuy);
        // The exit order was still placed.
        assert_eq!(h.gateway.place_count(), 1);

        // Once flat, a new entry signal places nothing.
        {
            let pos = h.trader.position_mut(PositionSide::Long);
            pos.order_side = OrderSide::Buy;
            pos.order_id = None;
            pos.order_status = None;
            pos.order_kind = OrderKind::Wait;
        }
        h.strategy.set_entry(OrderIntent::signal("entry", 100.0));
        h.strategy.set_exit(OrderIntent::wait());
        h.trader.tick().await.unwrap();
        assert_eq!(h.gateway.place_count(), 1);
    }

    #[tokio::test]
    async fn margin_excludes_short_while_long_round_trip_open() {
        let mut h = TraderHarness::margin_test();
        h.trader.candles = single_candle(100.0);
        h.trader.depth = depth(100.2, 100.0);
        h.strategy.set_entry(OrderIntent::signal("entry", 100.0));

        h.trader.tick().await.unwrap();

        // LONG pinned its market type; SHORT must not have placed anything.
        assert_eq!(
            h.trader.position(PositionSide::Long).market_type,
            Some(PositionSide::Long)
        );
        assert!(h.trader.position(PositionSide::Short).order_id.is_none());
        assert_eq!(h.gateway.place_count(), 1);
    }
}

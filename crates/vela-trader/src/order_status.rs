//! Order-status manager — decides whether a position's outstanding order is
//! resolved, and closes out the bookkeeping when it is.
//!
//! REAL runs reconcile against execution reports pushed over the user-data
//! stream: a report must match the recorded order id (or adopt a
//! pre-existing position that has none), and a `FILLED` buy is honored only
//! once the wallet confirms the target asset actually arrived — duplicate or
//! out-of-order push events can never complete an order twice.
//!
//! TEST runs simulate fills by price crossing: a resting BUY fills when the
//! last price trades through it, stops trigger on *adverse* crossing.

use anyhow::{Result, anyhow};
use tracing::{debug, info, warn};
use vela_core::{
    ExecStatus, ExecutionReport, MarketPrices, MarketStatus, OrderKind, OrderSide, OrderState,
    PositionSide, RunType, TradeRecord, time_util,
};

use crate::position::Position;
use crate::trader::{COMMISSION_FEE, Trader};

/// A resolved order: the price and quantity the books are settled with.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fill {
    pub price: f64,
    pub qty: f64,
}

impl Trader {
    /// Check the position's outstanding order and complete it if resolved.
    pub(crate) async fn order_status_manager(&mut self, side: PositionSide) -> Result<()> {
        match self.config.run_type {
            RunType::Real => self.check_reported(side).await,
            RunType::Test => self.check_simulated(side).await,
        }
    }

    // -----------------------------------------------------------------------
    // TEST: price crossing
    // -----------------------------------------------------------------------

    async fn check_simulated(&mut self, side: PositionSide) -> Result<()> {
        let Some(fill) = simulated_fill(self.position(side), &self.market_prices) else {
            return Ok(());
        };
        self.complete_order(side, fill).await
    }

    // -----------------------------------------------------------------------
    // REAL: execution reports
    // -----------------------------------------------------------------------

    async fn check_reported(&mut self, side: PositionSide) -> Result<()> {
        let Some(report) = self.take_report(side) else {
            return Ok(());
        };

        match report.status {
            ExecStatus::PartiallyFilled => {
                if self.position(side).order_status != Some(OrderState::Locked) {
                    info!(
                        "[trader] {} {side} order {} partially filled, locking",
                        self.config.pair, report.order_id
                    );
                    self.position_mut(side).order_status = Some(OrderState::Locked);
                }
                Ok(())
            }

            ExecStatus::Filled => {
                let pos = self.position(side);
                let fill = match pos.order_side {
                    OrderSide::Buy => {
                        // The fill is honored only once the wallet shows the
                        // bought asset; otherwise retry next tick.
                        if !self.buy_confirmed_by_wallet(side, &report) {
                            debug!(
                                "[trader] {} buy fill for order {} awaiting wallet confirmation",
                                self.config.pair, report.order_id
                            );
                            self.deferred_reports.push(report);
                            return Ok(());
                        }
                        Fill {
                            price: report.fill_price,
                            qty: report.fill_qty,
                        }
                    }
                    OrderSide::Sell => Fill {
                        price: report.fill_price,
                        qty: self.position(side).tokens_holding,
                    },
                };

                let result = self.complete_order(side, fill).await;
                if result.is_err() {
                    // Completion failed mid-way (loan repay, bookkeeping);
                    // keep the report so the next tick retries.
                    self.pending_reports.push_front(report);
                }
                result
            }

            // Cancel acks and rejections of our own order carry no fill;
            // the trade manager already adjusted the bookkeeping.
            _ => {
                debug!(
                    "[trader] {} {side} order {} reported {:?}",
                    self.config.pair, report.order_id, report.status
                );
                Ok(())
            }
        }
    }

    /// Pull the first pending report addressed to this position.
    ///
    /// A report matches by order id, or — for a BUY fill while no order id is
    /// recorded — adopts a LONG position that existed before this process
    /// started. Everything else stays queued (reports for the other book) or
    /// is discarded at tick end (unknown orders, logged).
    fn take_report(&mut self, side: PositionSide) -> Option<ExecutionReport> {
        let pos = self.position(side);
        let symbol = self.config.symbol();
        let adoption_side = side.exchange_side(pos.order_side);

        let idx = self.pending_reports.iter().position(|r| {
            if r.symbol != symbol {
                return false;
            }
            match pos.order_id {
                Some(id) => r.order_id == id,
                None => {
                    side == PositionSide::Long
                        && pos.order_side == OrderSide::Buy
                        && r.side == adoption_side
                        && matches!(r.status, ExecStatus::Filled | ExecStatus::PartiallyFilled)
                }
            }
        })?;

        self.pending_reports.remove(idx)
    }

    /// Wallet confirmation of a FILLED buy: the target asset's free balance
    /// must cover the reported quantity.
    fn buy_confirmed_by_wallet(&self, side: PositionSide, report: &ExecutionReport) -> bool {
        let pair = &self.config.pair;
        let (target_asset, target_qty) = match side {
            // LONG bought the base asset outright.
            PositionSide::Long => (pair.base_asset.as_str(), report.fill_qty),
            // SHORT sold borrowed tokens: the proceeds land in quote.
            PositionSide::Short => (
                pair.quote_asset.as_str(),
                report.fill_qty * report.fill_price,
            ),
        };

        self.wallet
            .free_of(target_asset, &pair.base_asset, &pair.quote_asset)
            .unwrap_or(0.0)
            >= target_qty
    }

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    async fn complete_order(&mut self, side: PositionSide, fill: Fill) -> Result<()> {
        match self.position(side).order_side {
            OrderSide::Buy => self.complete_buy(side, fill),
            OrderSide::Sell => self.complete_sell(side, fill).await,
        }
    }

    fn complete_buy(&mut self, side: PositionSide, fill: Fill) -> Result<()> {
        let now = time_util::now_ms();
        let mut pos = self.position(side).clone();

        self.recorder.append(TradeRecord {
            time_ms: now,
            price: fill.price,
            quantity: fill.qty,
            description: pos.order_description.clone().unwrap_or_default(),
            side: OrderSide::Buy,
            position_side: side,
            kind: pos.order_kind,
        })?;

        pos.buy_price = fill.price;
        pos.buy_time_ms = now;
        pos.tokens_holding = fill.qty;
        pos.currency_left = 0.0;
        pos.finish_order();
        *self.position_mut(side) = pos;

        info!(
            "[trader] {} completed {side} buy: {} @ {:.8}",
            self.config.pair, fill.qty, fill.price
        );
        Ok(())
    }

    async fn complete_sell(&mut self, side: PositionSide, fill: Fill) -> Result<()> {
        let mut pos = self.position(side).clone();

        // A short round trip repays its loan before the books close.
        if side == PositionSide::Short && pos.loan_cost > 0.0 {
            self.gateway
                .repay(&self.config.pair.base_asset, pos.loan_cost)
                .await
                .map_err(|e| anyhow!("loan repay failed: {e}"))?;
            info!(
                "[trader] {} repaid loan of {} {} (tran {:?})",
                self.config.pair, pos.loan_cost, self.config.pair.base_asset, pos.loan_id
            );
        }

        let now = time_util::now_ms();
        let buy_price = self
            .recorder
            .last_buy(side)
            .map(|r| r.price)
            .unwrap_or(pos.buy_price);

        let sell_record = TradeRecord {
            time_ms: now,
            price: fill.price,
            quantity: fill.qty,
            description: pos.order_description.clone().unwrap_or_default(),
            side: OrderSide::Sell,
            position_side: side,
            kind: pos.order_kind,
        };

        let outcome = (fill.price - buy_price) * fill.qty;

        if let Some(log) = &self.order_log {
            if let Some(buy_record) = self.recorder.last_buy(side) {
                if let Err(e) = log.append_round_trip(buy_record, &sell_record, outcome) {
                    warn!("[trader] {} order log write failed: {e:#}", self.config.pair);
                }
            }
        }

        self.recorder.append(sell_record)?;
        self.session_profit += outcome - self.config.allocation * COMMISSION_FEE;
        self.trades_completed += 1;

        pos.market_status = MarketStatus::CompleteTrade;
        pos.market_type = None;
        pos.loan_cost = 0.0;
        pos.loan_id = None;
        pos.tokens_holding = 0.0;
        pos.buy_price = 0.0;
        pos.buy_time_ms = 0;
        pos.currency_left = self.config.allocation;
        pos.finish_order();
        *self.position_mut(side) = pos;

        info!(
            "[trader] {} completed {side} round trip: outcome {:.8}",
            self.config.pair, outcome
        );
        Ok(())
    }
}

/// TEST-mode fill simulation by price crossing.
///
/// A BUY fills when the market trades *down* to a LONG order (or up to a
/// SHORT one); SELL is symmetric; stop-loss orders trigger on the adverse
/// crossing instead. Market orders fill immediately at the last price.
fn simulated_fill(pos: &Position, prices: &MarketPrices) -> Option<Fill> {
    if pos.order_status != Some(OrderState::Placed) {
        return None;
    }

    let last = prices.last_price;
    let is_stop = matches!(pos.order_kind, OrderKind::StopLoss | OrderKind::StopLossLimit);

    let crossed = match (pos.order_side, pos.side) {
        _ if pos.order_kind == OrderKind::Market => true,
        (OrderSide::Buy, PositionSide::Long) => last <= pos.price,
        (OrderSide::Buy, PositionSide::Short) => last >= pos.price,
        (OrderSide::Sell, PositionSide::Long) => {
            if is_stop {
                last <= pos.stop_price
            } else {
                last >= pos.price
            }
        }
        (OrderSide::Sell, PositionSide::Short) => {
            if is_stop {
                last >= pos.stop_price
            } else {
                last <= pos.price
            }
        }
    };

    crossed.then(|| Fill {
        price: if pos.order_kind == OrderKind::Market {
            last
        } else {
            pos.price
        },
        qty: pos.tokens_holding,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{TraderHarness, depth, single_candle};
    use vela_core::AssetBalance;

    fn placed_position(h: &mut TraderHarness, side: PositionSide, kind: OrderKind, price: f64) {
        let pos = h.trader.position_mut(side);
        pos.order_id = Some(5);
        pos.order_status = Some(OrderState::Placed);
        pos.order_kind = kind;
        pos.order_description = Some("test order".into());
        pos.price = price;
        pos.tokens_holding = 0.1;
    }

    fn report(order_id: u64, side: OrderSide, status: ExecStatus, qty: f64, price: f64) -> ExecutionReport {
        ExecutionReport {
            symbol: "BTCUSDT".into(),
            order_id,
            side,
            status,
            fill_qty: qty,
            fill_price: price,
            event_time_ms: time_util::now_ms(),
        }
    }

    // -- TEST mode price crossing ------------------------------------------

    #[tokio::test]
    async fn long_buy_fills_only_when_price_crosses_down() {
        let mut h = TraderHarness::spot_test();
        placed_position(&mut h, PositionSide::Long, OrderKind::Signal, 100.0);

        // Above the order price: untouched.
        h.trader.market_prices.last_price = 100.5;
        h.trader.order_status_manager(PositionSide::Long).await.unwrap();
        assert_eq!(h.trader.position(PositionSide::Long).order_side, OrderSide::Buy);

        // At the order price: filled, side flips.
        h.trader.market_prices.last_price = 100.0;
        h.trader.order_status_manager(PositionSide::Long).await.unwrap();
        let pos = h.trader.position(PositionSide::Long);
        assert_eq!(pos.order_side, OrderSide::Sell);
        assert_eq!(pos.buy_price, 100.0);
        assert_eq!(pos.order_kind, OrderKind::Complete);
        assert_eq!(h.trader.recorder.records().len(), 1);
    }

    #[tokio::test]
    async fn short_buy_fills_when_price_crosses_up() {
        let mut h = TraderHarness::margin_test();
        placed_position(&mut h, PositionSide::Short, OrderKind::Signal, 100.0);

        h.trader.market_prices.last_price = 99.5;
        h.trader.order_status_manager(PositionSide::Short).await.unwrap();
        assert_eq!(h.trader.position(PositionSide::Short).order_side, OrderSide::Buy);

        h.trader.market_prices.last_price = 100.2;
        h.trader.order_status_manager(PositionSide::Short).await.unwrap();
        assert_eq!(h.trader.position(PositionSide::Short).order_side, OrderSide::Sell);
    }

    #[tokio::test]
    async fn long_stop_loss_triggers_on_adverse_crossing() {
        let mut h = TraderHarness::spot_test();
        placed_position(&mut h, PositionSide::Long, OrderKind::StopLossLimit, 98.0);
        {
            let pos = h.trader.position_mut(PositionSide::Long);
            pos.order_side = OrderSide::Sell;
            pos.stop_price = 98.0;
            pos.buy_price = 100.0;
        }
        h.trader.recorder.append(TradeRecord {
            time_ms: 0,
            price: 100.0,
            quantity: 0.1,
            description: "entry".into(),
            side: OrderSide::Buy,
            position_side: PositionSide::Long,
            kind: OrderKind::Signal,
        }).unwrap();

        // A favorable price must NOT trigger the stop.
        h.trader.market_prices.last_price = 99.0;
        h.trader.order_status_manager(PositionSide::Long).await.unwrap();
        assert_eq!(h.trader.position(PositionSide::Long).order_side, OrderSide::Sell);

        // Adverse crossing fills it.
        h.trader.market_prices.last_price = 97.9;
        h.trader.order_status_manager(PositionSide::Long).await.unwrap();
        let pos = h.trader.position(PositionSide::Long);
        assert_eq!(pos.order_side, OrderSide::Buy);
        assert_eq!(pos.market_status, MarketStatus::CompleteTrade);
    }

    #[tokio::test]
    async fn market_order_fills_immediately_at_last() {
        let mut h = TraderHarness::spot_test();
        placed_position(&mut h, PositionSide::Long, OrderKind::Market, 0.0);

        h.trader.market_prices.last_price = 103.3;
        h.trader.order_status_manager(PositionSide::Long).await.unwrap();
        assert_eq!(h.trader.position(PositionSide::Long).buy_price, 103.3);
    }

    // -- REAL mode reports --------------------------------------------------

    #[tokio::test]
    async fn partial_fill_locks_the_order() {
        let mut h = TraderHarness::spot_real();
        placed_position(&mut h, PositionSide::Long, OrderKind::Signal, 100.0);

        h.trader.pending_reports.push_back(report(
            5, OrderSide::Buy, ExecStatus::PartiallyFilled, 0.05, 100.0,
        ));
        h.trader.order_status_manager(PositionSide::Long).await.unwrap();

        let pos = h.trader.position(PositionSide::Long);
        assert_eq!(pos.order_status, Some(OrderState::Locked));
        assert_eq!(pos.order_id, Some(5)); // order untouched otherwise
        assert!(h.trader.recorder.records().is_empty());
    }

    #[tokio::test]
    async fn filled_buy_waits_for_wallet_confirmation() {
        let mut h = TraderHarness::spot_real();
        placed_position(&mut h, PositionSide::Long, OrderKind::Signal, 100.0);

        // Wallet has not seen the bought tokens yet — fill deferred.
        h.trader.pending_reports.push_back(report(
            5, OrderSide::Buy, ExecStatus::Filled, 0.1, 100.0,
        ));
        h.trader.order_status_manager(PositionSide::Long).await.unwrap();
        assert_eq!(h.trader.position(PositionSide::Long).order_side, OrderSide::Buy);
        assert_eq!(h.trader.deferred_reports.len(), 1);

        // Balance arrives; the retried report completes the order.
        h.trader.wallet.apply_event(
            &vela_core::BalanceEvent {
                event_time_ms: 1,
                balances: vec![AssetBalance { asset: "BTC".into(), free: 0.1, locked: 0.0 }],
            },
            "BTC",
            "USDT",
        );
        let deferred = std::mem::take(&mut h.trader.deferred_reports);
        h.trader.pending_reports.extend(deferred);
        h.trader.order_status_manager(PositionSide::Long).await.unwrap();

        let pos = h.trader.position(PositionSide::Long);
        assert_eq!(pos.order_side, OrderSide::Sell);
        assert_eq!(pos.tokens_holding, 0.1);
    }

    #[tokio::test]
    async fn mismatched_order_id_never_mutates_state() {
        let mut h = TraderHarness::spot_real();
        placed_position(&mut h, PositionSide::Long, OrderKind::Signal, 100.0);
        let before = h.trader.position(PositionSide::Long).clone();

        h.trader.pending_reports.push_back(report(
            999, OrderSide::Buy, ExecStatus::Filled, 0.1, 100.0,
        ));
        h.trader.order_status_manager(PositionSide::Long).await.unwrap();

        assert_eq!(*h.trader.position(PositionSide::Long), before);
        // The report stays queued for the tick-end discard.
        assert_eq!(h.trader.pending_reports.len(), 1);
    }

    #[tokio::test]
    async fn unsolicited_buy_fill_adopts_preexisting_position() {
        let mut h = TraderHarness::spot_real();
        h.trader.wallet.base_free = 0.2;

        h.trader.pending_reports.push_back(report(
            777, OrderSide::Buy, ExecStatus::Filled, 0.2, 95.0,
        ));
        h.trader.order_status_manager(PositionSide::Long).await.unwrap();

        let pos = h.trader.position(PositionSide::Long);
        assert_eq!(pos.order_side, OrderSide::Sell);
        assert_eq!(pos.buy_price, 95.0);
    }

    #[tokio::test]
    async fn short_sell_completion_repays_loan() {
        let mut h = TraderHarness::margin_real();
        {
            let pos = h.trader.position_mut(PositionSide::Short);
            pos.order_id = Some(8);
            pos.order_status = Some(OrderState::Placed);
            pos.order_kind = OrderKind::Signal;
            pos.order_side = OrderSide::Sell;
            pos.order_description = Some("cover".into());
            pos.price = 90.0;
            pos.tokens_holding = 0.5;
            pos.loan_cost = 0.5;
            pos.loan_id = Some(42);
            pos.market_type = Some(PositionSide::Short);
        }
        h.trader.recorder.append(TradeRecord {
            time_ms: 0,
            price: 100.0,
            quantity: 0.5,
            description: "short entry".into(),
            side: OrderSide::Buy,
            position_side: PositionSide::Short,
            kind: OrderKind::Signal,
        }).unwrap();

        // The cover order fills (exchange side for a SHORT sell is BUY).
        h.trader.pending_reports.push_back(report(
            8, OrderSide::Buy, ExecStatus::Filled, 0.5, 90.0,
        ));
        h.trader.order_status_manager(PositionSide::Short).await.unwrap();

        assert!(h.gateway.repaid("BTC", 0.5));
        let pos = h.trader.position(PositionSide::Short);
        assert_eq!(pos.loan_cost, 0.0);
        assert_eq!(pos.loan_id, None);
        assert_eq!(pos.market_type, None);
        // Short profit: sold at 100, covered at 90.
        let records = h.trader.recorder.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].side, OrderSide::Sell);
    }
}

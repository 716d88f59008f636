//! Trade manager — consults the strategy and keeps the exchange in sync with
//! its intent.
//!
//! A locked order (unresolved partial fill) is never touched. A `Wait` intent
//! cancels anything outstanding. A placeable intent goes through a debounce:
//! the order is replaced only when the kind changed or the quantized price
//! moved — repeated identical signals at an unchanged price place nothing.
//! Any outstanding order is cancelled before its replacement is placed.
//!
//! Gateway rejections map to runtime transitions: insufficient balance
//! suspends the trader until the quote balance recovers; a stale order id
//! forces a resynchronization pass on the next tick.

use anyhow::Result;
use tracing::{debug, info, warn};
use vela_core::error::GatewayError;
use vela_core::precision::round_price;
use vela_core::{OrderKind, OrderRequest, OrderSide, OrderState, PositionSide, RuntimeState};
use vela_strategy::OrderIntent;

use crate::position::Position;
use crate::trader::Trader;

impl Trader {
    /// Evaluate the strategy for one position and act on the intent.
    pub(crate) async fn trade_manager(&mut self, side: PositionSide) -> Result<()> {
        {
            let pos = self.position(side);

            // A locked order blocks replace/cancel until the partial fill
            // resolves.
            if pos.order_status == Some(OrderState::Locked) {
                return Ok(());
            }
            // Drain mode: no new entries.
            if pos.order_side == OrderSide::Buy && self.state == RuntimeState::ForcePreventBuy {
                return Ok(());
            }
        }

        let order_side = self.position(side).order_side;
        let intent = {
            let ctx = self.condition_ctx(side);
            match order_side {
                OrderSide::Buy => self.strategy.entry(&ctx),
                OrderSide::Sell => self.strategy.exit(&ctx),
            }
        };

        if intent.kind == OrderKind::Wait {
            return self.apply_wait(side).await;
        }
        self.apply_placeable(side, intent).await
    }

    // -----------------------------------------------------------------------
    // Wait: cancel anything outstanding
    // -----------------------------------------------------------------------

    async fn apply_wait(&mut self, side: PositionSide) -> Result<()> {
        let mut pos = self.position(side).clone();

        if let Some(order_id) = pos.order_id {
            self.cancel_outstanding(&pos, order_id).await;
            pos.order_id = None;
            pos.order_status = None;
        }

        if pos.order_kind != OrderKind::Wait {
            pos.order_kind = OrderKind::Wait;
            pos.order_description = None;
            pos.price = 0.0;
            pos.stop_price = 0.0;
            pos.stop_limit_price = 0.0;
        }

        // Releasing an unfilled entry releases the long/short exclusion.
        if pos.order_side == OrderSide::Buy {
            pos.market_type = None;
        }

        *self.position_mut(side) = pos;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Placeable intents
    // -----------------------------------------------------------------------

    async fn apply_placeable(&mut self, side: PositionSide, intent: OrderIntent) -> Result<()> {
        let tick_digits = self.rules.tick_size_digits;
        let price = intent.price.map(|p| round_price(p, tick_digits));
        let stop_price = intent.stop_price.map(|p| round_price(p, tick_digits));
        let stop_limit_price = intent.stop_limit_price.map(|p| round_price(p, tick_digits));

        let mut pos = self.position(side).clone();

        // Debounce: an unchanged kind at an unchanged price places nothing.
        let changed = pos.order_kind != intent.kind
            || price.map(|p| p != pos.price).unwrap_or(false);
        if !changed {
            return Ok(());
        }

        // An entry below the exchange minimum can never be placed.
        if pos.order_side == OrderSide::Buy && pos.currency_left < self.rules.min_notional {
            debug!(
                "[trader] {} {side} allocation {} under min notional {}, skipping entry",
                self.config.pair, pos.currency_left, self.rules.min_notional
            );
            return Ok(());
        }

        // Replace: the outstanding order is cancelled before the new one.
        if let Some(order_id) = pos.order_id {
            self.cancel_outstanding(&pos, order_id).await;
            pos.order_id = None;
            pos.order_status = None;
            if self.state == RuntimeState::CheckOrders {
                // Stale id — resynchronize before placing anything new.
                *self.position_mut(side) = pos;
                return Ok(());
            }
        }

        // Quantity plan — may borrow for a short entry or requery the margin
        // account for a cover; a failure abandons this attempt until the
        // next tick.
        let plan = match self.plan_quantity(side, &pos).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(
                    "[trader] {} {side} quantity planning failed, retrying next tick: {e}",
                    self.config.pair
                );
                *self.position_mut(side) = pos;
                return Ok(());
            }
        };

        // A short entry's loan is recorded on the position before any
        // placement result is consumed.
        if let Some((loan_id, loan_cost)) = plan.loan {
            pos.loan_id = Some(loan_id);
            pos.loan_cost = loan_cost;
            *self.position_mut(side) = pos.clone();
        }

        let request = OrderRequest {
            trading_type: self.config.trading_type,
            symbol: self.config.symbol(),
            side: plan.exchange_side,
            kind: intent.kind,
            quantity: plan.quantity,
            price,
            stop_price,
            stop_limit_price,
            time_in_force: price.is_some().then(|| "GTC".to_string()),
        };

        match self.gateway.place_order(&request).await {
            Ok(ack) => {
                pos.order_id = Some(ack.order_id);
                pos.order_kind = intent.kind;
                pos.order_status = Some(OrderState::Placed);
                pos.order_description = Some(intent.description);

                // Prefer the ack/fill price; fall back to the requested
                // price, then the market for price-less market orders.
                let executed = ack.executed_price();
                pos.price = if executed > 0.0 {
                    executed
                } else {
                    price.unwrap_or(self.market_prices.last_price)
                };
                pos.stop_price = stop_price.unwrap_or(0.0);
                pos.stop_limit_price = stop_limit_price.unwrap_or(0.0);

                // TEST acks carry the simulated quantity for the entry.
                if pos.order_side == OrderSide::Buy {
                    pos.market_type = Some(side);
                    if let Some(qty) = ack.test_quantity {
                        pos.tokens_holding = qty;
                    }
                }

                info!(
                    "[trader] {} placed {side} {} {} qty={} price={:.8} (order {})",
                    self.config.pair,
                    pos.order_side,
                    intent.kind,
                    plan.quantity,
                    pos.price,
                    ack.order_id
                );
            }
            Err(e) => {
                // A loan taken for an order that never made it to the book
                // must not linger.
                if let Some((_, amount)) = plan.loan {
                    match self
                        .gateway
                        .repay(&self.config.pair.base_asset, amount)
                        .await
                    {
                        Ok(()) => {
                            pos.loan_id = None;
                            pos.loan_cost = 0.0;
                        }
                        Err(re) => warn!(
                            "[trader] {} repay of unused loan failed: {re}",
                            self.config.pair
                        ),
                    }
                }

                match e {
                    e if e.is_insufficient_balance() => {
                        warn!(
                            "[trader] {} insufficient balance, pausing trading",
                            self.config.pair
                        );
                        self.state = RuntimeState::PauseInsufBalance;
                    }
                    GatewayError::StaleOrder => {
                        warn!(
                            "[trader] {} stale order on placement, forcing resync",
                            self.config.pair
                        );
                        self.state = RuntimeState::CheckOrders;
                    }
                    e => {
                        warn!(
                            "[trader] {} placement failed, retrying next tick: {e}",
                            self.config.pair
                        );
                    }
                }
            }
        }

        *self.position_mut(side) = pos;
        Ok(())
    }

    /// Cancel the order currently resting on the exchange. A stale id flips
    /// the trader into its resynchronization state instead of failing.
    async fn cancel_outstanding(&mut self, pos: &Position, order_id: u64) {
        let symbol = self.config.symbol();
        let result = if pos.order_kind == OrderKind::OcoLimit {
            self.gateway.cancel_oco_order(&symbol).await
        } else {
            self.gateway
                .cancel_order(self.config.trading_type, &symbol, order_id)
                .await
        };

        match result {
            Ok(()) => {
                debug!("[trader] {} cancelled order {order_id}", self.config.pair);
            }
            Err(GatewayError::StaleOrder) => {
                warn!(
                    "[trader] {} cancel hit a stale order id {order_id}, forcing resync",
                    self.config.pair
                );
                self.state = RuntimeState::CheckOrders;
            }
            Err(e) => {
                warn!(
                    "[trader] {} cancel of order {order_id} failed: {e}",
                    self.config.pair
                );
            }
        }
    }
}

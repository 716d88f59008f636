//! Order quantity computation.
//!
//! - BUY: the remaining allocation divided by the bid.
//! - SELL (LONG) / cover (SHORT): the quantity the matching BUY recorded.
//! - SHORT entry: the borrow is taken out *before* the sell order, and the
//!   loan is reported back so the position records it ahead of placement.
//! - SHORT exit: the margin account is requeried fresh for
//!   `borrowed + interest` — never the cache — so the cover is never short.
//!
//! Every quantity is truncated (not rounded) to the symbol's lot-size digits
//! so the computed order cannot exceed the balance it was derived from.

use vela_core::error::GatewayError;
use vela_core::precision::truncate_quantity;
use vela_core::{OrderSide, PositionSide, RunType};

use crate::position::Position;
use crate::trader::Trader;

/// A computed order quantity plus its side effects.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QuantityPlan {
    /// Lot-size-truncated quantity to place.
    pub quantity: f64,
    /// Direction sent to the exchange (SHORT inverts the position side).
    pub exchange_side: OrderSide,
    /// `(tran_id, amount)` of the loan taken for a short entry.
    pub loan: Option<(u64, f64)>,
}

impl Trader {
    /// Compute the quantity for the position's next order.
    pub(crate) async fn plan_quantity(
        &self,
        side: PositionSide,
        pos: &Position,
    ) -> Result<QuantityPlan, GatewayError> {
        let exchange_side = side.exchange_side(pos.order_side);
        let lot_digits = self.rules.lot_size_digits;
        let base = &self.config.pair.base_asset;

        let raw = match pos.order_side {
            OrderSide::Buy => pos.currency_left / self.market_prices.bid_price,

            OrderSide::Sell => match side {
                PositionSide::Long => pos.tokens_holding,
                PositionSide::Short => {
                    // Cover quantity must include interest accrued since the
                    // borrow; only a fresh account query knows it.
                    if self.config.run_type == RunType::Real {
                        let account = self.gateway.get_margin_account().await?;
                        account.owed(base).unwrap_or(pos.tokens_holding)
                    } else {
                        pos.tokens_holding
                    }
                }
            },
        };

        let quantity = truncate_quantity(raw, lot_digits);

        // Short entry: borrow the tokens the sell leg is about to move.
        let loan = if pos.order_side == OrderSide::Buy && side == PositionSide::Short {
            let tran_id = self.gateway.borrow(base, quantity).await?;
            Some((tran_id, quantity))
        } else {
            None
        };

        Ok(QuantityPlan {
            quantity,
            exchange_side,
            loan,
        })
    }
}

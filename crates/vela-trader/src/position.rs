//! Position bookkeeping and the trade recorder.
//!
//! A [`Position`] is one side's book (LONG, or SHORT under margin). It holds
//! at most one outstanding order at any time; `order_side` alternates
//! strictly BUY, SELL, BUY, … as round trips complete. The
//! [`TradeRecorder`] enforces that alternation on every append, so a
//! bookkeeping bug surfaces as an error instead of a corrupt history.

use serde::{Deserialize, Serialize};
use vela_core::error::VelaError;
use vela_core::{
    MarketStatus, OrderKind, OrderSide, OrderState, PositionSide, TradeRecord,
};

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// One traded side's book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Which book this is.
    pub side: PositionSide,

    /// Gate set by the strategy's risk check each tick.
    pub can_order: bool,

    /// Price of the outstanding order (0 when none), tick-size quantized.
    pub price: f64,
    /// Stop trigger price of the outstanding order (0 when not a stop).
    pub stop_price: f64,
    /// Stop-limit leg price (OCO / stop-limit orders).
    pub stop_limit_price: f64,

    /// Entry price of the open round trip (0 while flat).
    pub buy_price: f64,
    /// Entry fill time of the open round trip (ms since epoch).
    pub buy_time_ms: u64,

    /// Quantity currently held (LONG) or borrowed (SHORT) for this side.
    pub tokens_holding: f64,
    /// Quote currency still allocated to this side.
    pub currency_left: f64,

    /// The single outstanding order, if any.
    pub order_id: Option<u64>,
    /// `Placed` or `Locked` while an order is outstanding.
    pub order_status: Option<OrderState>,
    /// Alternates strictly on round-trip completion.
    pub order_side: OrderSide,
    pub order_kind: OrderKind,
    pub order_description: Option<String>,

    /// Pinned on BUY entry; enforces long/short mutual exclusion per market.
    pub market_type: Option<PositionSide>,
    pub market_status: MarketStatus,

    /// Outstanding loan quantity — set only between a SHORT BUY(borrow) fill
    /// and its matching SELL(repay).
    pub loan_cost: f64,
    pub loan_id: Option<u64>,
}

impl Position {
    /// Fresh book with the lifecycle defaults.
    pub fn new(side: PositionSide, allocation: f64) -> Self {
        Self {
            side,
            can_order: true,
            price: 0.0,
            stop_price: 0.0,
            stop_limit_price: 0.0,
            buy_price: 0.0,
            buy_time_ms: 0,
            tokens_holding: 0.0,
            currency_left: allocation,
            order_id: None,
            order_status: None,
            order_side: OrderSide::Buy,
            order_kind: OrderKind::Wait,
            order_description: None,
            market_type: None,
            market_status: MarketStatus::Trading,
            loan_cost: 0.0,
            loan_id: None,
        }
    }

    /// Whether an order is resting on the exchange for this book.
    pub fn has_open_order(&self) -> bool {
        self.order_id.is_some() || self.order_status.is_some()
    }

    /// Common completion reset: wipe the order fields, mark the round-trip
    /// leg complete, and flip to the opposite side.
    pub fn finish_order(&mut self) {
        self.price = 0.0;
        self.stop_price = 0.0;
        self.stop_limit_price = 0.0;
        self.order_id = None;
        self.order_status = None;
        self.order_description = None;
        self.order_kind = OrderKind::Complete;
        self.order_side = self.order_side.flipped();
    }
}

// ---------------------------------------------------------------------------
// TradeRecorder
// ---------------------------------------------------------------------------

/// Append-only record of completed orders, one entry per fill.
///
/// Appends are validated: the first record of a book must be a BUY, and no
/// two consecutive records of the same book may share a side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeRecorder {
    records: Vec<TradeRecord>,
}

impl TradeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted record list (cache restore).
    pub fn from_records(records: Vec<TradeRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    /// Most recent record of one book.
    pub fn last_of(&self, position_side: PositionSide) -> Option<&TradeRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.position_side == position_side)
    }

    /// The BUY record opening the book's current round trip.
    pub fn last_buy(&self, position_side: PositionSide) -> Option<&TradeRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.position_side == position_side && r.side == OrderSide::Buy)
    }

    /// Append a completed order, enforcing strict BUY/SELL alternation per
    /// book.
    pub fn append(&mut self, record: TradeRecord) -> Result<(), VelaError> {
        let expected = match self.last_of(record.position_side) {
            Some(last) => last.side.flipped(),
            None => OrderSide::Buy,
        };

        if record.side != expected {
            return Err(VelaError::Trading(format!(
                "trade record for {} breaks alternation: got {}, expected {}",
                record.position_side, record.side, expected
            )));
        }

        self.records.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::time_util;

    fn record(side: OrderSide, position_side: PositionSide, price: f64) -> TradeRecord {
        TradeRecord {
            time_ms: time_util::now_ms(),
            price,
            quantity: 0.1,
            description: "test".into(),
            side,
            position_side,
            kind: OrderKind::Signal,
        }
    }

    #[test]
    fn new_position_defaults() {
        let pos = Position::new(PositionSide::Long, 10.0);
        assert_eq!(pos.order_side, OrderSide::Buy);
        assert_eq!(pos.order_kind, OrderKind::Wait);
        assert_eq!(pos.market_status, MarketStatus::Trading);
        assert_eq!(pos.currency_left, 10.0);
        assert!(!pos.has_open_order());
    }

    #[test]
    fn finish_order_resets_and_flips() {
        let mut pos = Position::new(PositionSide::Long, 10.0);
        pos.price = 100.0;
        pos.stop_price = 98.0;
        pos.order_id = Some(7);
        pos.order_status = Some(OrderState::Placed);
        pos.order_description = Some("entry".into());

        pos.finish_order();

        assert_eq!(pos.price, 0.0);
        assert_eq!(pos.stop_price, 0.0);
        assert_eq!(pos.order_id, None);
        assert_eq!(pos.order_status, None);
        assert_eq!(pos.order_description, None);
        assert_eq!(pos.order_kind, OrderKind::Complete);
        assert_eq!(pos.order_side, OrderSide::Sell);
    }

    #[test]
    fn recorder_enforces_alternation() {
        let mut rec = TradeRecorder::new();
        rec.append(record(OrderSide::Buy, PositionSide::Long, 100.0))
            .unwrap();
        rec.append(record(OrderSide::Sell, PositionSide::Long, 110.0))
            .unwrap();
        rec.append(record(OrderSide::Buy, PositionSide::Long, 105.0))
            .unwrap();

        // Second consecutive BUY is rejected.
        assert!(rec.append(record(OrderSide::Buy, PositionSide::Long, 106.0)).is_err());
        assert_eq!(rec.records().len(), 3);
    }

    #[test]
    fn recorder_starts_with_buy() {
        let mut rec = TradeRecorder::new();
        assert!(rec.append(record(OrderSide::Sell, PositionSide::Long, 100.0)).is_err());
    }

    #[test]
    fn recorder_books_are_independent() {
        let mut rec = TradeRecorder::new();
        rec.append(record(OrderSide::Buy, PositionSide::Long, 100.0))
            .unwrap();
        // SHORT book starts its own alternation.
        rec.append(record(OrderSide::Buy, PositionSide::Short, 101.0))
            .unwrap();
        rec.append(record(OrderSide::Sell, PositionSide::Long, 102.0))
            .unwrap();

        assert_eq!(rec.last_buy(PositionSide::Short).unwrap().price, 101.0);
        assert_eq!(rec.last_of(PositionSide::Long).unwrap().side, OrderSide::Sell);
    }
}

//! The order book
//!
//! One structure serves all three granularities; the `BookLevel` tag selects
//! the per-variant behavior of `add`/`update`/`delete`:
//!
//! - **L3**: orders pass through untouched.
//! - **L2**: the order id is rewritten to the formatted level price before
//!   insertion, so "updating" the single order at a price is id-stable and
//!   an update is a whole-level replacement.
//! - **L1**: the order id is rewritten to the side name, so each side holds
//!   at most one order; `add` is unsupported and top-of-book ticks drive the
//!   book via `update_top`.

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;
use types::book::{
    BookLevel, BookOrder, DeltaAction, OrderBookData, OrderBookDelta, OrderBookDeltas,
    OrderBookSnapshot, QuoteTick, Tick, TradeTick,
};
use types::ids::InstrumentId;
use types::numeric::{Price, Quantity};
use types::order::OrderSide;

use crate::ladder::Ladder;
use crate::level::Level;

/// Order book operation errors (validation; the book is left unchanged)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookError {
    #[error("Data is {data} but book is {book}")]
    LevelMismatch { book: BookLevel, data: BookLevel },

    #[error("add is not supported on an L1 book; use update or update_top")]
    L1AddNotSupported,

    #[error("update_top is only supported on an L1 book")]
    NotAnL1Book,
}

/// Price-time-priority order book for a single instrument
#[derive(Debug, Clone)]
pub struct OrderBook {
    pub instrument_id: InstrumentId,
    pub level: BookLevel,
    pub price_precision: u8,
    pub size_precision: u8,
    pub bids: Ladder,
    pub asks: Ladder,
    last_update_timestamp_ns: i64,
    /// Last known tops, retained for aggressor classification even while a
    /// side is momentarily empty.
    last_bid: Option<Price>,
    last_ask: Option<Price>,
}

impl OrderBook {
    pub fn new(
        instrument_id: InstrumentId,
        level: BookLevel,
        price_precision: u8,
        size_precision: u8,
    ) -> Self {
        Self {
            instrument_id,
            level,
            price_precision,
            size_precision,
            bids: Ladder::new(true, price_precision, size_precision),
            asks: Ladder::new(false, price_precision, size_precision),
            last_update_timestamp_ns: 0,
            last_bid: None,
            last_ask: None,
        }
    }

    pub fn last_update_timestamp_ns(&self) -> i64 {
        self.last_update_timestamp_ns
    }

    /// Add a resting order, dispatched by side
    pub fn add(&mut self, order: BookOrder) -> Result<(), BookError> {
        match self.level {
            BookLevel::L1 => return Err(BookError::L1AddNotSupported),
            BookLevel::L2 => {
                let order = self.rewrite_id_to_price(order);
                self.ladder_mut(order.side).add(order);
            }
            BookLevel::L3 => {
                self.ladder_mut(order.side).add(order);
            }
        }
        self.refresh_tops();
        Ok(())
    }

    /// Update a resting order, dispatched by side
    pub fn update(&mut self, order: BookOrder) -> Result<(), BookError> {
        match self.level {
            BookLevel::L1 => {
                let order = self.rewrite_id_to_side(order);
                self.absorb_crossed_feed(&order);
                self.ladder_mut(order.side).update(order);
            }
            BookLevel::L2 => {
                let order = self.rewrite_id_to_price(order);
                // Whole-level replacement: drop anything already resting at
                // the target price before reinsertion.
                self.remove_level_at(order.side, order.price);
                if !order.size.is_zero() {
                    self.ladder_mut(order.side).update(order);
                }
            }
            BookLevel::L3 => {
                self.ladder_mut(order.side).update(order);
            }
        }
        self.refresh_tops();
        Ok(())
    }

    /// Delete a resting order, dispatched by side
    pub fn delete(&mut self, order: BookOrder) -> Result<(), BookError> {
        let order = match self.level {
            BookLevel::L1 => self.rewrite_id_to_side(order),
            BookLevel::L2 => self.rewrite_id_to_price(order),
            BookLevel::L3 => order,
        };
        self.ladder_mut(order.side).delete(&order);
        self.refresh_tops();
        Ok(())
    }

    /// Apply one inbound data item of any shape
    pub fn apply(&mut self, data: &OrderBookData) -> Result<(), BookError> {
        match data {
            OrderBookData::Snapshot(s) => self.apply_snapshot(s),
            OrderBookData::Deltas(d) => self.apply_deltas(d),
            OrderBookData::Delta(d) => self.apply_delta(d),
        }
    }

    /// Apply a single delta; advances the book timestamp
    pub fn apply_delta(&mut self, delta: &OrderBookDelta) -> Result<(), BookError> {
        if delta.level != self.level {
            return Err(BookError::LevelMismatch {
                book: self.level,
                data: delta.level,
            });
        }
        match delta.action {
            DeltaAction::Add => self.add(delta.order.clone())?,
            DeltaAction::Update => self.update(delta.order.clone())?,
            DeltaAction::Delete => self.delete(delta.order.clone())?,
        }
        self.last_update_timestamp_ns = delta.ts_event_ns;
        Ok(())
    }

    /// Apply a batch of deltas in order, timestamping after each
    pub fn apply_deltas(&mut self, deltas: &OrderBookDeltas) -> Result<(), BookError> {
        if deltas.level != self.level {
            return Err(BookError::LevelMismatch {
                book: self.level,
                data: deltas.level,
            });
        }
        for delta in &deltas.deltas {
            self.apply_delta(delta)?;
        }
        self.last_update_timestamp_ns = deltas.ts_event_ns;
        Ok(())
    }

    /// Replace the book contents with a full image
    ///
    /// Clears, then routes every (price, size) pair through `update` so the
    /// call is uniform across L1/L2/L3.
    pub fn apply_snapshot(&mut self, snapshot: &OrderBookSnapshot) -> Result<(), BookError> {
        if snapshot.level != self.level {
            return Err(BookError::LevelMismatch {
                book: self.level,
                data: snapshot.level,
            });
        }
        self.clear();
        for &(price, size) in &snapshot.bids {
            if let (Some(price), Some(size)) = (Price::try_new(price), Quantity::try_new(size)) {
                let id = format_price_id(price, self.price_precision);
                self.update(BookOrder::new(id, OrderSide::BUY, price, size))?;
            }
        }
        for &(price, size) in &snapshot.asks {
            if let (Some(price), Some(size)) = (Price::try_new(price), Quantity::try_new(size)) {
                let id = format_price_id(price, self.price_precision);
                self.update(BookOrder::new(id, OrderSide::SELL, price, size))?;
            }
        }
        self.last_update_timestamp_ns = snapshot.ts_event_ns;
        Ok(())
    }

    /// Drive an L1 book from top-of-book ticks
    pub fn update_top(&mut self, tick: &Tick) -> Result<(), BookError> {
        if self.level != BookLevel::L1 {
            return Err(BookError::NotAnL1Book);
        }
        match tick {
            Tick::Quote(quote) => self.update_quote_tick(quote),
            Tick::Trade(trade) => self.update_trade_tick(trade),
        }
        self.last_update_timestamp_ns = tick.ts_event_ns();
        Ok(())
    }

    fn update_quote_tick(&mut self, tick: &QuoteTick) {
        self.update(BookOrder::new(
            OrderSide::BUY.as_str(),
            OrderSide::BUY,
            tick.bid,
            tick.bid_size,
        ))
        .expect("L1 quote update cannot fail");
        self.update(BookOrder::new(
            OrderSide::SELL.as_str(),
            OrderSide::SELL,
            tick.ask,
            tick.ask_size,
        ))
        .expect("L1 quote update cannot fail");
    }

    /// A trade prints on the side the aggressor consumed; the opposite top is
    /// snapped to the trade price if it would otherwise cross.
    fn update_trade_tick(&mut self, tick: &TradeTick) {
        match tick.aggressor_side {
            OrderSide::SELL => {
                // Seller hit the bid: the bid top becomes the trade print.
                self.update(BookOrder::new(
                    OrderSide::BUY.as_str(),
                    OrderSide::BUY,
                    tick.price,
                    tick.size,
                ))
                .expect("L1 trade update cannot fail");
                if let (Some(bid), Some(ask)) = (self.best_bid_price(), self.best_ask_price()) {
                    if bid >= ask {
                        let size = self.best_ask_qty().unwrap_or_else(Quantity::zero);
                        self.update(BookOrder::new(
                            OrderSide::SELL.as_str(),
                            OrderSide::SELL,
                            bid,
                            size,
                        ))
                        .expect("L1 trade update cannot fail");
                    }
                }
            }
            OrderSide::BUY => {
                // Buyer lifted the ask: the ask top becomes the trade print.
                self.update(BookOrder::new(
                    OrderSide::SELL.as_str(),
                    OrderSide::SELL,
                    tick.price,
                    tick.size,
                ))
                .expect("L1 trade update cannot fail");
                if let (Some(bid), Some(ask)) = (self.best_bid_price(), self.best_ask_price()) {
                    if ask <= bid {
                        let size = self.best_bid_qty().unwrap_or_else(Quantity::zero);
                        self.update(BookOrder::new(
                            OrderSide::BUY.as_str(),
                            OrderSide::BUY,
                            ask,
                            size,
                        ))
                        .expect("L1 trade update cannot fail");
                    }
                }
            }
        }
    }

    /// Project the current contents as a snapshot, aggregated per level
    pub fn snapshot(&self) -> OrderBookSnapshot {
        OrderBookSnapshot {
            instrument_id: self.instrument_id.clone(),
            level: self.level,
            bids: self
                .bids
                .iter()
                .map(|level| (level.price.as_decimal(), level.volume()))
                .collect(),
            asks: self
                .asks
                .iter()
                .map(|level| (level.price.as_decimal(), level.volume()))
                .collect(),
            ts_event_ns: self.last_update_timestamp_ns,
        }
    }

    /// Empty both sides (timestamp is retained)
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    pub fn clear_bids(&mut self) {
        self.bids.clear();
    }

    pub fn clear_asks(&mut self) {
        self.asks.clear();
    }

    pub fn best_bid_level(&self) -> Option<&Level> {
        self.bids.top()
    }

    pub fn best_ask_level(&self) -> Option<&Level> {
        self.asks.top()
    }

    pub fn best_bid_price(&self) -> Option<Price> {
        self.bids.top().map(|level| level.price)
    }

    pub fn best_ask_price(&self) -> Option<Price> {
        self.asks.top().map(|level| level.price)
    }

    pub fn best_bid_qty(&self) -> Option<Quantity> {
        self.bids.top().map(|level| Quantity::new(level.volume()))
    }

    pub fn best_ask_qty(&self) -> Option<Quantity> {
        self.asks.top().map(|level| Quantity::new(level.volume()))
    }

    /// best_ask − best_bid, None when either side is empty
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid_price(), self.best_ask_price()) {
            (Some(bid), Some(ask)) => Some(ask.as_decimal() - bid.as_decimal()),
            _ => None,
        }
    }

    /// Midpoint of the tops, None when either side is empty
    pub fn midpoint(&self) -> Option<Decimal> {
        match (self.best_bid_price(), self.best_ask_price()) {
            (Some(bid), Some(ask)) => {
                Some((bid.as_decimal() + ask.as_decimal()) / Decimal::from(2))
            }
            _ => None,
        }
    }

    /// Classify the aggressor of a trade from the last known tops
    ///
    /// `None` means the print is inside the spread and cannot be classified.
    pub fn trade_side(&self, trade: &TradeTick) -> Option<OrderSide> {
        if let Some(bid) = self.last_bid {
            if trade.price <= bid {
                return Some(OrderSide::SELL);
            }
        }
        if let Some(ask) = self.last_ask {
            if trade.price >= ask {
                return Some(OrderSide::BUY);
            }
        }
        None
    }

    /// Assert the structural invariants; panics on violation (bug signal)
    pub fn check_integrity(&self) {
        if let (Some(bid), Some(ask)) = (self.best_bid_price(), self.best_ask_price()) {
            match self.level {
                // A trade print may legitimately pinch an L1 book to a locked
                // (equal) top; it must never invert.
                BookLevel::L1 => assert!(
                    bid <= ask,
                    "Book crossed: best_bid {} > best_ask {} ({})",
                    bid,
                    ask,
                    self.instrument_id
                ),
                _ => assert!(
                    bid < ask,
                    "Book crossed: best_bid {} >= best_ask {} ({})",
                    bid,
                    ask,
                    self.instrument_id
                ),
            }
        }
        match self.level {
            BookLevel::L1 => {
                assert!(self.bids.len() <= 1, "L1 book with {} bid levels", self.bids.len());
                assert!(self.asks.len() <= 1, "L1 book with {} ask levels", self.asks.len());
            }
            BookLevel::L2 => {
                for level in self.bids.iter().chain(self.asks.iter()) {
                    assert!(
                        level.len() == 1,
                        "L2 level at {} holds {} orders",
                        level.price,
                        level.len()
                    );
                }
            }
            BookLevel::L3 => {}
        }
    }

    fn ladder_mut(&mut self, side: OrderSide) -> &mut Ladder {
        match side {
            OrderSide::BUY => &mut self.bids,
            OrderSide::SELL => &mut self.asks,
        }
    }

    /// L2: the canonical encoding of "one order per level"
    fn rewrite_id_to_price(&self, mut order: BookOrder) -> BookOrder {
        let price = order.price.round_dp(self.price_precision as u32);
        order.id = format_price_id(price, self.price_precision);
        order
    }

    /// L1: the canonical encoding of "one level per side"
    fn rewrite_id_to_side(&self, mut order: BookOrder) -> BookOrder {
        order.id = order.side.as_str().to_string();
        order
    }

    /// Feeds update bid and ask non-atomically; an incoming L1 quote that
    /// crosses the stale opposite side wins, and the stale side is dropped.
    fn absorb_crossed_feed(&mut self, order: &BookOrder) {
        match order.side {
            OrderSide::BUY => {
                if let Some(ask) = self.best_ask_price() {
                    if order.price >= ask {
                        debug!(
                            instrument_id = %self.instrument_id,
                            bid = %order.price,
                            ask = %ask,
                            "Crossed L1 feed absorbed: clearing asks"
                        );
                        self.asks.clear();
                    }
                }
            }
            OrderSide::SELL => {
                if let Some(bid) = self.best_bid_price() {
                    if order.price <= bid {
                        debug!(
                            instrument_id = %self.instrument_id,
                            bid = %bid,
                            ask = %order.price,
                            "Crossed L1 feed absorbed: clearing bids"
                        );
                        self.bids.clear();
                    }
                }
            }
        }
    }

    fn remove_level_at(&mut self, side: OrderSide, price: Price) {
        let price = price.round_dp(self.price_precision as u32);
        let id = format_price_id(price, self.price_precision);
        let probe = BookOrder::new(id, side, price, Quantity::zero());
        self.ladder_mut(side).delete(&probe);
    }

    fn refresh_tops(&mut self) {
        if let Some(bid) = self.best_bid_price() {
            self.last_bid = Some(bid);
        }
        if let Some(ask) = self.best_ask_price() {
            self.last_ask = Some(ask);
        }
    }
}

fn format_price_id(price: Price, precision: u8) -> String {
    format!("{:.*}", precision as usize, price.as_decimal())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(side: OrderSide, price: &str, size: &str) -> BookOrder {
        BookOrder::new(
            format!("{}-{}-{}", side.as_str(), price, size),
            side,
            Price::from_str(price).unwrap(),
            Quantity::from_str(size).unwrap(),
        )
    }

    fn l2_book() -> OrderBook {
        OrderBook::new(InstrumentId::new("BTC/USDT"), BookLevel::L2, 2, 6)
    }

    fn l1_book() -> OrderBook {
        OrderBook::new(InstrumentId::new("AUD/USD"), BookLevel::L1, 5, 0)
    }

    fn l3_book() -> OrderBook {
        OrderBook::new(InstrumentId::new("BTC/USDT"), BookLevel::L3, 2, 6)
    }

    #[test]
    fn test_empty_book_tops_are_none() {
        let book = l2_book();
        assert!(book.best_bid_price().is_none());
        assert!(book.best_ask_price().is_none());
        assert!(book.spread().is_none());
        assert!(book.midpoint().is_none());
    }

    #[test]
    fn test_l2_update_is_replace() {
        let mut book = l2_book();
        book.add(order(OrderSide::BUY, "100.00", "5")).unwrap();
        book.update(order(OrderSide::BUY, "100.00", "7")).unwrap();

        assert_eq!(book.bids.len(), 1);
        let top = book.best_bid_level().unwrap();
        assert_eq!(top.volume(), Decimal::from(7));
        assert_eq!(top.len(), 1);
        book.check_integrity();
    }

    #[test]
    fn test_l2_ids_are_price_stable() {
        let mut book = l2_book();
        book.add(order(OrderSide::SELL, "101.50", "1")).unwrap();
        let top = book.best_ask_level().unwrap();
        assert_eq!(top.orders()[0].id, "101.50");
    }

    #[test]
    fn test_l1_ids_are_side_names() {
        let mut book = l1_book();
        book.update(order(OrderSide::BUY, "100", "10")).unwrap();
        let top = book.best_bid_level().unwrap();
        assert_eq!(top.orders()[0].id, "BUY");
    }

    #[test]
    fn test_l1_add_unsupported() {
        let mut book = l1_book();
        let result = book.add(order(OrderSide::BUY, "1.00000", "100"));
        assert_eq!(result, Err(BookError::L1AddNotSupported));
    }

    #[test]
    fn test_l1_one_level_per_side() {
        let mut book = l1_book();
        book.update(order(OrderSide::BUY, "1.00000", "100")).unwrap();
        book.update(order(OrderSide::BUY, "1.00010", "200")).unwrap();

        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.best_bid_price(), Some(Price::from_str("1.00010").unwrap()));
        assert_eq!(book.best_bid_qty(), Some(Quantity::from_u64(200)));
        book.check_integrity();
    }

    #[test]
    fn test_l1_crossed_feed_absorbed() {
        let mut book = l1_book();
        book.update(order(OrderSide::SELL, "100", "10")).unwrap();
        // Bid update at 101 crosses the stale ask at 100: asks cleared.
        book.update(order(OrderSide::BUY, "101", "10")).unwrap();

        assert!(book.best_ask_price().is_none());
        assert_eq!(book.best_bid_price(), Some(Price::from_u64(101)));

        // Subsequent ask insertion becomes the new top.
        book.update(order(OrderSide::SELL, "102", "5")).unwrap();
        assert_eq!(book.best_ask_price(), Some(Price::from_u64(102)));
        book.check_integrity();
    }

    #[test]
    fn test_l1_quote_tick_updates_both_sides() {
        let mut book = l1_book();
        let tick = Tick::Quote(QuoteTick {
            instrument_id: InstrumentId::new("AUD/USD"),
            bid: Price::from_str("0.79000").unwrap(),
            ask: Price::from_str("0.79010").unwrap(),
            bid_size: Quantity::from_u64(100),
            ask_size: Quantity::from_u64(200),
            ts_event_ns: 7,
        });
        book.update_top(&tick).unwrap();

        assert_eq!(book.best_bid_price(), Some(Price::from_str("0.79000").unwrap()));
        assert_eq!(book.best_ask_price(), Some(Price::from_str("0.79010").unwrap()));
        assert_eq!(book.last_update_timestamp_ns(), 7);
        book.check_integrity();
    }

    #[test]
    fn l1_trade_tick_snaps_crossed_opposite_side() {
        let mut book = l1_book();
        book.update(order(OrderSide::BUY, "100", "10")).unwrap();
        book.update(order(OrderSide::SELL, "101", "10")).unwrap();

        // Buyer lifts through the book at 102: ask prints at 102, and the
        // bid (100 < 102, not crossed) stays put.
        let trade = TradeTick {
            instrument_id: InstrumentId::new("AUD/USD"),
            price: Price::from_u64(102),
            size: Quantity::from_u64(5),
            aggressor_side: OrderSide::BUY,
            match_id: "T-1".to_string(),
            ts_event_ns: 8,
        };
        book.update_top(&Tick::Trade(trade)).unwrap();
        assert_eq!(book.best_ask_price(), Some(Price::from_u64(102)));
        assert_eq!(book.best_bid_price(), Some(Price::from_u64(100)));

        // A buy prints at 97, below the resting bid at 100: the ask side
        // takes the print and the crossed bid is snapped down to it.
        let trade = TradeTick {
            instrument_id: InstrumentId::new("AUD/USD"),
            price: Price::from_u64(97),
            size: Quantity::from_u64(5),
            aggressor_side: OrderSide::BUY,
            match_id: "T-2".to_string(),
            ts_event_ns: 9,
        };
        book.update_top(&Tick::Trade(trade)).unwrap();
        // Ask printed at 97; bid at 100 crossed it, so the bid is snapped
        // down to the trade price (assignment, not comparison).
        assert_eq!(book.best_ask_price(), Some(Price::from_u64(97)));
        assert_eq!(book.best_bid_price(), Some(Price::from_u64(97)));
        book.check_integrity();
    }

    #[test]
    fn test_l3_levels_hold_many_orders() {
        let mut book = l3_book();
        book.add(order(OrderSide::BUY, "100.00", "1")).unwrap();
        book.add(order(OrderSide::BUY, "100.00", "2")).unwrap();

        let top = book.best_bid_level().unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top.volume(), Decimal::from(3));
        book.check_integrity();
    }

    #[test]
    fn test_apply_delta_level_mismatch() {
        let mut book = l2_book();
        let delta = OrderBookDelta {
            instrument_id: InstrumentId::new("BTC/USDT"),
            level: BookLevel::L3,
            action: DeltaAction::Add,
            order: order(OrderSide::BUY, "100.00", "1"),
            ts_event_ns: 1,
        };
        let result = book.apply_delta(&delta);
        assert_eq!(
            result,
            Err(BookError::LevelMismatch {
                book: BookLevel::L2,
                data: BookLevel::L3,
            })
        );
        // book unchanged
        assert!(book.best_bid_price().is_none());
        assert_eq!(book.last_update_timestamp_ns(), 0);
    }

    #[test]
    fn test_apply_deltas_advances_timestamp() {
        let mut book = l2_book();
        let deltas = OrderBookDeltas {
            instrument_id: InstrumentId::new("BTC/USDT"),
            level: BookLevel::L2,
            deltas: vec![
                OrderBookDelta {
                    instrument_id: InstrumentId::new("BTC/USDT"),
                    level: BookLevel::L2,
                    action: DeltaAction::Add,
                    order: order(OrderSide::BUY, "100.00", "1"),
                    ts_event_ns: 5,
                },
                OrderBookDelta {
                    instrument_id: InstrumentId::new("BTC/USDT"),
                    level: BookLevel::L2,
                    action: DeltaAction::Update,
                    order: order(OrderSide::BUY, "100.00", "3"),
                    ts_event_ns: 6,
                },
            ],
            ts_event_ns: 6,
        };
        book.apply_deltas(&deltas).unwrap();

        assert_eq!(book.last_update_timestamp_ns(), 6);
        assert_eq!(book.best_bid_qty(), Some(Quantity::from_u64(3)));
    }

    #[test]
    fn test_apply_snapshot_replaces_contents() {
        let mut book = l2_book();
        book.add(order(OrderSide::BUY, "90.00", "1")).unwrap();

        let snapshot = OrderBookSnapshot {
            instrument_id: InstrumentId::new("BTC/USDT"),
            level: BookLevel::L2,
            bids: vec![
                (Decimal::from(100), Decimal::from(5)),
                (Decimal::from(99), Decimal::from(10)),
            ],
            asks: vec![(Decimal::from(101), Decimal::from(3))],
            ts_event_ns: 9,
        };
        book.apply_snapshot(&snapshot).unwrap();

        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.best_bid_price(), Some(Price::from_u64(100)));
        assert_eq!(book.best_ask_price(), Some(Price::from_u64(101)));
        assert_eq!(book.last_update_timestamp_ns(), 9);
        book.check_integrity();
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut book = l2_book();
        book.add(order(OrderSide::BUY, "100.00", "5")).unwrap();
        book.clear();
        book.clear();
        assert!(book.best_bid_price().is_none());
        assert!(book.best_ask_price().is_none());
    }

    #[test]
    fn test_trade_side_classification() {
        let mut book = l2_book();
        book.add(order(OrderSide::BUY, "100.00", "5")).unwrap();
        book.add(order(OrderSide::SELL, "101.00", "5")).unwrap();

        let trade = |price: u64| TradeTick {
            instrument_id: InstrumentId::new("BTC/USDT"),
            price: Price::from_u64(price),
            size: Quantity::from_u64(1),
            aggressor_side: OrderSide::BUY,
            match_id: "T".to_string(),
            ts_event_ns: 1,
        };

        assert_eq!(book.trade_side(&trade(100)), Some(OrderSide::SELL));
        assert_eq!(book.trade_side(&trade(99)), Some(OrderSide::SELL));
        assert_eq!(book.trade_side(&trade(101)), Some(OrderSide::BUY));
        assert_eq!(book.trade_side(&trade(102)), Some(OrderSide::BUY));
    }

    #[test]
    fn test_trade_side_inside_spread_unclassified() {
        let mut book = OrderBook::new(InstrumentId::new("BTC/USDT"), BookLevel::L2, 2, 6);
        book.add(order(OrderSide::BUY, "100.00", "5")).unwrap();
        book.add(order(OrderSide::SELL, "103.00", "5")).unwrap();

        let trade = TradeTick {
            instrument_id: InstrumentId::new("BTC/USDT"),
            price: Price::from_str("101.50").unwrap(),
            size: Quantity::from_u64(1),
            aggressor_side: OrderSide::BUY,
            match_id: "T".to_string(),
            ts_event_ns: 1,
        };
        assert_eq!(book.trade_side(&trade), None);
    }

    #[test]
    fn test_trade_side_uses_last_known_tops() {
        let mut book = l2_book();
        book.add(order(OrderSide::BUY, "100.00", "5")).unwrap();
        book.update(order(OrderSide::BUY, "100.00", "0")).unwrap(); // level removed

        assert!(book.best_bid_price().is_none());
        let trade = TradeTick {
            instrument_id: InstrumentId::new("BTC/USDT"),
            price: Price::from_u64(99),
            size: Quantity::from_u64(1),
            aggressor_side: OrderSide::SELL,
            match_id: "T".to_string(),
            ts_event_ns: 1,
        };
        assert_eq!(book.trade_side(&trade), Some(OrderSide::SELL));
    }

    #[test]
    #[should_panic(expected = "Book crossed")]
    fn test_check_integrity_panics_on_crossed_l2() {
        let mut book = l2_book();
        book.add(order(OrderSide::BUY, "102.00", "5")).unwrap();
        book.add(order(OrderSide::SELL, "101.00", "5")).unwrap();
        book.check_integrity();
    }

    #[test]
    fn test_update_top_rejected_on_l2() {
        let mut book = l2_book();
        let tick = Tick::Trade(TradeTick {
            instrument_id: InstrumentId::new("BTC/USDT"),
            price: Price::from_u64(100),
            size: Quantity::from_u64(1),
            aggressor_side: OrderSide::BUY,
            match_id: "T".to_string(),
            ts_event_ns: 1,
        });
        assert_eq!(book.update_top(&tick), Err(BookError::NotAnL1Book));
    }
}

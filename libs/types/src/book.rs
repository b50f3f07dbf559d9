//! Order book data types
//!
//! Inbound market data shapes: resting book orders, snapshots, deltas and
//! ticks. Every book data item carries the book level it was built for;
//! applying data to a book of a different level is a validation error.

use crate::ids::InstrumentId;
use crate::numeric::{Price, Quantity};
use crate::order::OrderSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order book granularity
///
/// - `L1`: top-of-book only (at most one level per side)
/// - `L2`: aggregated depth (exactly one order per level)
/// - `L3`: full order-by-order depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookLevel {
    L1,
    L2,
    L3,
}

impl fmt::Display for BookLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookLevel::L1 => write!(f, "L1"),
            BookLevel::L2 => write!(f, "L2"),
            BookLevel::L3 => write!(f, "L3"),
        }
    }
}

/// A resting order inside a book
///
/// In L2 books the id is rewritten to a canonical price string before
/// insertion (one order per level); in L1 books it is rewritten to the side
/// name (one level per side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookOrder {
    pub id: String,
    pub side: OrderSide,
    pub price: Price,
    pub size: Quantity,
}

impl BookOrder {
    pub fn new(id: impl Into<String>, side: OrderSide, price: Price, size: Quantity) -> Self {
        Self {
            id: id.into(),
            side,
            price,
            size,
        }
    }

    /// The notional exposure of this order (price × size).
    pub fn exposure(&self) -> Decimal {
        self.price.as_decimal() * self.size.as_decimal()
    }
}

/// Kind of change a delta applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeltaAction {
    Add,
    Update,
    Delete,
}

/// A single incremental book change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookDelta {
    pub instrument_id: InstrumentId,
    pub level: BookLevel,
    pub action: DeltaAction,
    pub order: BookOrder,
    pub ts_event_ns: i64,
}

/// A batch of deltas applied atomically, in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookDeltas {
    pub instrument_id: InstrumentId,
    pub level: BookLevel,
    pub deltas: Vec<OrderBookDelta>,
    pub ts_event_ns: i64,
}

/// A full book image: (price, size) pairs per side, best-first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub instrument_id: InstrumentId,
    pub level: BookLevel,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
    pub ts_event_ns: i64,
}

/// Inbound order book data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderBookData {
    Snapshot(OrderBookSnapshot),
    Deltas(OrderBookDeltas),
    Delta(OrderBookDelta),
}

impl OrderBookData {
    pub fn instrument_id(&self) -> &InstrumentId {
        match self {
            OrderBookData::Snapshot(s) => &s.instrument_id,
            OrderBookData::Deltas(d) => &d.instrument_id,
            OrderBookData::Delta(d) => &d.instrument_id,
        }
    }

    pub fn level(&self) -> BookLevel {
        match self {
            OrderBookData::Snapshot(s) => s.level,
            OrderBookData::Deltas(d) => d.level,
            OrderBookData::Delta(d) => d.level,
        }
    }

    pub fn ts_event_ns(&self) -> i64 {
        match self {
            OrderBookData::Snapshot(s) => s.ts_event_ns,
            OrderBookData::Deltas(d) => d.ts_event_ns,
            OrderBookData::Delta(d) => d.ts_event_ns,
        }
    }
}

/// Top-of-book quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteTick {
    pub instrument_id: InstrumentId,
    pub bid: Price,
    pub ask: Price,
    pub bid_size: Quantity,
    pub ask_size: Quantity,
    pub ts_event_ns: i64,
}

/// A single executed trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeTick {
    pub instrument_id: InstrumentId,
    pub price: Price,
    pub size: Quantity,
    /// Side of the order that initiated (took liquidity in) the trade.
    pub aggressor_side: OrderSide,
    pub match_id: String,
    pub ts_event_ns: i64,
}

/// Inbound tick data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tick {
    Quote(QuoteTick),
    Trade(TradeTick),
}

impl Tick {
    pub fn instrument_id(&self) -> &InstrumentId {
        match self {
            Tick::Quote(q) => &q.instrument_id,
            Tick::Trade(t) => &t.instrument_id,
        }
    }

    pub fn ts_event_ns(&self) -> i64 {
        match self {
            Tick::Quote(q) => q.ts_event_ns,
            Tick::Trade(t) => t.ts_event_ns,
        }
    }
}

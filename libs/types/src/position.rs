//! Position aggregate
//!
//! Event-sourced from fills: created from the opening `OrderFilled`, mutated
//! only by `apply`. Handles increase, reduce, close and flip. A flat
//! position is retained for audit and accepts no further fills.

use crate::errors::PositionError;
use crate::events::OrderFilled;
use crate::ids::{InstrumentId, PositionId};
use crate::numeric::Quantity;
use crate::order::OrderSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    LONG,
    SHORT,
    FLAT,
}

/// Net position for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub instrument_id: InstrumentId,
    pub side: PositionSide,
    pub quantity: Quantity,
    /// Largest quantity held over the position's life.
    pub peak_quantity: Quantity,
    /// Volume-weighted average entry price.
    pub avg_px_open: Decimal,
    /// Realized profit in the quote currency.
    pub realized_pnl: Decimal,
    pub opened_ns: i64,
    pub closed_ns: Option<i64>,
    events: Vec<OrderFilled>,
}

impl Position {
    /// Construct from the opening fill
    pub fn new(fill: OrderFilled) -> Self {
        let side = match fill.side {
            OrderSide::BUY => PositionSide::LONG,
            OrderSide::SELL => PositionSide::SHORT,
        };
        Self {
            id: fill.position_id.clone(),
            instrument_id: fill.instrument_id.clone(),
            side,
            quantity: fill.last_qty,
            peak_quantity: fill.last_qty,
            avg_px_open: fill.last_px.as_decimal(),
            realized_pnl: Decimal::ZERO,
            opened_ns: fill.ts_event_ns,
            closed_ns: None,
            events: vec![fill],
        }
    }

    pub fn is_long(&self) -> bool {
        self.side == PositionSide::LONG
    }

    pub fn is_short(&self) -> bool {
        self.side == PositionSide::SHORT
    }

    pub fn is_closed(&self) -> bool {
        self.side == PositionSide::FLAT
    }

    /// Signed quantity: positive long, negative short
    pub fn signed_qty(&self) -> Decimal {
        match self.side {
            PositionSide::LONG => self.quantity.as_decimal(),
            PositionSide::SHORT => -self.quantity.as_decimal(),
            PositionSide::FLAT => Decimal::ZERO,
        }
    }

    pub fn events(&self) -> &[OrderFilled] {
        &self.events
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Fold a fill into the position
    pub fn apply(&mut self, fill: &OrderFilled) -> Result<(), PositionError> {
        if fill.instrument_id != self.instrument_id {
            return Err(PositionError::InstrumentMismatch {
                position_instrument: self.instrument_id.to_string(),
                fill_instrument: fill.instrument_id.to_string(),
            });
        }
        if self.is_closed() {
            return Err(PositionError::PositionClosed {
                position_id: self.id.to_string(),
            });
        }

        let increases = matches!(
            (self.side, fill.side),
            (PositionSide::LONG, OrderSide::BUY) | (PositionSide::SHORT, OrderSide::SELL)
        );

        if increases {
            self.increase(fill);
        } else {
            self.reduce(fill);
        }

        self.events.push(fill.clone());
        Ok(())
    }

    fn increase(&mut self, fill: &OrderFilled) {
        let old_qty = self.quantity.as_decimal();
        let new_qty = old_qty + fill.last_qty.as_decimal();
        self.avg_px_open =
            (self.avg_px_open * old_qty + fill.notional()) / new_qty;
        self.quantity = Quantity::new(new_qty);
        if self.quantity > self.peak_quantity {
            self.peak_quantity = self.quantity;
        }
    }

    fn reduce(&mut self, fill: &OrderFilled) {
        let direction = match self.side {
            PositionSide::LONG => Decimal::ONE,
            PositionSide::SHORT => -Decimal::ONE,
            PositionSide::FLAT => unreachable!("checked by apply"),
        };
        let pos_qty = self.quantity.as_decimal();
        let fill_qty = fill.last_qty.as_decimal();
        let closed_qty = pos_qty.min(fill_qty);

        self.realized_pnl +=
            (fill.last_px.as_decimal() - self.avg_px_open) * closed_qty * direction;

        if fill_qty < pos_qty {
            self.quantity = Quantity::new(pos_qty - fill_qty);
        } else if fill_qty == pos_qty {
            self.quantity = Quantity::zero();
            self.side = PositionSide::FLAT;
            self.closed_ns = Some(fill.ts_event_ns);
        } else {
            // Flip: the excess opens in the fill's direction at its price.
            let excess = fill_qty - pos_qty;
            self.side = match fill.side {
                OrderSide::BUY => PositionSide::LONG,
                OrderSide::SELL => PositionSide::SHORT,
            };
            self.quantity = Quantity::new(excess);
            self.avg_px_open = fill.last_px.as_decimal();
        }
    }
}

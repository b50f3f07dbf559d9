//! Order state machine
//!
//! Orders are event-sourced: an `Order` is constructed from its
//! `OrderInitialized` seed and mutated only through `apply`. Both the
//! simulated exchange and the object cache fold the same event stream, so a
//! reconstructed order is bit-identical to the live one.
//!
//! ```text
//!                  ┌───────────┐
//!   Submit ───────▶│ SUBMITTED │──reject──▶ REJECTED
//!                  └────┬──────┘
//!                       │accept
//!                  ┌────▼──────┐
//!                  │ ACCEPTED  │──cancel──▶ CANCELED
//!                  └────┬──────┘──expire──▶ EXPIRED
//!         (stop)  trigger│
//!                  ┌────▼──────┐
//!                  │ TRIGGERED │
//!                  └────┬──────┘
//!                 partial/full fill
//!                  ┌────▼──────┐
//!                  │ FILLED    │
//!                  └───────────┘
//! ```

use crate::errors::OrderError;
use crate::events::{OrderEvent, OrderFilled, OrderInitialized};
use crate::ids::{ClientOrderId, InstrumentId, VenueOrderId};
use crate::numeric::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    /// Buy order (bid)
    BUY,
    /// Sell order (ask)
    SELL,
}

impl OrderSide {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::BUY => OrderSide::SELL,
            OrderSide::SELL => OrderSide::BUY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::BUY => "BUY",
            OrderSide::SELL => "SELL",
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    StopLimit,
}

/// Time-in-force policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum TimeInForce {
    /// Good-Till-Cancel: remains until filled or explicitly canceled
    GTC,
    /// Immediate-Or-Cancel: match immediately, cancel remainder
    IOC,
    /// Fill-Or-Kill: full match or reject entirely
    FOK,
    /// Good-Till-Date: expire at specified Unix nanos timestamp
    GTD(i64),
}

impl TimeInForce {
    /// The expiry timestamp, if this policy has one.
    pub fn expire_time_ns(&self) -> Option<i64> {
        match self {
            TimeInForce::GTD(ns) => Some(*ns),
            _ => None,
        }
    }
}

/// Order lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    Initialized,
    Submitted,
    Accepted,
    /// Stop trigger hit; stop-limit now working as a limit order.
    Triggered,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderState {
    /// Check if state is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Canceled | OrderState::Rejected | OrderState::Expired
        )
    }

    /// Whether the order is resting at the venue awaiting fills or triggers.
    pub fn is_working(&self) -> bool {
        matches!(
            self,
            OrderState::Accepted | OrderState::Triggered | OrderState::PartiallyFilled
        )
    }
}

/// An order, reconstructed by folding its event stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub client_order_id: ClientOrderId,
    pub instrument_id: InstrumentId,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub price: Option<Price>,
    pub trigger: Option<Price>,
    pub time_in_force: TimeInForce,
    pub post_only: bool,
    pub reduce_only: bool,
    pub state: OrderState,
    pub venue_order_id: Option<VenueOrderId>,
    pub filled_qty: Quantity,
    pub leaves_qty: Quantity,
    pub avg_px: Option<Decimal>,
    pub ts_init_ns: i64,
    pub ts_last_ns: i64,
}

impl Order {
    /// Construct from the seed event
    pub fn new(init: OrderInitialized) -> Self {
        Self {
            client_order_id: init.client_order_id,
            instrument_id: init.instrument_id,
            side: init.side,
            order_type: init.order_type,
            quantity: init.quantity,
            price: init.price,
            trigger: init.trigger,
            time_in_force: init.time_in_force,
            post_only: init.post_only,
            reduce_only: init.reduce_only,
            state: OrderState::Initialized,
            venue_order_id: None,
            filled_qty: Quantity::zero(),
            leaves_qty: init.quantity,
            avg_px: None,
            ts_init_ns: init.ts_event_ns,
            ts_last_ns: init.ts_event_ns,
        }
    }

    /// Convenience constructor for a market order
    pub fn market(
        client_order_id: ClientOrderId,
        instrument_id: InstrumentId,
        side: OrderSide,
        quantity: Quantity,
        ts_init_ns: i64,
    ) -> Self {
        Self::new(OrderInitialized {
            client_order_id,
            instrument_id,
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            trigger: None,
            time_in_force: TimeInForce::GTC,
            post_only: false,
            reduce_only: false,
            event_id: Uuid::now_v7(),
            ts_event_ns: ts_init_ns,
        })
    }

    /// Convenience constructor for a limit order
    pub fn limit(
        client_order_id: ClientOrderId,
        instrument_id: InstrumentId,
        side: OrderSide,
        quantity: Quantity,
        price: Price,
        time_in_force: TimeInForce,
        ts_init_ns: i64,
    ) -> Self {
        Self::new(OrderInitialized {
            client_order_id,
            instrument_id,
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            trigger: None,
            time_in_force,
            post_only: false,
            reduce_only: false,
            event_id: Uuid::now_v7(),
            ts_event_ns: ts_init_ns,
        })
    }

    /// Convenience constructor for a stop-market order
    pub fn stop_market(
        client_order_id: ClientOrderId,
        instrument_id: InstrumentId,
        side: OrderSide,
        quantity: Quantity,
        trigger: Price,
        ts_init_ns: i64,
    ) -> Self {
        Self::new(OrderInitialized {
            client_order_id,
            instrument_id,
            side,
            order_type: OrderType::StopMarket,
            quantity,
            price: None,
            trigger: Some(trigger),
            time_in_force: TimeInForce::GTC,
            post_only: false,
            reduce_only: false,
            event_id: Uuid::now_v7(),
            ts_event_ns: ts_init_ns,
        })
    }

    /// Convenience constructor for a stop-limit order
    pub fn stop_limit(
        client_order_id: ClientOrderId,
        instrument_id: InstrumentId,
        side: OrderSide,
        quantity: Quantity,
        trigger: Price,
        price: Price,
        ts_init_ns: i64,
    ) -> Self {
        Self::new(OrderInitialized {
            client_order_id,
            instrument_id,
            side,
            order_type: OrderType::StopLimit,
            quantity,
            price: Some(price),
            trigger: Some(trigger),
            time_in_force: TimeInForce::GTC,
            post_only: false,
            reduce_only: false,
            event_id: Uuid::now_v7(),
            ts_event_ns: ts_init_ns,
        })
    }

    /// The seed event this order was (or could be) constructed from
    pub fn init_event(&self) -> OrderInitialized {
        OrderInitialized {
            client_order_id: self.client_order_id.clone(),
            instrument_id: self.instrument_id.clone(),
            side: self.side,
            order_type: self.order_type,
            quantity: self.quantity,
            price: self.price,
            trigger: self.trigger,
            time_in_force: self.time_in_force,
            post_only: self.post_only,
            reduce_only: self.reduce_only,
            event_id: Uuid::now_v7(),
            ts_event_ns: self.ts_init_ns,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.side == OrderSide::BUY
    }

    pub fn is_sell(&self) -> bool {
        self.side == OrderSide::SELL
    }

    /// Whether the order rests in the book awaiting a counterparty (not market).
    pub fn is_passive(&self) -> bool {
        self.order_type != OrderType::Market
    }

    pub fn is_working(&self) -> bool {
        self.state.is_working()
    }

    pub fn is_completed(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn expire_time_ns(&self) -> Option<i64> {
        self.time_in_force.expire_time_ns()
    }

    /// Fold one event into the order
    ///
    /// Returns an error (and leaves the order unchanged) for transitions the
    /// state machine does not allow.
    pub fn apply(&mut self, event: &OrderEvent) -> Result<(), OrderError> {
        if event.client_order_id() != &self.client_order_id {
            return Err(OrderError::ClientOrderIdMismatch {
                order_id: self.client_order_id.to_string(),
                event_order_id: event.client_order_id().to_string(),
            });
        }

        match event {
            OrderEvent::Initialized(_) => return Err(OrderError::AlreadyInitialized),
            OrderEvent::Submitted { ts_event_ns, .. } => {
                self.transition(OrderState::Initialized, OrderState::Submitted, "Submitted")?;
                self.ts_last_ns = *ts_event_ns;
            }
            OrderEvent::Accepted {
                venue_order_id,
                ts_event_ns,
                ..
            } => {
                self.transition(OrderState::Submitted, OrderState::Accepted, "Accepted")?;
                self.venue_order_id = Some(venue_order_id.clone());
                self.ts_last_ns = *ts_event_ns;
            }
            OrderEvent::Rejected { ts_event_ns, .. } => {
                self.transition(OrderState::Submitted, OrderState::Rejected, "Rejected")?;
                self.ts_last_ns = *ts_event_ns;
            }
            OrderEvent::Triggered { ts_event_ns, .. } => {
                self.transition(OrderState::Accepted, OrderState::Triggered, "Triggered")?;
                self.ts_last_ns = *ts_event_ns;
            }
            OrderEvent::Updated {
                quantity,
                price,
                trigger,
                ts_event_ns,
                ..
            } => {
                if !self.state.is_working() {
                    return Err(self.bad_transition("Updated"));
                }
                self.quantity = *quantity;
                self.leaves_qty = Quantity::new(
                    quantity.as_decimal() - self.filled_qty.as_decimal(),
                );
                if price.is_some() {
                    self.price = *price;
                }
                if trigger.is_some() {
                    self.trigger = *trigger;
                }
                self.ts_last_ns = *ts_event_ns;
            }
            // Venue denials carry no state change for the order itself.
            OrderEvent::UpdateRejected { ts_event_ns, .. }
            | OrderEvent::CancelRejected { ts_event_ns, .. } => {
                self.ts_last_ns = *ts_event_ns;
            }
            OrderEvent::Canceled { ts_event_ns, .. } => {
                if self.state.is_terminal() {
                    return Err(self.bad_transition("Canceled"));
                }
                self.state = OrderState::Canceled;
                self.ts_last_ns = *ts_event_ns;
            }
            OrderEvent::Expired { ts_event_ns, .. } => {
                if !self.state.is_working() {
                    return Err(self.bad_transition("Expired"));
                }
                self.state = OrderState::Expired;
                self.ts_last_ns = *ts_event_ns;
            }
            OrderEvent::Filled(fill) => {
                if !self.state.is_working() {
                    return Err(self.bad_transition("Filled"));
                }
                self.apply_fill(fill)?;
            }
        }

        debug_assert!(
            self.filled_qty.as_decimal() + self.leaves_qty.as_decimal()
                == self.quantity.as_decimal(),
            "fill conservation violated"
        );
        Ok(())
    }

    fn apply_fill(&mut self, fill: &OrderFilled) -> Result<(), OrderError> {
        let new_filled = self.filled_qty.as_decimal() + fill.last_qty.as_decimal();
        if new_filled > self.quantity.as_decimal() {
            return Err(OrderError::FillExceedsQuantity {
                filled: self.filled_qty.to_string(),
                last: fill.last_qty.to_string(),
                quantity: self.quantity.to_string(),
            });
        }

        let notional = self.avg_px.unwrap_or(Decimal::ZERO)
            * self.filled_qty.as_decimal()
            + fill.notional();
        self.avg_px = Some(notional / new_filled);

        self.filled_qty = Quantity::new(new_filled);
        self.leaves_qty = Quantity::new(self.quantity.as_decimal() - new_filled);
        self.state = if self.leaves_qty.is_zero() {
            OrderState::Filled
        } else {
            OrderState::PartiallyFilled
        };
        self.ts_last_ns = fill.ts_event_ns;
        Ok(())
    }

    fn transition(
        &mut self,
        expected: OrderState,
        next: OrderState,
        event: &str,
    ) -> Result<(), OrderError> {
        if self.state != expected {
            return Err(self.bad_transition(event));
        }
        self.state = next;
        Ok(())
    }

    fn bad_transition(&self, event: &str) -> OrderError {
        OrderError::InvalidStateTransition {
            from: format!("{:?}", self.state),
            event: event.to_string(),
        }
    }
}

//! Execution event types
//!
//! Events are the only mutation channel for the event-sourced aggregates:
//! orders fold `OrderEvent`s, positions fold `OrderFilled`s, accounts fold
//! `AccountState`s. The persistence layer stores them as opaque serialized
//! lists, so every event is self-describing (tagged serde enum).

use crate::account::Balance;
use crate::ids::{
    AccountId, ClientOrderId, ExecutionId, InstrumentId, PositionId, VenueOrderId,
};
use crate::numeric::{Money, Price, Quantity};
use crate::order::{OrderSide, OrderType, TimeInForce};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of the trade provided liquidity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LiquiditySide {
    MAKER,
    TAKER,
}

/// Seed event for an order: the full immutable order definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInitialized {
    pub client_order_id: ClientOrderId,
    pub instrument_id: InstrumentId,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Quantity,
    /// Limit price (LIMIT and STOP_LIMIT orders).
    pub price: Option<Price>,
    /// Stop trigger price (STOP_MARKET and STOP_LIMIT orders).
    pub trigger: Option<Price>,
    pub time_in_force: TimeInForce,
    pub post_only: bool,
    pub reduce_only: bool,
    pub event_id: Uuid,
    pub ts_event_ns: i64,
}

/// A single fill slice against an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFilled {
    pub client_order_id: ClientOrderId,
    pub venue_order_id: VenueOrderId,
    pub execution_id: ExecutionId,
    pub position_id: PositionId,
    pub instrument_id: InstrumentId,
    pub side: OrderSide,
    pub last_qty: Quantity,
    pub last_px: Price,
    pub commission: Money,
    pub liquidity_side: LiquiditySide,
    pub event_id: Uuid,
    pub ts_event_ns: i64,
}

impl OrderFilled {
    /// Notional value of this slice (last_px × last_qty).
    pub fn notional(&self) -> rust_decimal::Decimal {
        self.last_px.as_decimal() * self.last_qty.as_decimal()
    }
}

/// Lifecycle events for a single order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OrderEvent {
    Initialized(OrderInitialized),
    Submitted {
        client_order_id: ClientOrderId,
        ts_event_ns: i64,
    },
    Accepted {
        client_order_id: ClientOrderId,
        venue_order_id: VenueOrderId,
        ts_event_ns: i64,
    },
    Rejected {
        client_order_id: ClientOrderId,
        reason: String,
        ts_event_ns: i64,
    },
    Triggered {
        client_order_id: ClientOrderId,
        ts_event_ns: i64,
    },
    Updated {
        client_order_id: ClientOrderId,
        quantity: Quantity,
        price: Option<Price>,
        trigger: Option<Price>,
        ts_event_ns: i64,
    },
    UpdateRejected {
        client_order_id: ClientOrderId,
        response: String,
        reason: String,
        ts_event_ns: i64,
    },
    CancelRejected {
        client_order_id: ClientOrderId,
        response: String,
        reason: String,
        ts_event_ns: i64,
    },
    Canceled {
        client_order_id: ClientOrderId,
        ts_event_ns: i64,
    },
    Expired {
        client_order_id: ClientOrderId,
        ts_event_ns: i64,
    },
    Filled(OrderFilled),
}

impl OrderEvent {
    pub fn client_order_id(&self) -> &ClientOrderId {
        match self {
            OrderEvent::Initialized(e) => &e.client_order_id,
            OrderEvent::Submitted { client_order_id, .. } => client_order_id,
            OrderEvent::Accepted { client_order_id, .. } => client_order_id,
            OrderEvent::Rejected { client_order_id, .. } => client_order_id,
            OrderEvent::Triggered { client_order_id, .. } => client_order_id,
            OrderEvent::Updated { client_order_id, .. } => client_order_id,
            OrderEvent::UpdateRejected { client_order_id, .. } => client_order_id,
            OrderEvent::CancelRejected { client_order_id, .. } => client_order_id,
            OrderEvent::Canceled { client_order_id, .. } => client_order_id,
            OrderEvent::Expired { client_order_id, .. } => client_order_id,
            OrderEvent::Filled(e) => &e.client_order_id,
        }
    }

    pub fn ts_event_ns(&self) -> i64 {
        match self {
            OrderEvent::Initialized(e) => e.ts_event_ns,
            OrderEvent::Submitted { ts_event_ns, .. } => *ts_event_ns,
            OrderEvent::Accepted { ts_event_ns, .. } => *ts_event_ns,
            OrderEvent::Rejected { ts_event_ns, .. } => *ts_event_ns,
            OrderEvent::Triggered { ts_event_ns, .. } => *ts_event_ns,
            OrderEvent::Updated { ts_event_ns, .. } => *ts_event_ns,
            OrderEvent::UpdateRejected { ts_event_ns, .. } => *ts_event_ns,
            OrderEvent::CancelRejected { ts_event_ns, .. } => *ts_event_ns,
            OrderEvent::Canceled { ts_event_ns, .. } => *ts_event_ns,
            OrderEvent::Expired { ts_event_ns, .. } => *ts_event_ns,
            OrderEvent::Filled(e) => e.ts_event_ns,
        }
    }
}

/// Snapshot of all account balances after a balance-changing operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub account_id: AccountId,
    pub balances: Vec<Balance>,
    pub event_id: Uuid,
    pub ts_event_ns: i64,
}

/// Any event emitted by the execution path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
    Order(OrderEvent),
    Account(AccountState),
}

impl ExecutionEvent {
    pub fn ts_event_ns(&self) -> i64 {
        match self {
            ExecutionEvent::Order(e) => e.ts_event_ns(),
            ExecutionEvent::Account(s) => s.ts_event_ns,
        }
    }
}

//! Trading commands
//!
//! The inbound contract of the execution path. Each command produces exactly
//! one acknowledgment event (accepted or rejected) from the venue.

use crate::ids::{ClientOrderId, InstrumentId};
use crate::numeric::{Price, Quantity};
use crate::order::Order;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Submit a single new order
///
/// Orders sharing a `link_id` form an OCO group: the first fill (including a
/// partial) cancels the other members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOrder {
    pub order: Order,
    pub link_id: Option<String>,
    pub command_id: Uuid,
    pub ts_init_ns: i64,
}

impl SubmitOrder {
    pub fn new(order: Order, ts_init_ns: i64) -> Self {
        Self {
            order,
            link_id: None,
            command_id: Uuid::now_v7(),
            ts_init_ns,
        }
    }

    pub fn with_link(order: Order, link_id: impl Into<String>, ts_init_ns: i64) -> Self {
        Self {
            order,
            link_id: Some(link_id.into()),
            command_id: Uuid::now_v7(),
            ts_init_ns,
        }
    }
}

/// Submit an entry order with stop-loss and take-profit children
///
/// The children activate when the entry fills and are OCO-linked to each
/// other; they are canceled if the entry is rejected or canceled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitBracketOrder {
    pub entry: Order,
    pub stop_loss: Order,
    pub take_profit: Order,
    pub command_id: Uuid,
    pub ts_init_ns: i64,
}

impl SubmitBracketOrder {
    pub fn new(entry: Order, stop_loss: Order, take_profit: Order, ts_init_ns: i64) -> Self {
        Self {
            entry,
            stop_loss,
            take_profit,
            command_id: Uuid::now_v7(),
            ts_init_ns,
        }
    }
}

/// Amend a working order in place
///
/// `None` fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOrder {
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub quantity: Option<Quantity>,
    pub price: Option<Price>,
    pub trigger: Option<Price>,
    pub command_id: Uuid,
    pub ts_init_ns: i64,
}

/// Cancel a working order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub command_id: Uuid,
    pub ts_init_ns: i64,
}

/// Any command accepted by the execution path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TradingCommand {
    Submit(SubmitOrder),
    SubmitBracket(SubmitBracketOrder),
    Update(UpdateOrder),
    Cancel(CancelOrder),
}

impl TradingCommand {
    pub fn instrument_id(&self) -> &InstrumentId {
        match self {
            TradingCommand::Submit(c) => &c.order.instrument_id,
            TradingCommand::SubmitBracket(c) => &c.entry.instrument_id,
            TradingCommand::Update(c) => &c.instrument_id,
            TradingCommand::Cancel(c) => &c.instrument_id,
        }
    }
}

//! Error taxonomy for the domain types
//!
//! Validation failures are typed errors surfaced synchronously; domain
//! rejections travel as events, not errors; integrity violations are
//! assertions (bug signals), not values of these types.

use thiserror::Error;

/// Instrument definition errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InstrumentError {
    #[error("Precision out of range: {precision} (max 28)")]
    PrecisionOutOfRange { precision: u8 },
}

/// Order state machine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("Invalid state transition: {from} -> {event}")]
    InvalidStateTransition { from: String, event: String },

    #[error("Order already initialized")]
    AlreadyInitialized,

    #[error("Fill would exceed order quantity: filled {filled} + last {last} > {quantity}")]
    FillExceedsQuantity {
        filled: String,
        last: String,
        quantity: String,
    },

    #[error("Event is for order {event_order_id}, not {order_id}")]
    ClientOrderIdMismatch {
        order_id: String,
        event_order_id: String,
    },
}

/// Position aggregate errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PositionError {
    #[error("Fill is for instrument {fill_instrument}, position is {position_instrument}")]
    InstrumentMismatch {
        position_instrument: String,
        fill_instrument: String,
    },

    #[error("Fill applied to closed position {position_id}")]
    PositionClosed { position_id: String },
}

/// Account ledger errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccountError {
    #[error("Insufficient free balance for {currency}: required {required}, free {free}")]
    InsufficientBalance {
        currency: String,
        required: String,
        free: String,
    },

    #[error("Insufficient locked balance for {currency}: required {required}, locked {locked}")]
    InsufficientLocked {
        currency: String,
        required: String,
        locked: String,
    },

    #[error("No balance held for currency {currency}")]
    CurrencyNotFound { currency: String },
}

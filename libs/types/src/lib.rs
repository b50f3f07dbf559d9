//! Shared domain types for the trading core
//!
//! Every crate in the workspace speaks these types: identifiers, fixed-point
//! numerics, instrument metadata, order book data, the order state machine,
//! trading commands, execution events, and the event-sourced account and
//! position aggregates.
//!
//! Prices and quantities are `rust_decimal` fixed-point throughout; floats
//! never appear on a money path. All timestamps are int64 nanoseconds since
//! the Unix epoch.

pub mod account;
pub mod book;
pub mod commands;
pub mod errors;
pub mod events;
pub mod ids;
pub mod instrument;
pub mod numeric;
pub mod order;
pub mod position;

//! Price-time-priority limit order book
//!
//! One `OrderBook` per instrument, built from two price-sorted `Ladder`s of
//! `Level`s. Three granularities share one structure:
//!
//! - **L3**: levels hold many orders; priority is insertion order
//! - **L2**: one order per level (order ids are rewritten to the level price)
//! - **L1**: one level per side (order ids are rewritten to the side name)
//!
//! Books ingest snapshots, delta batches and single deltas, and expose
//! top-of-book, depth, midpoint and spread. `check_integrity` asserts the
//! structural invariants after mutation; a failure there is a bug, not a
//! runtime condition.

pub mod book;
pub mod ladder;
pub mod level;

pub use book::{BookError, OrderBook};
pub use ladder::Ladder;
pub use level::Level;

//! Bounded-queue message engines
//!
//! Two instances of one machine run in the live system: the execution
//! engine (events in, cache and downstream out) and the risk engine
//! (commands in, approved commands out). Each owns a bounded FIFO queue and
//! a single consumer task on the cooperative runtime.
//!
//! The concurrency contract:
//! - strict FIFO within one engine; no ordering between engines
//! - producers never drop: a full queue logs a warning and blocks
//!   cooperatively until space appears
//! - shutdown is sentinel-driven (`stop`) or abrupt (`kill`); a killed
//!   consumer leaves residual messages behind, which are counted and logged

pub mod engine;
pub mod execution;
pub mod risk;

pub use engine::{EngineConfig, EngineMessage, MessageEngine, MessageHandler};
pub use execution::{ExecutionEngine, ExecutionHandler};
pub use risk::{RiskConfig, RiskEngine, RiskHandler};

//! Venue identifier generation
//!
//! Venue order, position and execution ids are monotonic per instrument:
//! `{venue}-{symbol_index}-{count}`. Counters only restart through `reset`,
//! so ids are never reused within a session.

use std::collections::HashMap;

use types::ids::{ExecutionId, InstrumentId, PositionId, Venue, VenueOrderId};

/// Per-symbol monotonic id counters for one venue
#[derive(Debug, Clone)]
pub struct IdGenerator {
    venue: Venue,
    symbol_indices: HashMap<InstrumentId, usize>,
    order_counts: HashMap<InstrumentId, u64>,
    position_counts: HashMap<InstrumentId, u64>,
    execution_counts: HashMap<InstrumentId, u64>,
}

impl IdGenerator {
    pub fn new(venue: Venue) -> Self {
        Self {
            venue,
            symbol_indices: HashMap::new(),
            order_counts: HashMap::new(),
            position_counts: HashMap::new(),
            execution_counts: HashMap::new(),
        }
    }

    fn symbol_index(&mut self, instrument_id: &InstrumentId) -> usize {
        let next = self.symbol_indices.len() + 1;
        *self
            .symbol_indices
            .entry(instrument_id.clone())
            .or_insert(next)
    }

    pub fn generate_venue_order_id(&mut self, instrument_id: &InstrumentId) -> VenueOrderId {
        let index = self.symbol_index(instrument_id);
        let count = self
            .order_counts
            .entry(instrument_id.clone())
            .and_modify(|c| *c += 1)
            .or_insert(1);
        VenueOrderId::new(format!("{}-{}-{:03}", self.venue, index, count))
    }

    pub fn generate_position_id(&mut self, instrument_id: &InstrumentId) -> PositionId {
        let index = self.symbol_index(instrument_id);
        let count = self
            .position_counts
            .entry(instrument_id.clone())
            .and_modify(|c| *c += 1)
            .or_insert(1);
        PositionId::new(format!("{}-{}-P{:03}", self.venue, index, count))
    }

    pub fn generate_execution_id(&mut self, instrument_id: &InstrumentId) -> ExecutionId {
        let index = self.symbol_index(instrument_id);
        let count = self
            .execution_counts
            .entry(instrument_id.clone())
            .and_modify(|c| *c += 1)
            .or_insert(1);
        ExecutionId::new(format!("{}-{}-E{:03}", self.venue, index, count))
    }

    /// Restart every counter; the only path to id reuse
    pub fn reset(&mut self) {
        self.symbol_indices.clear();
        self.order_counts.clear();
        self.position_counts.clear();
        self.execution_counts.clear();
    }
}

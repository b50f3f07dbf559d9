//! Pluggable event serialization
//!
//! The store holds opaque bytes; the serializer is the only component that
//! knows the encoding. JSON is the default, chosen for debuggability of the
//! persisted logs — swap in a binary codec behind the same trait if volume
//! demands it.

use types::events::ExecutionEvent;

use crate::cache::CacheError;

/// Encode and decode execution events for persistence
pub trait EventSerializer: Send + Sync {
    fn serialize(&self, event: &ExecutionEvent) -> Result<Vec<u8>, CacheError>;
    fn deserialize(&self, bytes: &[u8]) -> Result<ExecutionEvent, CacheError>;
}

/// serde_json-backed serializer
#[derive(Debug, Default, Clone)]
pub struct JsonEventSerializer;

impl EventSerializer for JsonEventSerializer {
    fn serialize(&self, event: &ExecutionEvent) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec(event).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<ExecutionEvent, CacheError> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::events::OrderEvent;
    use types::ids::{ClientOrderId, VenueOrderId};

    #[test]
    fn test_round_trip() {
        let serializer = JsonEventSerializer;
        let event = ExecutionEvent::Order(OrderEvent::Accepted {
            client_order_id: ClientOrderId::new("O-1"),
            venue_order_id: VenueOrderId::new("SIM-1-001"),
            ts_event_ns: 42,
        });

        let bytes = serializer.serialize(&event).unwrap();
        let decoded = serializer.deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn test_garbage_is_error() {
        let serializer = JsonEventSerializer;
        assert!(matches!(
            serializer.deserialize(b"not json"),
            Err(CacheError::Serialization(_))
        ));
    }
}

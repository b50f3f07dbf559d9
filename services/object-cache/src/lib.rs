//! Event-sourced object cache
//!
//! Reconstructs accounts, orders and positions by replaying serialized
//! events out of an external key/value store. The store speaks append-only
//! lists (entity event logs) and hashes (opaque strategy state); the
//! serializer is pluggable, JSON by default.
//!
//! Reconstruction is a left-fold: the first event seeds the aggregate
//! (Account ← AccountState, Order ← OrderInitialized, Position ←
//! OrderFilled) and the rest are applied in order.

pub mod cache;
pub mod keys;
pub mod serializer;
pub mod store;

pub use cache::{CacheError, ObjectCache};
pub use serializer::{EventSerializer, JsonEventSerializer};
pub use store::{InMemoryStore, KeyValueStore, StoreError};

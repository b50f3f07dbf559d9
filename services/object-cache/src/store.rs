//! Key/value store interface
//!
//! The narrow contract the cache needs from its backing server: list append
//! and range, hash set and get-all, prefix scan, delete, flush. A networked
//! client (Redis or similar) implements this trait in an adapter crate; the
//! in-memory implementation here backs tests and single-process backtests.
//!
//! `list_push` returns the list length after the push, mirroring the wire
//! reply of a Redis RPUSH; the cache uses it for existence diagnostics.

use std::collections::BTreeMap;
use std::sync::Mutex;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Key {key} holds the wrong data kind")]
    WrongKind { key: String },
}

/// The store operations the cache relies on
///
/// Each key is expected to behave as a linearizable log: pushes from one
/// client are observed in order.
pub trait KeyValueStore: Send + Sync {
    /// Append to the list at `key`; returns the list length after the push.
    fn list_push(&self, key: &str, value: Vec<u8>) -> Result<usize, StoreError>;

    /// The full list at `key`, oldest first. Missing key = empty list.
    fn list_range(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Set one field of the hash at `key`.
    fn hash_set(&self, key: &str, field: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// All fields of the hash at `key`. Missing key = empty map.
    fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, Vec<u8>>, StoreError>;

    /// All keys starting with `prefix`.
    fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Remove a key of any kind.
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Remove everything.
    fn flush_db(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    lists: BTreeMap<String, Vec<Vec<u8>>>,
    hashes: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
}

/// Process-local store for tests and backtests
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn list_push(&self, key: &str, value: Vec<u8>) -> Result<usize, StoreError> {
        let mut tables = self.tables.lock().expect("store mutex");
        if tables.hashes.contains_key(key) {
            return Err(StoreError::WrongKind { key: key.to_string() });
        }
        let list = tables.lists.entry(key.to_string()).or_default();
        list.push(value);
        Ok(list.len())
    }

    fn list_range(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let tables = self.tables.lock().expect("store mutex");
        Ok(tables.lists.get(key).cloned().unwrap_or_default())
    }

    fn hash_set(&self, key: &str, field: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store mutex");
        if tables.lists.contains_key(key) {
            return Err(StoreError::WrongKind { key: key.to_string() });
        }
        tables
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, Vec<u8>>, StoreError> {
        let tables = self.tables.lock().expect("store mutex");
        Ok(tables.hashes.get(key).cloned().unwrap_or_default())
    }

    fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let tables = self.tables.lock().expect("store mutex");
        let keys = tables
            .lists
            .keys()
            .chain(tables.hashes.keys())
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        Ok(keys)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store mutex");
        tables.lists.remove(key);
        tables.hashes.remove(key);
        Ok(())
    }

    fn flush_db(&self) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store mutex");
        tables.lists.clear();
        tables.hashes.clear();
        Ok(())
    }
}

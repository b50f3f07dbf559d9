//! The cache proper: seed-event dispatch and left-fold reconstruction
//!
//! Writes push single events onto per-entity logs; reads replay the log.
//! The push reply (post-push list length) drives existence diagnostics: an
//! `add_*` that lands on an existing log, or an `update_*` that creates one,
//! is logged as an integrity warning but not failed — the log itself stays
//! append-only and consistent.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use types::account::Account;
use types::events::{AccountState, ExecutionEvent, OrderEvent, OrderFilled};
use types::ids::{AccountId, ClientOrderId, PositionId, StrategyId, TraderId};
use types::order::Order;
use types::position::Position;

use crate::keys;
use crate::serializer::EventSerializer;
use crate::store::{KeyValueStore, StoreError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt event log at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Event-sourced view over the external store, namespaced by trader
#[derive(Clone)]
pub struct ObjectCache {
    trader_id: TraderId,
    store: Arc<dyn KeyValueStore>,
    serializer: Arc<dyn EventSerializer>,
}

impl ObjectCache {
    pub fn new(
        trader_id: TraderId,
        store: Arc<dyn KeyValueStore>,
        serializer: Arc<dyn EventSerializer>,
    ) -> Self {
        Self {
            trader_id,
            store,
            serializer,
        }
    }

    pub fn trader_id(&self) -> &TraderId {
        &self.trader_id
    }

    // ── Writes ──────────────────────────────────────────────────────────

    /// Persist a new order's seed event
    pub fn add_order(&self, event: &OrderEvent) -> Result<(), CacheError> {
        let key = keys::order_key(&self.trader_id, event.client_order_id());
        let reply = self.push(&key, &ExecutionEvent::Order(event.clone()))?;
        if reply > 1 {
            warn!(%key, reply, "add_order: key already existed");
        }
        Ok(())
    }

    /// Append an order's latest event
    pub fn update_order(&self, event: &OrderEvent) -> Result<(), CacheError> {
        let key = keys::order_key(&self.trader_id, event.client_order_id());
        let reply = self.push(&key, &ExecutionEvent::Order(event.clone()))?;
        if reply == 1 {
            warn!(%key, "update_order: key did not exist");
        }
        Ok(())
    }

    /// Persist a new position's opening fill
    pub fn add_position(&self, fill: &OrderFilled) -> Result<(), CacheError> {
        let key = keys::position_key(&self.trader_id, &fill.position_id);
        let reply = self.push(&key, &ExecutionEvent::Order(OrderEvent::Filled(fill.clone())))?;
        if reply > 1 {
            warn!(%key, reply, "add_position: key already existed");
        }
        Ok(())
    }

    /// Append a fill to an existing position's log
    pub fn update_position(&self, fill: &OrderFilled) -> Result<(), CacheError> {
        let key = keys::position_key(&self.trader_id, &fill.position_id);
        let reply = self.push(&key, &ExecutionEvent::Order(OrderEvent::Filled(fill.clone())))?;
        if reply == 1 {
            warn!(%key, "update_position: key did not exist");
        }
        Ok(())
    }

    /// Persist a new account's first state
    pub fn add_account(&self, state: &AccountState) -> Result<(), CacheError> {
        let key = keys::account_key(&self.trader_id, &state.account_id);
        let reply = self.push(&key, &ExecutionEvent::Account(state.clone()))?;
        if reply > 1 {
            warn!(%key, reply, "add_account: key already existed");
        }
        Ok(())
    }

    /// Append an account's latest state
    pub fn update_account(&self, state: &AccountState) -> Result<(), CacheError> {
        let key = keys::account_key(&self.trader_id, &state.account_id);
        let reply = self.push(&key, &ExecutionEvent::Account(state.clone()))?;
        if reply == 1 {
            warn!(%key, "update_account: key did not exist");
        }
        Ok(())
    }

    fn push(&self, key: &str, event: &ExecutionEvent) -> Result<usize, CacheError> {
        let bytes = self.serializer.serialize(event)?;
        Ok(self.store.list_push(key, bytes)?)
    }

    // ── Reads ───────────────────────────────────────────────────────────

    /// Rebuild an order from its event log; `Ok(None)` when unknown
    pub fn load_order(
        &self,
        client_order_id: &ClientOrderId,
    ) -> Result<Option<Order>, CacheError> {
        let key = keys::order_key(&self.trader_id, client_order_id);
        let events = self.load_events(&key)?;
        let Some((first, rest)) = events.split_first() else {
            return Ok(None);
        };

        let ExecutionEvent::Order(OrderEvent::Initialized(init)) = first else {
            return Err(CacheError::Corrupt {
                key,
                reason: "first event is not OrderInitialized".to_string(),
            });
        };
        let mut order = Order::new(init.clone());
        for event in rest {
            let ExecutionEvent::Order(event) = event else {
                return Err(CacheError::Corrupt {
                    key,
                    reason: "non-order event in order log".to_string(),
                });
            };
            order.apply(event).map_err(|e| CacheError::Corrupt {
                key: key.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(Some(order))
    }

    /// Rebuild a position from its fill log; `Ok(None)` when unknown
    pub fn load_position(
        &self,
        position_id: &PositionId,
    ) -> Result<Option<Position>, CacheError> {
        let key = keys::position_key(&self.trader_id, position_id);
        let events = self.load_events(&key)?;
        let Some((first, rest)) = events.split_first() else {
            return Ok(None);
        };

        let ExecutionEvent::Order(OrderEvent::Filled(fill)) = first else {
            return Err(CacheError::Corrupt {
                key,
                reason: "first event is not OrderFilled".to_string(),
            });
        };
        let mut position = Position::new(fill.clone());
        for event in rest {
            let ExecutionEvent::Order(OrderEvent::Filled(fill)) = event else {
                return Err(CacheError::Corrupt {
                    key,
                    reason: "non-fill event in position log".to_string(),
                });
            };
            position.apply(fill).map_err(|e| CacheError::Corrupt {
                key: key.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(Some(position))
    }

    /// Rebuild an account from its state log; `Ok(None)` when unknown
    pub fn load_account(&self, account_id: &AccountId) -> Result<Option<Account>, CacheError> {
        let key = keys::account_key(&self.trader_id, account_id);
        let events = self.load_events(&key)?;
        let Some((first, rest)) = events.split_first() else {
            return Ok(None);
        };

        let ExecutionEvent::Account(state) = first else {
            return Err(CacheError::Corrupt {
                key,
                reason: "first event is not AccountState".to_string(),
            });
        };
        let mut account = Account::new(state.clone());
        for event in rest {
            let ExecutionEvent::Account(state) = event else {
                return Err(CacheError::Corrupt {
                    key,
                    reason: "non-account event in account log".to_string(),
                });
            };
            account.apply(state.clone());
        }
        Ok(Some(account))
    }

    fn load_events(&self, key: &str) -> Result<Vec<ExecutionEvent>, CacheError> {
        self.store
            .list_range(key)?
            .iter()
            .map(|bytes| self.serializer.deserialize(bytes))
            .collect()
    }

    /// Client order ids with a persisted log
    pub fn order_ids(&self) -> Result<Vec<ClientOrderId>, CacheError> {
        let prefix = keys::orders_prefix(&self.trader_id);
        Ok(self
            .store
            .scan_keys(&prefix)?
            .iter()
            .map(|key| ClientOrderId::new(&key[prefix.len()..]))
            .collect())
    }

    /// Position ids with a persisted log
    pub fn position_ids(&self) -> Result<Vec<PositionId>, CacheError> {
        let prefix = keys::positions_prefix(&self.trader_id);
        Ok(self
            .store
            .scan_keys(&prefix)?
            .iter()
            .map(|key| PositionId::new(&key[prefix.len()..]))
            .collect())
    }

    // ── Strategy state ──────────────────────────────────────────────────

    /// Persist a strategy's opaque state map
    pub fn save_strategy_state(
        &self,
        strategy_id: &StrategyId,
        state: &BTreeMap<String, Vec<u8>>,
    ) -> Result<(), CacheError> {
        let key = keys::strategy_state_key(&self.trader_id, strategy_id);
        for (field, value) in state {
            self.store.hash_set(&key, field, value.clone())?;
        }
        Ok(())
    }

    /// Load a strategy's opaque state map (empty when unknown)
    pub fn load_strategy_state(
        &self,
        strategy_id: &StrategyId,
    ) -> Result<BTreeMap<String, Vec<u8>>, CacheError> {
        let key = keys::strategy_state_key(&self.trader_id, strategy_id);
        Ok(self.store.hash_get_all(&key)?)
    }

    /// Remove a strategy's persisted state
    pub fn delete_strategy(&self, strategy_id: &StrategyId) -> Result<(), CacheError> {
        let key = keys::strategy_state_key(&self.trader_id, strategy_id);
        Ok(self.store.delete(&key)?)
    }

    /// Wipe the whole database (dev/test tool)
    pub fn flush(&self) -> Result<(), CacheError> {
        Ok(self.store.flush_db()?)
    }
}

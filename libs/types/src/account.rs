//! Account and balance types
//!
//! `Balance` is the per-currency ledger row with the invariant
//! `total == free + locked`. `Account` is the event-sourced aggregate:
//! created from its first `AccountState` and mutated only by `apply`.

use crate::errors::AccountError;
use crate::events::AccountState;
use crate::ids::AccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Balance for a single currency
///
/// Invariant: total = free + locked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub currency: String,
    pub total: Decimal,
    pub free: Decimal,
    pub locked: Decimal,
}

impl Balance {
    /// Create a new, fully free balance
    pub fn new(currency: impl Into<String>, total: Decimal) -> Self {
        Self {
            currency: currency.into(),
            total,
            free: total,
            locked: Decimal::ZERO,
        }
    }

    /// Check the balance invariant: total = free + locked
    pub fn check_invariant(&self) -> bool {
        self.total == self.free + self.locked
    }

    /// Lock a portion of the free balance
    pub fn lock(&mut self, amount: Decimal) -> Result<(), AccountError> {
        if amount > self.free {
            return Err(AccountError::InsufficientBalance {
                currency: self.currency.clone(),
                required: amount.to_string(),
                free: self.free.to_string(),
            });
        }
        self.free -= amount;
        self.locked += amount;
        assert!(self.check_invariant(), "Invariant violated after lock");
        Ok(())
    }

    /// Release a portion of the locked balance back to free
    pub fn unlock(&mut self, amount: Decimal) -> Result<(), AccountError> {
        if amount > self.locked {
            return Err(AccountError::InsufficientLocked {
                currency: self.currency.clone(),
                required: amount.to_string(),
                locked: self.locked.to_string(),
            });
        }
        self.locked -= amount;
        self.free += amount;
        assert!(self.check_invariant(), "Invariant violated after unlock");
        Ok(())
    }

    /// Spend from the locked balance (order fill settlement)
    pub fn deduct_locked(&mut self, amount: Decimal) -> Result<(), AccountError> {
        if amount > self.locked {
            return Err(AccountError::InsufficientLocked {
                currency: self.currency.clone(),
                required: amount.to_string(),
                locked: self.locked.to_string(),
            });
        }
        self.locked -= amount;
        self.total -= amount;
        assert!(self.check_invariant(), "Invariant violated after deduct");
        Ok(())
    }

    /// Credit the free balance (settlement proceeds, deposits)
    pub fn credit(&mut self, amount: Decimal) {
        assert!(amount >= Decimal::ZERO, "Credit amount must be non-negative");
        self.free += amount;
        self.total += amount;
        assert!(self.check_invariant(), "Invariant violated after credit");
    }

    /// Debit the free balance
    pub fn debit(&mut self, amount: Decimal) -> Result<(), AccountError> {
        if amount > self.free {
            return Err(AccountError::InsufficientBalance {
                currency: self.currency.clone(),
                required: amount.to_string(),
                free: self.free.to_string(),
            });
        }
        self.free -= amount;
        self.total -= amount;
        assert!(self.check_invariant(), "Invariant violated after debit");
        Ok(())
    }
}

/// Event-sourced account aggregate
///
/// Balances reflect the latest applied `AccountState`; the full event list
/// is retained for audit and persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    balances: BTreeMap<String, Balance>,
    events: Vec<AccountState>,
}

impl Account {
    /// Construct from the seed event
    pub fn new(event: AccountState) -> Self {
        let mut account = Self {
            id: event.account_id.clone(),
            balances: BTreeMap::new(),
            events: Vec::new(),
        };
        account.apply(event);
        account
    }

    /// Fold a balance snapshot into the account
    pub fn apply(&mut self, event: AccountState) {
        for balance in &event.balances {
            debug_assert!(balance.check_invariant());
            self.balances
                .insert(balance.currency.clone(), balance.clone());
        }
        self.events.push(event);
    }

    pub fn balance(&self, currency: &str) -> Option<&Balance> {
        self.balances.get(currency)
    }

    /// All balances, ordered by currency code
    pub fn balances(&self) -> Vec<Balance> {
        self.balances.values().cloned().collect()
    }

    pub fn last_event(&self) -> Option<&AccountState> {
        self.events.last()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

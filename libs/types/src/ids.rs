//! Identifier types for trading entities
//!
//! Client-assigned identifiers (`TraderId`, `StrategyId`, `ClientOrderId`)
//! are opaque strings chosen by the caller. Venue-assigned identifiers
//! (`VenueOrderId`, `PositionId`, `ExecutionId`) are produced by the
//! exchange's per-symbol monotonic counters and are only unique within one
//! exchange session (counters restart on `reset()`).

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                let s = value.into();
                assert!(!s.is_empty(), concat!(stringify!($name), " cannot be empty"));
                Self(s)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

string_id!(
    /// Identifier for a trader (namespace for persistence keys).
    TraderId
);
string_id!(
    /// Identifier for a strategy instance.
    StrategyId
);
string_id!(
    /// Identifier for an account at a venue.
    AccountId
);
string_id!(
    /// Client-assigned order identifier, unique per trader.
    ClientOrderId
);
string_id!(
    /// Venue-assigned order identifier.
    VenueOrderId
);
string_id!(
    /// Venue-assigned position identifier.
    PositionId
);
string_id!(
    /// Venue-assigned execution (fill) identifier.
    ExecutionId
);
string_id!(
    /// Venue name, e.g. "SIM".
    Venue
);

/// Instrument identifier (trading pair)
///
/// Format: "BASE/QUOTE" (e.g., "BTC/USDT", "AUD/USD")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    /// Create a new InstrumentId from a string
    ///
    /// # Panics
    /// Panics if the format is invalid (must contain '/')
    pub fn new(symbol: impl Into<String>) -> Self {
        let s = symbol.into();
        assert!(s.contains('/'), "InstrumentId must be in BASE/QUOTE format");
        Self(s)
    }

    /// Try to create an InstrumentId, returning None if invalid
    pub fn try_new(symbol: impl Into<String>) -> Option<Self> {
        let s = symbol.into();
        if s.contains('/') {
            Some(Self(s))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into base and quote currency codes
    pub fn split(&self) -> (&str, &str) {
        let mut parts = self.0.splitn(2, '/');
        (parts.next().unwrap_or(""), parts.next().unwrap_or(""))
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

//! Instrument metadata
//!
//! Precision, tick size and fee schedule for a tradable instrument. The
//! exchange quantizes and validates every order against this record.

use crate::errors::InstrumentError;
use crate::ids::InstrumentId;
use crate::numeric::Price;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Maximum decimal places representable by the fixed-point backend.
pub const MAX_PRECISION: u8 = 28;

/// Tradable instrument definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub price_precision: u8,
    pub size_precision: u8,
    /// Minimum price movement (one tick).
    pub price_increment: Price,
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
}

impl Instrument {
    pub fn new(
        id: InstrumentId,
        price_precision: u8,
        size_precision: u8,
        price_increment: Price,
        maker_fee: Decimal,
        taker_fee: Decimal,
    ) -> Result<Self, InstrumentError> {
        if price_precision > MAX_PRECISION {
            return Err(InstrumentError::PrecisionOutOfRange {
                precision: price_precision,
            });
        }
        if size_precision > MAX_PRECISION {
            return Err(InstrumentError::PrecisionOutOfRange {
                precision: size_precision,
            });
        }
        Ok(Self {
            id,
            price_precision,
            size_precision,
            price_increment,
            maker_fee,
            taker_fee,
        })
    }

    /// Base currency code (left of the '/')
    pub fn base_currency(&self) -> &str {
        self.id.split().0
    }

    /// Quote currency code (right of the '/')
    pub fn quote_currency(&self) -> &str {
        self.id.split().1
    }
}

//! Exchange rate calculation
//!
//! A static rate table used to express commissions and balances in a common
//! currency. Lookups try the direct pair, then the inverse; same-currency
//! conversion is the identity.

use std::collections::HashMap;

use rust_decimal::Decimal;
use types::numeric::Money;

/// Static `(from, to) → rate` table
#[derive(Debug, Clone, Default)]
pub struct ExchangeRateCalculator {
    rates: HashMap<(String, String), Decimal>,
}

impl ExchangeRateCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the rate for one unit of `from` expressed in `to`
    pub fn set_rate(&mut self, from: impl Into<String>, to: impl Into<String>, rate: Decimal) {
        assert!(rate > Decimal::ZERO, "Exchange rate must be positive");
        self.rates.insert((from.into(), to.into()), rate);
    }

    /// The rate for `from → to`, if derivable
    pub fn get_rate(&self, from: &str, to: &str) -> Option<Decimal> {
        if from == to {
            return Some(Decimal::ONE);
        }
        if let Some(&rate) = self.rates.get(&(from.to_string(), to.to_string())) {
            return Some(rate);
        }
        self.rates
            .get(&(to.to_string(), from.to_string()))
            .map(|&inverse| Decimal::ONE / inverse)
    }

    /// Convert an amount into another currency
    pub fn convert(&self, money: &Money, to: &str) -> Option<Money> {
        let rate = self.get_rate(&money.currency, to)?;
        Some(Money::new(to, money.amount * rate))
    }
}

//! Pluggable simulation modules
//!
//! Modules run once per inbound market-data event, after the book update and
//! before matching. They can adjust the account ledger (funding payments,
//! interest accrual) and inject events into the exchange's output stream.

use std::collections::BTreeMap;

use types::account::Balance;
use types::events::ExecutionEvent;

/// A venue-side simulation hook
pub trait SimulationModule: Send {
    fn name(&self) -> &str;

    /// Called with the new exchange time before the matching cycle.
    ///
    /// May mutate balances directly; returned events are appended to the
    /// exchange's output for this cycle.
    fn process(
        &mut self,
        balances: &mut BTreeMap<String, Balance>,
        ts_ns: i64,
    ) -> Vec<ExecutionEvent>;

    /// Clear any accumulated state (exchange `reset`).
    fn reset(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    /// Debits a flat fee from one currency every `interval_ns`.
    struct FlatFunding {
        currency: String,
        amount: Decimal,
        interval_ns: i64,
        last_applied_ns: i64,
    }

    impl SimulationModule for FlatFunding {
        fn name(&self) -> &str {
            "flat-funding"
        }

        fn process(
            &mut self,
            balances: &mut BTreeMap<String, Balance>,
            ts_ns: i64,
        ) -> Vec<ExecutionEvent> {
            if ts_ns - self.last_applied_ns < self.interval_ns {
                return Vec::new();
            }
            self.last_applied_ns = ts_ns;
            if let Some(balance) = balances.get_mut(&self.currency) {
                let _ = balance.debit(self.amount);
            }
            Vec::new()
        }

        fn reset(&mut self) {
            self.last_applied_ns = 0;
        }
    }

    #[test]
    fn test_module_adjusts_balances_on_interval() {
        let mut module = FlatFunding {
            currency: "USDT".to_string(),
            amount: Decimal::from(10),
            interval_ns: 100,
            last_applied_ns: 0,
        };
        let mut balances = BTreeMap::new();
        balances.insert(
            "USDT".to_string(),
            Balance::new("USDT", Decimal::from(1_000)),
        );

        module.process(&mut balances, 50); // below interval
        assert_eq!(balances["USDT"].total, Decimal::from(1_000));

        module.process(&mut balances, 150);
        assert_eq!(balances["USDT"].total, Decimal::from(990));
    }
}

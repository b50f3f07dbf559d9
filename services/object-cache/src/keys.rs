//! Persistence key schema
//!
//! All keys are namespaced by trader id:
//!
//! ```text
//! {trader_id}:Accounts:{account_id}
//! {trader_id}:Orders:{client_order_id}
//! {trader_id}:Positions:{position_id}
//! {trader_id}:Strategies:{strategy_id}:State
//! ```

use types::ids::{AccountId, ClientOrderId, PositionId, StrategyId, TraderId};

pub fn account_key(trader_id: &TraderId, account_id: &AccountId) -> String {
    format!("{trader_id}:Accounts:{account_id}")
}

pub fn order_key(trader_id: &TraderId, client_order_id: &ClientOrderId) -> String {
    format!("{trader_id}:Orders:{client_order_id}")
}

pub fn position_key(trader_id: &TraderId, position_id: &PositionId) -> String {
    format!("{trader_id}:Positions:{position_id}")
}

pub fn strategy_state_key(trader_id: &TraderId, strategy_id: &StrategyId) -> String {
    format!("{trader_id}:Strategies:{strategy_id}:State")
}

pub fn orders_prefix(trader_id: &TraderId) -> String {
    format!("{trader_id}:Orders:")
}

pub fn positions_prefix(trader_id: &TraderId) -> String {
    format!("{trader_id}:Positions:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_schema() {
        let trader = TraderId::new("TESTER-000");
        assert_eq!(
            account_key(&trader, &AccountId::new("SIM-001")),
            "TESTER-000:Accounts:SIM-001"
        );
        assert_eq!(
            order_key(&trader, &ClientOrderId::new("O-1")),
            "TESTER-000:Orders:O-1"
        );
        assert_eq!(
            position_key(&trader, &PositionId::new("SIM-1-P001")),
            "TESTER-000:Positions:SIM-1-P001"
        );
        assert_eq!(
            strategy_state_key(&trader, &StrategyId::new("EMA-1")),
            "TESTER-000:Strategies:EMA-1:State"
        );
        assert!(order_key(&trader, &ClientOrderId::new("O-1"))
            .starts_with(&orders_prefix(&trader)));
    }
}

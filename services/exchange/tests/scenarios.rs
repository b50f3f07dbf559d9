//! End-to-end venue scenarios
//!
//! Drives the simulated exchange the way a backtest does: seed a book, send
//! commands, feed market data, and assert on the emitted event stream, the
//! account ledger and the position index.

use rust_decimal::Decimal;

use exchange::{ExchangeConfig, FillModel, FillModelConfig, SimulatedExchange};
use types::book::{BookLevel, OrderBookData, OrderBookSnapshot, TradeTick};
use types::commands::{CancelOrder, SubmitBracketOrder, SubmitOrder, TradingCommand};
use types::events::{ExecutionEvent, OrderEvent};
use types::ids::{ClientOrderId, InstrumentId};
use types::numeric::{Money, Price, Quantity};
use types::order::{Order, OrderSide, OrderState, TimeInForce};
use uuid::Uuid;

fn btc_usdt() -> types::instrument::Instrument {
    types::instrument::Instrument::new(
        InstrumentId::new("BTC/USDT"),
        2,
        1,
        Price::from_str("0.01").unwrap(),
        Decimal::from_str_exact("0.0002").unwrap(),
        Decimal::from_str_exact("0.0005").unwrap(),
    )
    .unwrap()
}

fn instrument_id() -> InstrumentId {
    InstrumentId::new("BTC/USDT")
}

fn funded_exchange() -> SimulatedExchange {
    let config = ExchangeConfig {
        starting_balances: vec![
            Money::new("USDT", Decimal::from(1_000_000)),
            Money::new("BTC", Decimal::from(100)),
        ],
        ..ExchangeConfig::default()
    };
    let mut exchange = SimulatedExchange::new(config, FillModel::default());
    exchange.add_instrument(btc_usdt());
    exchange
}

fn snapshot(bids: Vec<(u64, u64)>, asks: Vec<(u64, u64)>, ts: i64) -> OrderBookData {
    OrderBookData::Snapshot(OrderBookSnapshot {
        instrument_id: instrument_id(),
        level: BookLevel::L2,
        bids: bids
            .into_iter()
            .map(|(p, q)| (Decimal::from(p), Decimal::from(q)))
            .collect(),
        asks: asks
            .into_iter()
            .map(|(p, q)| (Decimal::from(p), Decimal::from(q)))
            .collect(),
        ts_event_ns: ts,
    })
}

fn trade(px: &str, size: &str, aggressor: OrderSide, ts: i64) -> TradeTick {
    TradeTick {
        instrument_id: instrument_id(),
        price: Price::from_str(px).unwrap(),
        size: Quantity::from_str(size).unwrap(),
        aggressor_side: aggressor,
        match_id: format!("T-{ts}"),
        ts_event_ns: ts,
    }
}

fn fills(events: &[ExecutionEvent]) -> Vec<(Decimal, Decimal)> {
    events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::Order(OrderEvent::Filled(f)) => {
                Some((f.last_px.as_decimal(), f.last_qty.as_decimal()))
            }
            _ => None,
        })
        .collect()
}

fn state_of(exchange: &SimulatedExchange, id: &str) -> OrderState {
    exchange
        .order(&ClientOrderId::new(id))
        .expect("order known to venue")
        .state
}

/// Aggressive market sweep: asks [(100,2),(101,3)], BUY MARKET 4 fills
/// [(100,2),(101,2)], the ask at 101 keeps 1, commissions are debited.
#[test]
fn aggressive_market_sweep_consumes_depth() {
    let mut exchange = funded_exchange();
    exchange
        .process_order_book(&snapshot(vec![(99, 5)], vec![(100, 2), (101, 3)], 1))
        .unwrap();

    let order = Order::market(
        ClientOrderId::new("O-1"),
        instrument_id(),
        OrderSide::BUY,
        Quantity::from_str("4.0").unwrap(),
        1,
    );
    let events = exchange.execute(TradingCommand::Submit(SubmitOrder::new(order, 1)));

    assert_eq!(
        fills(&events),
        vec![
            (Decimal::from(100), Decimal::from(2)),
            (Decimal::from(101), Decimal::from(2)),
        ]
    );
    assert_eq!(state_of(&exchange, "O-1"), OrderState::Filled);

    let book = exchange.book(&instrument_id()).unwrap();
    assert_eq!(book.best_ask_price(), Some(Price::from_u64(101)));
    assert_eq!(book.best_ask_qty(), Some(Quantity::from_u64(1)));

    // taker 0.0005 on 200 + 202 notional
    assert_eq!(
        exchange.commissions().get("USDT"),
        Some(&Decimal::from_str_exact("0.201").unwrap())
    );
    let usdt = exchange.balance("USDT").unwrap();
    assert_eq!(
        usdt.total,
        Decimal::from(1_000_000) - Decimal::from(402) - Decimal::from_str_exact("0.201").unwrap()
    );
    assert_eq!(
        exchange.balance("BTC").unwrap().total,
        Decimal::from(104)
    );
    assert!(usdt.check_invariant());
}

/// A resting limit fills passively when a trade prints through its price.
#[test]
fn resting_limit_fills_on_trade_through() {
    let mut exchange = funded_exchange();
    exchange
        .process_order_book(&snapshot(vec![(94, 5)], vec![(100, 5)], 1))
        .unwrap();

    let order = Order::limit(
        ClientOrderId::new("O-1"),
        instrument_id(),
        OrderSide::SELL,
        Quantity::from_str("1.0").unwrap(),
        Price::from_u64(95),
        TimeInForce::GTC,
        1,
    );
    exchange.execute(TradingCommand::Submit(SubmitOrder::new(order, 1)));
    assert_eq!(state_of(&exchange, "O-1"), OrderState::Accepted);

    let events = exchange
        .process_trade_tick(&trade("95.50", "2.0", OrderSide::BUY, 2))
        .unwrap();

    // Fills at its own price, as maker.
    assert_eq!(fills(&events), vec![(Decimal::from(95), Decimal::from(1))]);
    assert_eq!(state_of(&exchange, "O-1"), OrderState::Filled);
    // maker 0.0002 on 95 notional
    assert_eq!(
        exchange.commissions().get("USDT"),
        Some(&Decimal::from_str_exact("0.019").unwrap())
    );
}

/// Stop-market triggers when the top breaches the trigger, then sweeps.
#[test]
fn stop_market_triggers_and_fills() {
    let mut exchange = funded_exchange();
    exchange
        .process_order_book(&snapshot(vec![(99, 5)], vec![(100, 5)], 1))
        .unwrap();

    let order = Order::stop_market(
        ClientOrderId::new("O-1"),
        instrument_id(),
        OrderSide::BUY,
        Quantity::from_str("2.0").unwrap(),
        Price::from_u64(102),
        1,
    );
    exchange.execute(TradingCommand::Submit(SubmitOrder::new(order, 1)));
    assert_eq!(state_of(&exchange, "O-1"), OrderState::Accepted);

    // Ask rises through the trigger.
    let events = exchange
        .process_order_book(&snapshot(vec![(101, 5)], vec![(103, 5)], 2))
        .unwrap();

    assert_eq!(fills(&events), vec![(Decimal::from(103), Decimal::from(2))]);
    assert_eq!(state_of(&exchange, "O-1"), OrderState::Filled);
}

/// Stop-limit: trigger emits Triggered, then the order works as a limit.
#[test]
fn stop_limit_two_phase() {
    let mut exchange = funded_exchange();
    exchange
        .process_order_book(&snapshot(vec![(99, 5)], vec![(100, 5)], 1))
        .unwrap();

    let order = Order::stop_limit(
        ClientOrderId::new("O-1"),
        instrument_id(),
        OrderSide::BUY,
        Quantity::from_str("1.0").unwrap(),
        Price::from_u64(102), // trigger
        Price::from_u64(101), // limit below the market once triggered
        1,
    );
    exchange.execute(TradingCommand::Submit(SubmitOrder::new(order, 1)));

    // Trigger breached; limit 101 < ask 103, so it now rests as a limit.
    let events = exchange
        .process_order_book(&snapshot(vec![(100, 5)], vec![(103, 5)], 2))
        .unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::Order(OrderEvent::Triggered { .. }))));
    assert_eq!(state_of(&exchange, "O-1"), OrderState::Triggered);

    // Ask falls to the limit price; triggered stop-limit fills as a limit.
    let events = exchange
        .process_order_book(&snapshot(vec![(100, 5)], vec![(101, 5)], 3))
        .unwrap();
    assert_eq!(fills(&events), vec![(Decimal::from(101), Decimal::from(1))]);
    assert_eq!(state_of(&exchange, "O-1"), OrderState::Filled);
}

/// OCO pair: the filled sibling cancels the other; both never fill.
#[test]
fn oco_fill_cancels_sibling() {
    let mut exchange = funded_exchange();
    exchange
        .process_order_book(&snapshot(vec![(94, 5)], vec![(100, 5)], 1))
        .unwrap();

    let stop = Order::stop_market(
        ClientOrderId::new("O-STOP"),
        instrument_id(),
        OrderSide::BUY,
        Quantity::from_str("1.0").unwrap(),
        Price::from_u64(105),
        1,
    );
    let limit = Order::limit(
        ClientOrderId::new("O-LIMIT"),
        instrument_id(),
        OrderSide::SELL,
        Quantity::from_str("1.0").unwrap(),
        Price::from_u64(95),
        TimeInForce::GTC,
        1,
    );
    exchange.execute(TradingCommand::Submit(SubmitOrder::with_link(
        stop, "OCO-1", 1,
    )));
    exchange.execute(TradingCommand::Submit(SubmitOrder::with_link(
        limit, "OCO-1", 1,
    )));
    assert_eq!(exchange.working_count(&instrument_id()), 2);

    let events = exchange
        .process_trade_tick(&trade("95.50", "2.0", OrderSide::BUY, 2))
        .unwrap();

    assert_eq!(fills(&events), vec![(Decimal::from(95), Decimal::from(1))]);
    assert_eq!(state_of(&exchange, "O-LIMIT"), OrderState::Filled);
    assert_eq!(state_of(&exchange, "O-STOP"), OrderState::Canceled);
    assert_eq!(exchange.working_count(&instrument_id()), 0);
}

/// Bracket lifecycle: entry fill activates SL and TP; the TP fill cancels
/// the SL and the position closes.
#[test]
fn bracket_lifecycle() {
    let mut exchange = funded_exchange();
    exchange
        .process_order_book(&snapshot(vec![(99, 5)], vec![(100, 5)], 1))
        .unwrap();

    let entry = Order::limit(
        ClientOrderId::new("O-ENTRY"),
        instrument_id(),
        OrderSide::BUY,
        Quantity::from_str("1.0").unwrap(),
        Price::from_u64(100),
        TimeInForce::GTC,
        1,
    );
    let stop_loss = Order::stop_market(
        ClientOrderId::new("O-SL"),
        instrument_id(),
        OrderSide::SELL,
        Quantity::from_str("1.0").unwrap(),
        Price::from_u64(95),
        1,
    );
    let take_profit = Order::limit(
        ClientOrderId::new("O-TP"),
        instrument_id(),
        OrderSide::SELL,
        Quantity::from_str("1.0").unwrap(),
        Price::from_u64(110),
        TimeInForce::GTC,
        1,
    );

    let events = exchange.execute(TradingCommand::SubmitBracket(SubmitBracketOrder::new(
        entry,
        stop_loss,
        take_profit,
        1,
    )));

    // Entry was marketable against the ask at 100.
    assert_eq!(fills(&events), vec![(Decimal::from(100), Decimal::from(1))]);
    assert_eq!(state_of(&exchange, "O-ENTRY"), OrderState::Filled);
    // Children are working.
    assert_eq!(exchange.working_count(&instrument_id()), 2);
    let position = exchange.position(&instrument_id()).unwrap();
    assert!(position.is_long());

    // Take-profit fills on a print through 110; stop-loss cancels by OCO.
    let events = exchange
        .process_trade_tick(&trade("110.50", "2.0", OrderSide::BUY, 2))
        .unwrap();
    assert_eq!(fills(&events), vec![(Decimal::from(110), Decimal::from(1))]);
    assert_eq!(state_of(&exchange, "O-TP"), OrderState::Filled);
    assert_eq!(state_of(&exchange, "O-SL"), OrderState::Canceled);

    // Position closed with +10 realized.
    assert!(exchange.position(&instrument_id()).is_none());
    let closed = exchange
        .positions()
        .into_iter()
        .find(|p| p.is_closed())
        .unwrap();
    assert_eq!(closed.realized_pnl, Decimal::from(10));

    // Ledger: -100.05 entry (taker), +109.978 exit (maker).
    assert_eq!(
        exchange.balance("USDT").unwrap().total,
        Decimal::from_str_exact("1000009.928").unwrap()
    );
    assert_eq!(exchange.balance("USDT").unwrap().locked, Decimal::ZERO);
    assert_eq!(exchange.balance("BTC").unwrap().total, Decimal::from(100));
}

/// Canceling a bracket entry before it fills cancels the held children.
#[test]
fn bracket_entry_cancel_cancels_children() {
    let mut exchange = funded_exchange();
    exchange
        .process_order_book(&snapshot(vec![(94, 5)], vec![(100, 5)], 1))
        .unwrap();

    let entry = Order::limit(
        ClientOrderId::new("O-ENTRY"),
        instrument_id(),
        OrderSide::BUY,
        Quantity::from_str("1.0").unwrap(),
        Price::from_u64(95), // below the ask: rests
        TimeInForce::GTC,
        1,
    );
    let stop_loss = Order::stop_market(
        ClientOrderId::new("O-SL"),
        instrument_id(),
        OrderSide::SELL,
        Quantity::from_str("1.0").unwrap(),
        Price::from_u64(90),
        1,
    );
    let take_profit = Order::limit(
        ClientOrderId::new("O-TP"),
        instrument_id(),
        OrderSide::SELL,
        Quantity::from_str("1.0").unwrap(),
        Price::from_u64(110),
        TimeInForce::GTC,
        1,
    );
    exchange.execute(TradingCommand::SubmitBracket(SubmitBracketOrder::new(
        entry,
        stop_loss,
        take_profit,
        1,
    )));
    assert_eq!(state_of(&exchange, "O-ENTRY"), OrderState::Accepted);

    exchange.execute(TradingCommand::Cancel(CancelOrder {
        instrument_id: instrument_id(),
        client_order_id: ClientOrderId::new("O-ENTRY"),
        command_id: Uuid::now_v7(),
        ts_init_ns: 2,
    }));

    assert_eq!(state_of(&exchange, "O-ENTRY"), OrderState::Canceled);
    assert_eq!(state_of(&exchange, "O-SL"), OrderState::Canceled);
    assert_eq!(state_of(&exchange, "O-TP"), OrderState::Canceled);
    assert_eq!(exchange.working_count(&instrument_id()), 0);
}

/// GTD orders expire once exchange time passes their deadline.
#[test]
fn gtd_order_expires() {
    let mut exchange = funded_exchange();
    exchange
        .process_order_book(&snapshot(vec![(94, 5)], vec![(100, 5)], 1))
        .unwrap();

    let order = Order::limit(
        ClientOrderId::new("O-1"),
        instrument_id(),
        OrderSide::BUY,
        Quantity::from_str("1.0").unwrap(),
        Price::from_u64(95),
        TimeInForce::GTD(100),
        1,
    );
    exchange.execute(TradingCommand::Submit(SubmitOrder::new(order, 1)));
    assert!(exchange.balance("USDT").unwrap().locked > Decimal::ZERO);

    let events = exchange
        .process_order_book(&snapshot(vec![(94, 5)], vec![(100, 5)], 150))
        .unwrap();

    assert!(events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::Order(OrderEvent::Expired { .. }))));
    assert_eq!(state_of(&exchange, "O-1"), OrderState::Expired);
    assert_eq!(exchange.balance("USDT").unwrap().locked, Decimal::ZERO);
}

/// IOC: the marketable part fills, the remainder cancels immediately.
#[test]
fn ioc_remainder_cancels() {
    let mut exchange = funded_exchange();
    exchange
        .process_order_book(&snapshot(vec![(94, 5)], vec![(100, 2)], 1))
        .unwrap();

    let order = Order::limit(
        ClientOrderId::new("O-1"),
        instrument_id(),
        OrderSide::BUY,
        Quantity::from_str("5.0").unwrap(),
        Price::from_u64(100),
        TimeInForce::IOC,
        1,
    );
    let events = exchange.execute(TradingCommand::Submit(SubmitOrder::new(order, 1)));

    assert_eq!(fills(&events), vec![(Decimal::from(100), Decimal::from(2))]);
    assert!(events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::Order(OrderEvent::Canceled { .. }))));
    assert_eq!(state_of(&exchange, "O-1"), OrderState::Canceled);
    assert_eq!(exchange.working_count(&instrument_id()), 0);
    assert_eq!(exchange.balance("USDT").unwrap().locked, Decimal::ZERO);
}

/// Fill conservation: Σ fill qty never exceeds order qty, with equality only
/// in the terminal FILLED state; locked balances never exceed totals.
#[test]
fn fill_conservation_and_lock_invariants() {
    let mut exchange = funded_exchange();
    exchange
        .process_order_book(&snapshot(vec![(94, 5)], vec![(100, 1), (101, 1)], 1))
        .unwrap();

    let order = Order::limit(
        ClientOrderId::new("O-1"),
        instrument_id(),
        OrderSide::BUY,
        Quantity::from_str("3.0").unwrap(),
        Price::from_u64(101),
        TimeInForce::GTC,
        1,
    );
    let mut all_events = exchange.execute(TradingCommand::Submit(SubmitOrder::new(order, 1)));
    all_events.extend(
        exchange
            .process_trade_tick(&trade("100.00", "0.5", OrderSide::SELL, 2))
            .unwrap(),
    );

    let order = exchange.order(&ClientOrderId::new("O-1")).unwrap();
    let filled: Decimal = fills(&all_events).iter().map(|(_, q)| *q).sum();
    assert_eq!(filled, order.filled_qty.as_decimal());
    assert!(order.filled_qty.as_decimal() <= order.quantity.as_decimal());
    assert!(order.state != OrderState::Filled);
    assert_eq!(
        order.filled_qty.as_decimal() + order.leaves_qty.as_decimal(),
        order.quantity.as_decimal()
    );

    for balance in exchange.balances() {
        assert!(balance.check_invariant());
        assert!(balance.locked <= balance.total);
    }
}

/// Same seed, same feed: identical fill sequences.
#[test]
fn deterministic_under_fixed_seed() {
    let run = || {
        let config = ExchangeConfig {
            starting_balances: vec![
                Money::new("USDT", Decimal::from(1_000_000)),
                Money::new("BTC", Decimal::from(100)),
            ],
            ..ExchangeConfig::default()
        };
        let fill_model = FillModel::new(FillModelConfig {
            prob_fill_at_limit: 0.5,
            prob_slippage: 0.5,
            random_seed: 777,
        })
        .unwrap();
        let mut exchange = SimulatedExchange::new(config, fill_model);
        exchange.add_instrument(btc_usdt());
        exchange
            .process_order_book(&snapshot(vec![(94, 5)], vec![(100, 5)], 1))
            .unwrap();

        let mut observed = Vec::new();
        for i in 0..10u64 {
            let order = Order::limit(
                ClientOrderId::new(format!("O-{i}")),
                instrument_id(),
                OrderSide::SELL,
                Quantity::from_str("0.5").unwrap(),
                Price::from_u64(95),
                TimeInForce::GTC,
                1,
            );
            exchange.execute(TradingCommand::Submit(SubmitOrder::new(order, 1)));
            let events = exchange
                .process_trade_tick(&trade("95.00", "1.0", OrderSide::BUY, 2 + i as i64))
                .unwrap();
            observed.push(fills(&events));
        }
        observed
    };

    assert_eq!(run(), run());
}

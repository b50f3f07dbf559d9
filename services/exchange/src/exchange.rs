//! Simulated exchange
//!
//! The matching engine behind backtests: owns one order book per instrument,
//! the working-order set, OCO and bracket link tables, the netting position
//! index and a cash-account ledger. Matching is logically single-threaded —
//! every public call runs to completion on the caller's thread and returns
//! the events it produced.
//!
//! The matching cycle runs once per inbound market-data event:
//! 1. ingest the data and advance exchange time
//! 2. run the simulation modules
//! 3. attempt to match every working order for that instrument
//! 4. settle fills (commissions, balances, positions, OCO/bracket links)
//! 5. expire anything past its time-in-force deadline

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use order_book::{BookError, OrderBook};
use types::account::Balance;
use types::book::{BookLevel, OrderBookData, QuoteTick, Tick, TradeTick};
use types::commands::{
    CancelOrder, SubmitBracketOrder, SubmitOrder, TradingCommand, UpdateOrder,
};
use types::events::{AccountState, ExecutionEvent, LiquiditySide, OrderEvent, OrderFilled};
use types::errors::AccountError;
use types::ids::{AccountId, ClientOrderId, InstrumentId, PositionId, Venue};
use types::instrument::Instrument;
use types::numeric::{Money, Price, Quantity};
use types::order::{Order, OrderSide, OrderState, OrderType, TimeInForce};
use types::position::Position;

use crate::fill_model::FillModel;
use crate::ids::IdGenerator;
use crate::modules::SimulationModule;
use crate::xrate::ExchangeRateCalculator;

/// Exchange-level errors (validation of the data path; commands never error,
/// they produce reject events)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("No instrument registered for {instrument_id}")]
    InstrumentNotFound { instrument_id: String },

    #[error("Quote ticks can only drive an L1 book")]
    QuoteTickRequiresL1,

    #[error(transparent)]
    Book(#[from] BookError),
}

/// Simulated exchange configuration
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub venue: Venue,
    pub account_id: AccountId,
    pub book_level: BookLevel,
    pub starting_balances: Vec<Money>,
    /// Reject a stop order whose trigger is already breached at submission.
    pub reject_stop_immediately_triggerable: bool,
    /// Suppress balance mutation, but keep emitting derived account events.
    pub frozen_account: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            venue: Venue::new("SIM"),
            account_id: AccountId::new("SIM-001"),
            book_level: BookLevel::L2,
            starting_balances: Vec::new(),
            reject_stop_immediately_triggerable: true,
            frozen_account: false,
        }
    }
}

/// Funds reserved against a working order. `per_unit` releases
/// proportionally on partial fills; `remaining` is the exact amount still
/// held, so amendments can never over-release.
#[derive(Debug, Clone)]
struct Lock {
    currency: String,
    per_unit: Decimal,
    remaining: Decimal,
}

/// The simulated venue
pub struct SimulatedExchange {
    config: ExchangeConfig,
    instruments: HashMap<InstrumentId, Instrument>,
    books: HashMap<InstrumentId, OrderBook>,
    orders: HashMap<ClientOrderId, Order>,
    /// Working orders per instrument, in submission order.
    working_ids: HashMap<InstrumentId, Vec<ClientOrderId>>,
    locks: HashMap<ClientOrderId, Lock>,
    oco_link_of: HashMap<ClientOrderId, String>,
    oco_members: HashMap<String, BTreeSet<ClientOrderId>>,
    /// Bracket entry → contingent children awaiting the entry fill.
    pending_children: HashMap<ClientOrderId, Vec<ClientOrderId>>,
    positions: HashMap<PositionId, Position>,
    /// Open position per instrument (netting).
    position_for: HashMap<InstrumentId, PositionId>,
    balances: BTreeMap<String, Balance>,
    commissions: BTreeMap<String, Decimal>,
    fill_model: FillModel,
    xrate: ExchangeRateCalculator,
    modules: Vec<Box<dyn SimulationModule>>,
    ids: IdGenerator,
    clock_ns: i64,
}

impl SimulatedExchange {
    pub fn new(config: ExchangeConfig, fill_model: FillModel) -> Self {
        let mut balances = BTreeMap::new();
        for money in &config.starting_balances {
            balances.insert(
                money.currency.clone(),
                Balance::new(money.currency.clone(), money.amount),
            );
        }
        let ids = IdGenerator::new(config.venue.clone());
        Self {
            config,
            instruments: HashMap::new(),
            books: HashMap::new(),
            orders: HashMap::new(),
            working_ids: HashMap::new(),
            locks: HashMap::new(),
            oco_link_of: HashMap::new(),
            oco_members: HashMap::new(),
            pending_children: HashMap::new(),
            positions: HashMap::new(),
            position_for: HashMap::new(),
            balances,
            commissions: BTreeMap::new(),
            fill_model,
            xrate: ExchangeRateCalculator::new(),
            modules: Vec::new(),
            ids,
            clock_ns: 0,
        }
    }

    /// Register an instrument and create its (empty) book
    pub fn add_instrument(&mut self, instrument: Instrument) {
        let book = OrderBook::new(
            instrument.id.clone(),
            self.config.book_level,
            instrument.price_precision,
            instrument.size_precision,
        );
        self.books.insert(instrument.id.clone(), book);
        self.instruments.insert(instrument.id.clone(), instrument);
    }

    pub fn add_module(&mut self, module: Box<dyn SimulationModule>) {
        self.modules.push(module);
    }

    pub fn xrate_mut(&mut self) -> &mut ExchangeRateCalculator {
        &mut self.xrate
    }

    pub fn book(&self, instrument_id: &InstrumentId) -> Option<&OrderBook> {
        self.books.get(instrument_id)
    }

    pub fn order(&self, client_order_id: &ClientOrderId) -> Option<&Order> {
        self.orders.get(client_order_id)
    }

    pub fn balances(&self) -> Vec<Balance> {
        self.balances.values().cloned().collect()
    }

    pub fn balance(&self, currency: &str) -> Option<&Balance> {
        self.balances.get(currency)
    }

    /// Cumulative commissions charged, per currency
    pub fn commissions(&self) -> &BTreeMap<String, Decimal> {
        &self.commissions
    }

    /// Cumulative commissions converted into one currency; `None` when a
    /// rate is missing from the calculator
    pub fn total_commissions_in(&self, currency: &str) -> Option<Money> {
        let mut total = Decimal::ZERO;
        for (ccy, amount) in &self.commissions {
            let rate = self.xrate.get_rate(ccy, currency)?;
            total += amount * rate;
        }
        Some(Money::new(currency, total))
    }

    /// The open position for an instrument, if any
    pub fn position(&self, instrument_id: &InstrumentId) -> Option<&Position> {
        self.position_for
            .get(instrument_id)
            .and_then(|id| self.positions.get(id))
    }

    /// Every position ever opened, flat ones included (audit)
    pub fn positions(&self) -> Vec<&Position> {
        self.positions.values().collect()
    }

    pub fn working_count(&self, instrument_id: &InstrumentId) -> usize {
        self.working_ids
            .get(instrument_id)
            .map(|ids| ids.len())
            .unwrap_or(0)
    }

    pub fn clock_ns(&self) -> i64 {
        self.clock_ns
    }

    /// Clear books, orders, links, positions and counters; restore the
    /// starting balances. Registered instruments are kept.
    pub fn reset(&mut self) {
        for book in self.books.values_mut() {
            book.clear();
        }
        self.orders.clear();
        self.working_ids.clear();
        self.locks.clear();
        self.oco_link_of.clear();
        self.oco_members.clear();
        self.pending_children.clear();
        self.positions.clear();
        self.position_for.clear();
        self.balances.clear();
        for money in &self.config.starting_balances {
            self.balances.insert(
                money.currency.clone(),
                Balance::new(money.currency.clone(), money.amount),
            );
        }
        self.commissions.clear();
        self.fill_model.reset();
        for module in &mut self.modules {
            module.reset();
        }
        self.ids.reset();
        self.clock_ns = 0;
    }

    // ── Market data ingestion ───────────────────────────────────────────

    /// Ingest a top-of-book quote (L1 books only) and run the matching cycle
    pub fn process_quote_tick(
        &mut self,
        tick: &QuoteTick,
    ) -> Result<Vec<ExecutionEvent>, ExchangeError> {
        let book = self.book_mut(&tick.instrument_id)?;
        if book.level != BookLevel::L1 {
            return Err(ExchangeError::QuoteTickRequiresL1);
        }
        book.update_top(&Tick::Quote(tick.clone()))?;
        self.clock_ns = tick.ts_event_ns;

        let mut events = Vec::new();
        self.run_modules(&mut events);
        self.run_matching_cycle(&tick.instrument_id, None, &mut events);
        Ok(events)
    }

    /// Ingest a trade print and run the matching cycle
    ///
    /// An L1 book takes the print as its new top; deeper books are left to
    /// their own data feed and the print only drives passive fills.
    pub fn process_trade_tick(
        &mut self,
        tick: &TradeTick,
    ) -> Result<Vec<ExecutionEvent>, ExchangeError> {
        let book = self.book_mut(&tick.instrument_id)?;
        if book.level == BookLevel::L1 {
            book.update_top(&Tick::Trade(tick.clone()))?;
        }
        self.clock_ns = tick.ts_event_ns;

        let mut events = Vec::new();
        self.run_modules(&mut events);
        self.run_matching_cycle(&tick.instrument_id, Some(tick), &mut events);
        Ok(events)
    }

    /// Ingest book data (snapshot, delta batch or single delta) and run the
    /// matching cycle
    pub fn process_order_book(
        &mut self,
        data: &OrderBookData,
    ) -> Result<Vec<ExecutionEvent>, ExchangeError> {
        let book = self.book_mut(data.instrument_id())?;
        book.apply(data)?;
        self.clock_ns = data.ts_event_ns();

        let mut events = Vec::new();
        self.run_modules(&mut events);
        self.run_matching_cycle(data.instrument_id(), None, &mut events);
        Ok(events)
    }

    fn book_mut(&mut self, instrument_id: &InstrumentId) -> Result<&mut OrderBook, ExchangeError> {
        self.books
            .get_mut(instrument_id)
            .ok_or_else(|| ExchangeError::InstrumentNotFound {
                instrument_id: instrument_id.to_string(),
            })
    }

    fn run_modules(&mut self, out: &mut Vec<ExecutionEvent>) {
        if self.modules.is_empty() {
            return;
        }
        let before = self.balances.clone();
        let mut injected = false;
        for module in &mut self.modules {
            let events = module.process(&mut self.balances, self.clock_ns);
            injected |= !events.is_empty();
            out.extend(events);
        }
        if injected || self.balances != before {
            out.push(self.account_state_event());
        }
    }

    // ── Commands ────────────────────────────────────────────────────────

    /// Execute a trading command; every validation failure surfaces as a
    /// reject event, never an error
    pub fn execute(&mut self, command: TradingCommand) -> Vec<ExecutionEvent> {
        let mut events = Vec::new();
        match command {
            TradingCommand::Submit(submit) => self.handle_submit(submit, &mut events),
            TradingCommand::SubmitBracket(bracket) => {
                self.handle_submit_bracket(bracket, &mut events)
            }
            TradingCommand::Update(update) => self.handle_update(update, &mut events),
            TradingCommand::Cancel(cancel) => self.handle_cancel(cancel, &mut events),
        }
        events
    }

    /// Credit (positive) or debit (negative) the free balance directly
    pub fn adjust_account(&mut self, money: Money) -> Vec<ExecutionEvent> {
        if !self.config.frozen_account {
            let balance = self
                .balances
                .entry(money.currency.clone())
                .or_insert_with(|| Balance::new(money.currency.clone(), Decimal::ZERO));
            if money.amount >= Decimal::ZERO {
                balance.credit(money.amount);
            } else if let Err(err) = balance.debit(-money.amount) {
                warn!(%err, "adjust_account debit failed");
                return Vec::new();
            }
        }
        vec![self.account_state_event()]
    }

    fn handle_submit(&mut self, submit: SubmitOrder, out: &mut Vec<ExecutionEvent>) {
        let mut order = submit.order;
        let client_order_id = order.client_order_id.clone();

        if self.orders.contains_key(&client_order_id) {
            out.push(self.reject_event(&client_order_id, "duplicate client_order_id"));
            return;
        }

        let submitted = OrderEvent::Submitted {
            client_order_id: client_order_id.clone(),
            ts_event_ns: self.clock_ns,
        };
        if order.apply(&submitted).is_err() {
            out.push(self.reject_event(&client_order_id, "order not in initialized state"));
            return;
        }
        out.push(ExecutionEvent::Order(submitted));

        if let Err(reason) = self.validate_submission(&order) {
            let rejected = OrderEvent::Rejected {
                client_order_id: client_order_id.clone(),
                reason,
                ts_event_ns: self.clock_ns,
            };
            order.apply(&rejected).expect("reject after submit is valid");
            self.orders.insert(client_order_id, order);
            out.push(ExecutionEvent::Order(rejected));
            return;
        }

        let venue_order_id = self.ids.generate_venue_order_id(&order.instrument_id);
        let accepted = OrderEvent::Accepted {
            client_order_id: client_order_id.clone(),
            venue_order_id,
            ts_event_ns: self.clock_ns,
        };
        order.apply(&accepted).expect("accept after submit is valid");
        out.push(ExecutionEvent::Order(accepted));

        if let Some(link_id) = &submit.link_id {
            self.oco_link_of
                .insert(client_order_id.clone(), link_id.clone());
            self.oco_members
                .entry(link_id.clone())
                .or_default()
                .insert(client_order_id.clone());
        }

        self.lock_for_order(&order);
        let instrument_id = order.instrument_id.clone();
        self.orders.insert(client_order_id.clone(), order);
        self.working_ids
            .entry(instrument_id)
            .or_default()
            .push(client_order_id.clone());

        self.try_immediate_execution(&client_order_id, out);
    }

    fn handle_submit_bracket(&mut self, bracket: SubmitBracketOrder, out: &mut Vec<ExecutionEvent>) {
        let entry_id = bracket.entry.client_order_id.clone();
        let sl_id = bracket.stop_loss.client_order_id.clone();
        let tp_id = bracket.take_profit.client_order_id.clone();

        // Children are venue-held until the entry fills; they share an OCO
        // link so the surviving one cancels when the other fills.
        let oco_link = format!("OCO-{}", entry_id);

        let before = out.len();
        self.handle_submit(SubmitOrder::new(bracket.entry, self.clock_ns), out);
        let entry_rejected = out[before..]
            .iter()
            .any(|e| matches!(e, ExecutionEvent::Order(OrderEvent::Rejected { .. })));
        if entry_rejected {
            // The whole bracket dies with its entry.
            for child_id in [sl_id, tp_id] {
                out.push(self.reject_event(&child_id, "parent order rejected"));
            }
            return;
        }

        for child in [bracket.stop_loss, bracket.take_profit] {
            let child_id = child.client_order_id.clone();
            let mut child = child;

            let submitted = OrderEvent::Submitted {
                client_order_id: child_id.clone(),
                ts_event_ns: self.clock_ns,
            };
            child.apply(&submitted).expect("fresh child order");
            out.push(ExecutionEvent::Order(submitted));

            let venue_order_id = self.ids.generate_venue_order_id(&child.instrument_id);
            let accepted = OrderEvent::Accepted {
                client_order_id: child_id.clone(),
                venue_order_id,
                ts_event_ns: self.clock_ns,
            };
            child.apply(&accepted).expect("accept after submit");
            out.push(ExecutionEvent::Order(accepted));

            self.oco_link_of.insert(child_id.clone(), oco_link.clone());
            self.oco_members
                .entry(oco_link.clone())
                .or_default()
                .insert(child_id.clone());
            self.orders.insert(child_id, child);
        }

        self.pending_children
            .insert(entry_id.clone(), vec![sl_id, tp_id]);

        // The entry may already have filled within this call.
        if let Some(entry) = self.orders.get(&entry_id) {
            if entry.state == OrderState::Filled {
                self.activate_children(&entry_id);
            }
        }
    }

    fn handle_update(&mut self, update: UpdateOrder, out: &mut Vec<ExecutionEvent>) {
        let Some(order) = self.orders.get(&update.client_order_id) else {
            out.push(self.update_reject_event(
                &update.client_order_id,
                "update rejected",
                "order not found",
            ));
            return;
        };
        if !order.is_working() {
            out.push(self.update_reject_event(
                &update.client_order_id,
                "update rejected",
                "order not working",
            ));
            return;
        }

        let new_qty = update.quantity.unwrap_or(order.quantity);
        if new_qty.as_decimal() < order.filled_qty.as_decimal()
            || new_qty.is_zero()
        {
            out.push(self.update_reject_event(
                &update.client_order_id,
                "update rejected",
                "quantity below filled quantity",
            ));
            return;
        }
        let instrument = self
            .instruments
            .get(&order.instrument_id)
            .expect("working order always has an instrument");
        let price_ok = update
            .price
            .map(|p| p.is_quantized(instrument.price_precision as u32))
            .unwrap_or(true);
        if !price_ok || !new_qty.is_quantized(instrument.size_precision as u32) {
            out.push(self.update_reject_event(
                &update.client_order_id,
                "update rejected",
                "price or quantity not quantized",
            ));
            return;
        }

        let updated = OrderEvent::Updated {
            client_order_id: update.client_order_id.clone(),
            quantity: new_qty,
            price: update.price,
            trigger: update.trigger,
            ts_event_ns: self.clock_ns,
        };
        let order = self
            .orders
            .get_mut(&update.client_order_id)
            .expect("checked above");
        order.apply(&updated).expect("working order accepts update");
        out.push(ExecutionEvent::Order(updated));

        // Re-reserve funds for the amended remainder.
        let order = self.orders[&update.client_order_id].clone();
        self.release_lock(&update.client_order_id);
        self.lock_for_order(&order);
    }

    fn handle_cancel(&mut self, cancel: CancelOrder, out: &mut Vec<ExecutionEvent>) {
        let Some(order) = self.orders.get(&cancel.client_order_id) else {
            out.push(self.cancel_reject_event(
                &cancel.client_order_id,
                "cancel rejected",
                "order not found",
            ));
            return;
        };
        if order.is_completed() {
            out.push(self.cancel_reject_event(
                &cancel.client_order_id,
                "cancel rejected",
                "order already completed",
            ));
            return;
        }
        self.cancel_order(&cancel.client_order_id.clone(), out);
    }

    // ── Validation ──────────────────────────────────────────────────────

    fn validate_submission(&self, order: &Order) -> Result<(), String> {
        let Some(instrument) = self.instruments.get(&order.instrument_id) else {
            return Err(format!("no instrument {}", order.instrument_id));
        };

        if order.quantity.is_zero() {
            return Err("quantity must be positive".to_string());
        }
        if !order.quantity.is_quantized(instrument.size_precision as u32) {
            return Err(format!(
                "quantity {} not quantized to {} decimals",
                order.quantity, instrument.size_precision
            ));
        }
        for price in [order.price, order.trigger].into_iter().flatten() {
            if !price.is_quantized(instrument.price_precision as u32) {
                return Err(format!(
                    "price {} not quantized to {} decimals",
                    price, instrument.price_precision
                ));
            }
        }
        match order.order_type {
            OrderType::Limit | OrderType::StopLimit if order.price.is_none() => {
                return Err("limit order requires a price".to_string());
            }
            OrderType::StopMarket | OrderType::StopLimit if order.trigger.is_none() => {
                return Err("stop order requires a trigger".to_string());
            }
            _ => {}
        }

        let book = self
            .books
            .get(&order.instrument_id)
            .expect("book exists for registered instrument");

        match order.order_type {
            OrderType::Market => {
                let available: Decimal = match order.side {
                    OrderSide::BUY => book
                        .asks
                        .simulate_fills(order.quantity, None)
                        .iter()
                        .map(|(_, q)| q.as_decimal())
                        .sum(),
                    OrderSide::SELL => book
                        .bids
                        .simulate_fills(order.quantity, None)
                        .iter()
                        .map(|(_, q)| q.as_decimal())
                        .sum(),
                };
                if available == Decimal::ZERO {
                    return Err("no liquidity to execute market order".to_string());
                }
                if order.time_in_force == TimeInForce::FOK
                    && available < order.quantity.as_decimal()
                {
                    return Err("FOK quantity exceeds available liquidity".to_string());
                }
            }
            OrderType::Limit => {
                if order.post_only && self.is_marketable(book, order) {
                    return Err("post-only order would immediately match".to_string());
                }
                if order.time_in_force == TimeInForce::FOK {
                    let cap = order.price;
                    let available: Decimal = match order.side {
                        OrderSide::BUY => book.asks.simulate_fills(order.quantity, cap),
                        OrderSide::SELL => book.bids.simulate_fills(order.quantity, cap),
                    }
                    .iter()
                    .map(|(_, q)| q.as_decimal())
                    .sum();
                    if available < order.quantity.as_decimal() {
                        return Err("FOK quantity exceeds available liquidity".to_string());
                    }
                }
            }
            OrderType::StopMarket | OrderType::StopLimit => {
                if self.config.reject_stop_immediately_triggerable {
                    let trigger = order.trigger.expect("stop order has a trigger");
                    let breached = match order.side {
                        OrderSide::BUY => book
                            .best_ask_price()
                            .map(|ask| ask >= trigger)
                            .unwrap_or(false),
                        OrderSide::SELL => book
                            .best_bid_price()
                            .map(|bid| bid <= trigger)
                            .unwrap_or(false),
                    };
                    if breached {
                        return Err("stop trigger already breached".to_string());
                    }
                }
            }
        }

        if order.reduce_only {
            let reducible = self
                .position(&order.instrument_id)
                .filter(|p| !p.is_closed())
                .map(|p| {
                    let opposes = (p.is_long() && order.side == OrderSide::SELL)
                        || (p.is_short() && order.side == OrderSide::BUY);
                    opposes && p.quantity.as_decimal() >= order.quantity.as_decimal()
                })
                .unwrap_or(false);
            if !reducible {
                return Err("reduce-only order would open or increase a position".to_string());
            }
        }

        self.validate_balance(instrument, order)
    }

    fn validate_balance(&self, instrument: &Instrument, order: &Order) -> Result<(), String> {
        if self.config.frozen_account {
            return Ok(());
        }
        let (currency, required) = self.required_funds(instrument, order);
        let free = self
            .balances
            .get(&currency)
            .map(|b| b.free)
            .unwrap_or(Decimal::ZERO);
        if required > free {
            return Err(format!(
                "insufficient balance: required {} {}, free {} {}",
                required, currency, free, currency
            ));
        }
        Ok(())
    }

    /// The funds a submission must be able to cover: quote notional plus
    /// taker-fee and one-tick-slippage headroom for buys, base quantity for
    /// sells.
    fn required_funds(&self, instrument: &Instrument, order: &Order) -> (String, Decimal) {
        match order.side {
            OrderSide::SELL => (
                instrument.base_currency().to_string(),
                order.quantity.as_decimal(),
            ),
            OrderSide::BUY => {
                let reference_px = self.reference_price(instrument, order);
                let notional = reference_px * order.quantity.as_decimal();
                let headroom = instrument.price_increment.as_decimal()
                    * order.quantity.as_decimal();
                let required =
                    (notional + headroom) * (Decimal::ONE + instrument.taker_fee);
                (instrument.quote_currency().to_string(), required)
            }
        }
    }

    /// Worst price the order could pay: its limit, its trigger, or the book
    /// sweep for a market order.
    fn reference_price(&self, instrument: &Instrument, order: &Order) -> Decimal {
        if let Some(price) = order.price {
            return price.as_decimal();
        }
        if let Some(trigger) = order.trigger {
            return trigger.as_decimal();
        }
        let book = self
            .books
            .get(&instrument.id)
            .expect("book exists for registered instrument");
        let ladder = match order.side {
            OrderSide::BUY => &book.asks,
            OrderSide::SELL => &book.bids,
        };
        let fills = ladder.simulate_fills(order.quantity, None);
        let filled: Decimal = fills.iter().map(|(_, q)| q.as_decimal()).sum();
        if filled == Decimal::ZERO {
            return Decimal::ZERO;
        }
        let notional: Decimal = fills
            .iter()
            .map(|(p, q)| p.as_decimal() * q.as_decimal())
            .sum();
        notional / filled
    }

    fn is_marketable(&self, book: &OrderBook, order: &Order) -> bool {
        let Some(price) = order.price else {
            return true; // market orders are always marketable
        };
        match order.side {
            OrderSide::BUY => book.best_ask_price().map(|ask| price >= ask).unwrap_or(false),
            OrderSide::SELL => book.best_bid_price().map(|bid| price <= bid).unwrap_or(false),
        }
    }

    // ── Matching ────────────────────────────────────────────────────────

    /// Fill anything marketable right at submission (market orders, crossing
    /// limits); IOC remainders are canceled here.
    fn try_immediate_execution(
        &mut self,
        client_order_id: &ClientOrderId,
        out: &mut Vec<ExecutionEvent>,
    ) {
        let order = self.orders[client_order_id].clone();
        let book = &self.books[&order.instrument_id];

        let marketable = match order.order_type {
            OrderType::Market => true,
            OrderType::Limit => self.is_marketable(book, &order),
            // Stops wait for a trigger from market data.
            OrderType::StopMarket | OrderType::StopLimit => false,
        };

        if marketable {
            self.fill_aggressive(client_order_id, out);
        }

        if let Some(order) = self.orders.get(client_order_id) {
            let unfilled_remainder = order.is_working();
            if unfilled_remainder
                && (order.time_in_force == TimeInForce::IOC || order.order_type == OrderType::Market)
            {
                // Market remainders only exist when the book ran out.
                self.cancel_order(client_order_id, out);
            }
        }
    }

    /// One pass of the matching engine for every working order of an
    /// instrument, driven by the freshest market data.
    fn run_matching_cycle(
        &mut self,
        instrument_id: &InstrumentId,
        last_trade: Option<&TradeTick>,
        out: &mut Vec<ExecutionEvent>,
    ) {
        let ids: Vec<ClientOrderId> = self
            .working_ids
            .get(instrument_id)
            .cloned()
            .unwrap_or_default();

        for client_order_id in ids {
            // An earlier iteration may have canceled this order (OCO).
            let Some(order) = self.orders.get(&client_order_id) else {
                continue;
            };
            if !order.is_working() {
                continue;
            }
            let order = order.clone();

            match order.order_type {
                OrderType::StopMarket => {
                    if self.stop_triggered(&order) {
                        self.fill_aggressive(&client_order_id, out);
                        if let Some(order) = self.orders.get(&client_order_id) {
                            if order.is_working() {
                                // Book exhausted mid-sweep.
                                self.cancel_order(&client_order_id, out);
                            }
                        }
                    }
                }
                OrderType::StopLimit => {
                    if order.state == OrderState::Accepted {
                        if self.stop_triggered(&order) {
                            let triggered = OrderEvent::Triggered {
                                client_order_id: client_order_id.clone(),
                                ts_event_ns: self.clock_ns,
                            };
                            self.orders
                                .get_mut(&client_order_id)
                                .expect("order present")
                                .apply(&triggered)
                                .expect("accepted stop-limit can trigger");
                            out.push(ExecutionEvent::Order(triggered));

                            let book = &self.books[&order.instrument_id];
                            if self.is_marketable(book, &order) {
                                self.fill_aggressive(&client_order_id, out);
                            }
                        }
                    } else {
                        // Already triggered: plain limit semantics.
                        self.try_passive_fill(&client_order_id, &order, last_trade, out);
                    }
                }
                OrderType::Limit => {
                    self.try_passive_fill(&client_order_id, &order, last_trade, out);
                }
                OrderType::Market => {
                    // Market orders never rest; nothing to do here.
                }
            }
        }

        self.expire_orders(instrument_id, out);
    }

    fn stop_triggered(&self, order: &Order) -> bool {
        let trigger = match order.trigger {
            Some(trigger) => trigger,
            None => return false,
        };
        let book = &self.books[&order.instrument_id];
        match order.side {
            OrderSide::BUY => book
                .best_ask_price()
                .map(|ask| ask >= trigger)
                .unwrap_or(false),
            OrderSide::SELL => book
                .best_bid_price()
                .map(|bid| bid <= trigger)
                .unwrap_or(false),
        }
    }

    /// A resting limit order fills when the top trades at or through its
    /// price. A trade print is authoritative; otherwise the opposite book
    /// crossing the price is taken as traded flow.
    fn try_passive_fill(
        &mut self,
        client_order_id: &ClientOrderId,
        order: &Order,
        last_trade: Option<&TradeTick>,
        out: &mut Vec<ExecutionEvent>,
    ) {
        let limit_px = order.price.expect("limit order has a price");

        if let Some(trade) = last_trade {
            let through = match order.side {
                OrderSide::BUY => trade.price < limit_px,
                OrderSide::SELL => trade.price > limit_px,
            };
            let at_limit = trade.price == limit_px;
            let fills = if through || (at_limit && self.fill_model.is_limit_filled()) {
                let qty = order.leaves_qty.min(trade.size);
                vec![(limit_px, qty)]
            } else {
                return;
            };
            self.apply_fills(client_order_id, fills, LiquiditySide::MAKER, out);
            return;
        }

        let book = self.books.get(&order.instrument_id).expect("book exists");
        let (crossed, at_limit_only) = match order.side {
            OrderSide::BUY => {
                let best = book.asks.top().map(|l| l.price);
                (
                    best.map(|ask| ask <= limit_px).unwrap_or(false),
                    best.map(|ask| ask == limit_px).unwrap_or(false),
                )
            }
            OrderSide::SELL => {
                let best = book.bids.top().map(|l| l.price);
                (
                    best.map(|bid| bid >= limit_px).unwrap_or(false),
                    best.map(|bid| bid == limit_px).unwrap_or(false),
                )
            }
        };
        if !crossed {
            return;
        }
        if at_limit_only && !self.fill_model.is_limit_filled() {
            return;
        }

        let book = self
            .books
            .get_mut(&order.instrument_id)
            .expect("book exists");
        let consumed = match order.side {
            OrderSide::BUY => book.asks.consume(order.leaves_qty, Some(limit_px)),
            OrderSide::SELL => book.bids.consume(order.leaves_qty, Some(limit_px)),
        };
        let qty: Decimal = consumed.iter().map(|(_, q)| q.as_decimal()).sum();
        if qty == Decimal::ZERO {
            return;
        }
        // Passive fills execute at the resting order's own price.
        let fills = vec![(limit_px, Quantity::new(qty))];
        self.apply_fills(client_order_id, fills, LiquiditySide::MAKER, out);
    }

    /// Consume opposite depth top-down; market-type orders may slip one tick
    /// on the first slice.
    fn fill_aggressive(&mut self, client_order_id: &ClientOrderId, out: &mut Vec<ExecutionEvent>) {
        let order = self.orders[client_order_id].clone();
        let cap = match order.order_type {
            OrderType::Market | OrderType::StopMarket => None,
            OrderType::Limit | OrderType::StopLimit => order.price,
        };

        let slips = matches!(order.order_type, OrderType::Market | OrderType::StopMarket)
            && self.fill_model.is_slipped();

        let book = self
            .books
            .get_mut(&order.instrument_id)
            .expect("book exists");
        let mut fills = match order.side {
            OrderSide::BUY => book.asks.consume(order.leaves_qty, cap),
            OrderSide::SELL => book.bids.consume(order.leaves_qty, cap),
        };
        if fills.is_empty() {
            return;
        }

        if slips {
            let increment = self.instruments[&order.instrument_id].price_increment;
            let (price, qty) = fills[0];
            fills[0] = match order.side {
                OrderSide::BUY => (price + increment, qty),
                OrderSide::SELL => (price - increment, qty),
            };
        }

        self.apply_fills(client_order_id, fills, LiquiditySide::TAKER, out);
    }

    // ── Fill settlement ─────────────────────────────────────────────────

    /// Produce one fill event per slice, settle balances and positions, and
    /// run the OCO / bracket consequences.
    fn apply_fills(
        &mut self,
        client_order_id: &ClientOrderId,
        fills: Vec<(Price, Quantity)>,
        liquidity_side: LiquiditySide,
        out: &mut Vec<ExecutionEvent>,
    ) {
        for (px, qty) in fills {
            if qty.is_zero() {
                continue;
            }
            self.apply_fill_slice(client_order_id, px, qty, liquidity_side, out);
        }

        let order = self.orders[client_order_id].clone();
        if order.state == OrderState::Filled {
            self.release_lock(client_order_id);
            self.remove_from_working(client_order_id);
            self.activate_children(client_order_id);
        }
        // Any fill, partial included, cancels OCO siblings.
        if order.filled_qty.as_decimal() > Decimal::ZERO {
            self.cancel_oco_siblings(client_order_id, out);
        }
    }

    fn apply_fill_slice(
        &mut self,
        client_order_id: &ClientOrderId,
        px: Price,
        qty: Quantity,
        liquidity_side: LiquiditySide,
        out: &mut Vec<ExecutionEvent>,
    ) {
        let order = self.orders[client_order_id].clone();
        let instrument = self.instruments[&order.instrument_id].clone();
        let quote = instrument.quote_currency().to_string();

        let notional = px.as_decimal() * qty.as_decimal();
        let fee_rate = match liquidity_side {
            LiquiditySide::MAKER => instrument.maker_fee,
            LiquiditySide::TAKER => instrument.taker_fee,
        };
        let commission = notional * fee_rate;

        let position_id = self.position_id_for_fill(&order.instrument_id);
        let fill = OrderFilled {
            client_order_id: client_order_id.clone(),
            venue_order_id: order
                .venue_order_id
                .clone()
                .expect("working order has a venue id"),
            execution_id: self.ids.generate_execution_id(&order.instrument_id),
            position_id: position_id.clone(),
            instrument_id: order.instrument_id.clone(),
            side: order.side,
            last_qty: qty,
            last_px: px,
            commission: Money::new(quote.clone(), commission),
            liquidity_side,
            event_id: Uuid::now_v7(),
            ts_event_ns: self.clock_ns,
        };

        if !self.config.frozen_account {
            if let Err(err) = self.settle(&order, &instrument, &fill) {
                // Settlement shortfall after validation is a bug; surface it
                // loudly but keep the simulation consistent by rejecting the
                // slice.
                error!(%err, order = %client_order_id, "fill settlement failed");
                return;
            }
        }
        *self.commissions.entry(quote).or_insert(Decimal::ZERO) += commission;

        self.update_position(position_id, &fill);

        self.orders
            .get_mut(client_order_id)
            .expect("order present")
            .apply(&OrderEvent::Filled(fill.clone()))
            .expect("working order accepts fills");

        debug!(
            order = %client_order_id,
            px = %fill.last_px,
            qty = %fill.last_qty,
            "fill"
        );
        out.push(ExecutionEvent::Order(OrderEvent::Filled(fill)));
        out.push(self.account_state_event());
    }

    /// Move money for one fill slice under cash-account semantics
    fn settle(
        &mut self,
        order: &Order,
        instrument: &Instrument,
        fill: &OrderFilled,
    ) -> Result<(), types::errors::AccountError> {
        let quote = instrument.quote_currency().to_string();
        let base = instrument.base_currency().to_string();
        let notional = fill.notional();
        let commission = fill.commission.amount;

        // Release the reserved share for this slice first.
        if let Some(lock) = self.locks.get_mut(&order.client_order_id) {
            let release = (lock.per_unit * fill.last_qty.as_decimal()).min(lock.remaining);
            lock.remaining -= release;
            let currency = lock.currency.clone();
            if let Some(balance) = self.balances.get_mut(&currency) {
                balance.unlock(release)?;
            }
        }

        match order.side {
            OrderSide::BUY => {
                let cost = notional + commission;
                self.balances
                    .get_mut(&quote)
                    .ok_or(types::errors::AccountError::CurrencyNotFound {
                        currency: quote.clone(),
                    })?
                    .debit(cost)?;
                self.balances
                    .entry(base.clone())
                    .or_insert_with(|| Balance::new(base, Decimal::ZERO))
                    .credit(fill.last_qty.as_decimal());
            }
            OrderSide::SELL => {
                self.balances
                    .get_mut(&base)
                    .ok_or(types::errors::AccountError::CurrencyNotFound {
                        currency: base.clone(),
                    })?
                    .debit(fill.last_qty.as_decimal())?;
                let proceeds = notional - commission;
                self.balances
                    .entry(quote.clone())
                    .or_insert_with(|| Balance::new(quote, Decimal::ZERO))
                    .credit(proceeds);
            }
        }
        Ok(())
    }

    fn position_id_for_fill(&mut self, instrument_id: &InstrumentId) -> PositionId {
        if let Some(id) = self.position_for.get(instrument_id) {
            if let Some(position) = self.positions.get(id) {
                if !position.is_closed() {
                    return id.clone();
                }
            }
        }
        self.ids.generate_position_id(instrument_id)
    }

    fn update_position(&mut self, position_id: PositionId, fill: &OrderFilled) {
        match self.positions.get_mut(&position_id) {
            Some(position) => {
                if let Err(err) = position.apply(fill) {
                    error!(%err, position = %position_id, "position update failed");
                    return;
                }
                if position.is_closed() {
                    self.position_for.remove(&fill.instrument_id);
                }
            }
            None => {
                let position = Position::new(fill.clone());
                self.position_for
                    .insert(fill.instrument_id.clone(), position_id.clone());
                self.positions.insert(position_id, position);
            }
        }
    }

    // ── Locks ───────────────────────────────────────────────────────────

    /// Reserve funds for a passive order: quote notional (with taker-fee
    /// headroom) for buys, base quantity for sells. Market orders settle
    /// against the free balance directly.
    fn lock_for_order(&mut self, order: &Order) {
        if order.order_type == OrderType::Market || self.config.frozen_account {
            return;
        }
        let instrument = &self.instruments[&order.instrument_id];
        let (currency, per_unit) = match order.side {
            OrderSide::SELL => (instrument.base_currency().to_string(), Decimal::ONE),
            OrderSide::BUY => {
                let px = order
                    .price
                    .or(order.trigger)
                    .expect("passive order has a price or trigger")
                    .as_decimal();
                (
                    instrument.quote_currency().to_string(),
                    px * (Decimal::ONE + instrument.taker_fee),
                )
            }
        };
        let amount = per_unit * order.leaves_qty.as_decimal();
        let balance = self
            .balances
            .entry(currency.clone())
            .or_insert_with(|| Balance::new(currency.clone(), Decimal::ZERO));
        if let Err(err) = balance.lock(amount) {
            // Validated at submission; a failure here is a bug.
            error!(%err, order = %order.client_order_id, "lock failed");
            return;
        }
        self.locks.insert(
            order.client_order_id.clone(),
            Lock {
                currency,
                per_unit,
                remaining: amount,
            },
        );
    }

    /// Release whatever reservation remains for an order
    fn release_lock(&mut self, client_order_id: &ClientOrderId) {
        let Some(lock) = self.locks.remove(client_order_id) else {
            return;
        };
        if lock.remaining > Decimal::ZERO {
            if let Some(balance) = self.balances.get_mut(&lock.currency) {
                if let Err(err) = balance.unlock(lock.remaining) {
                    error!(%err, order = %client_order_id, "unlock failed");
                }
            }
        }
    }

    // ── Order lifecycle helpers ─────────────────────────────────────────

    fn cancel_order(&mut self, client_order_id: &ClientOrderId, out: &mut Vec<ExecutionEvent>) {
        let canceled = OrderEvent::Canceled {
            client_order_id: client_order_id.clone(),
            ts_event_ns: self.clock_ns,
        };
        let Some(order) = self.orders.get_mut(client_order_id) else {
            return;
        };
        if order.apply(&canceled).is_err() {
            return;
        }
        out.push(ExecutionEvent::Order(canceled));

        self.release_lock(client_order_id);
        self.remove_from_working(client_order_id);

        // Canceling a bracket entry cancels its held children.
        if let Some(children) = self.pending_children.remove(client_order_id) {
            for child_id in children {
                self.cancel_order(&child_id, out);
            }
        }
    }

    fn expire_orders(&mut self, instrument_id: &InstrumentId, out: &mut Vec<ExecutionEvent>) {
        let ids: Vec<ClientOrderId> = self
            .working_ids
            .get(instrument_id)
            .cloned()
            .unwrap_or_default();
        for client_order_id in ids {
            let Some(order) = self.orders.get(&client_order_id) else {
                continue;
            };
            let expired_now = order
                .expire_time_ns()
                .map(|expiry| self.clock_ns >= expiry)
                .unwrap_or(false);
            if !order.is_working() || !expired_now {
                continue;
            }

            let expired = OrderEvent::Expired {
                client_order_id: client_order_id.clone(),
                ts_event_ns: self.clock_ns,
            };
            self.orders
                .get_mut(&client_order_id)
                .expect("order present")
                .apply(&expired)
                .expect("working order can expire");
            out.push(ExecutionEvent::Order(expired));

            self.release_lock(&client_order_id);
            self.remove_from_working(&client_order_id);

            if let Some(children) = self.pending_children.remove(&client_order_id) {
                for child_id in children {
                    self.cancel_order(&child_id, out);
                }
            }
        }
    }

    fn cancel_oco_siblings(&mut self, client_order_id: &ClientOrderId, out: &mut Vec<ExecutionEvent>) {
        let Some(link_id) = self.oco_link_of.get(client_order_id).cloned() else {
            return;
        };
        let members = self
            .oco_members
            .get(&link_id)
            .cloned()
            .unwrap_or_default();
        for member in members {
            if &member == client_order_id {
                continue;
            }
            let cancelable = self
                .orders
                .get(&member)
                .map(|o| !o.is_completed())
                .unwrap_or(false);
            if cancelable {
                debug!(filled = %client_order_id, canceled = %member, "OCO sibling canceled");
                self.cancel_order(&member, out);
            }
        }
    }

    /// Bracket children become working once the entry has filled
    fn activate_children(&mut self, entry_id: &ClientOrderId) {
        let Some(children) = self.pending_children.remove(entry_id) else {
            return;
        };
        for child_id in children {
            let Some(child) = self.orders.get(&child_id) else {
                continue;
            };
            if !child.is_working() {
                continue;
            }
            let child = child.clone();
            self.lock_for_order(&child);
            self.working_ids
                .entry(child.instrument_id.clone())
                .or_default()
                .push(child_id.clone());
        }
    }

    fn remove_from_working(&mut self, client_order_id: &ClientOrderId) {
        for ids in self.working_ids.values_mut() {
            ids.retain(|id| id != client_order_id);
        }
    }

    // ── Event constructors ──────────────────────────────────────────────

    fn reject_event(&self, client_order_id: &ClientOrderId, reason: &str) -> ExecutionEvent {
        ExecutionEvent::Order(OrderEvent::Rejected {
            client_order_id: client_order_id.clone(),
            reason: reason.to_string(),
            ts_event_ns: self.clock_ns,
        })
    }

    fn update_reject_event(
        &self,
        client_order_id: &ClientOrderId,
        response: &str,
        reason: &str,
    ) -> ExecutionEvent {
        ExecutionEvent::Order(OrderEvent::UpdateRejected {
            client_order_id: client_order_id.clone(),
            response: response.to_string(),
            reason: reason.to_string(),
            ts_event_ns: self.clock_ns,
        })
    }

    fn cancel_reject_event(
        &self,
        client_order_id: &ClientOrderId,
        response: &str,
        reason: &str,
    ) -> ExecutionEvent {
        ExecutionEvent::Order(OrderEvent::CancelRejected {
            client_order_id: client_order_id.clone(),
            response: response.to_string(),
            reason: reason.to_string(),
            ts_event_ns: self.clock_ns,
        })
    }

    fn account_state_event(&self) -> ExecutionEvent {
        ExecutionEvent::Account(AccountState {
            account_id: self.config.account_id.clone(),
            balances: self.balances.values().cloned().collect(),
            event_id: Uuid::now_v7(),
            ts_event_ns: self.clock_ns,
        })
    }
}

//! One side of an order book
//!
//! Levels are kept in a `BTreeMap` keyed by price: O(log L) insertion and
//! lookup, O(1) top via the end keys, deterministic iteration. `reverse`
//! selects which end is best — descending for bids, ascending for asks.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::book::BookOrder;
use types::numeric::{Price, Quantity};

use crate::level::Level;

/// Price-sorted sequence of levels for one side of a book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ladder {
    /// Best price is the highest when true (bids), lowest otherwise (asks).
    pub reverse: bool,
    price_precision: u8,
    size_precision: u8,
    levels: BTreeMap<Decimal, Level>,
    /// order id → price of the level currently holding it
    index: HashMap<String, Decimal>,
}

impl Ladder {
    pub fn new(reverse: bool, price_precision: u8, size_precision: u8) -> Self {
        Self {
            reverse,
            price_precision,
            size_precision,
            levels: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn price_precision(&self) -> u8 {
        self.price_precision
    }

    pub fn size_precision(&self) -> u8 {
        self.size_precision
    }

    /// Quantize an incoming order to this ladder's precisions
    fn quantize(&self, order: &BookOrder) -> BookOrder {
        BookOrder {
            id: order.id.clone(),
            side: order.side,
            price: order.price.round_dp(self.price_precision as u32),
            size: order.size.round_dp(self.size_precision as u32),
        }
    }

    /// Insert an order, creating its level if needed
    pub fn add(&mut self, order: BookOrder) {
        let order = self.quantize(&order);
        let key = order.price.as_decimal();
        self.index.insert(order.id.clone(), key);
        self.levels
            .entry(key)
            .or_insert_with(|| Level::new(order.price))
            .add(order);
    }

    /// Update an order by id
    ///
    /// Unknown ids are inserted (this is what makes snapshot application
    /// uniform across book levels). A zero-size update deletes. A price
    /// change re-queues the order at the new level.
    pub fn update(&mut self, order: BookOrder) {
        let order = self.quantize(&order);

        let Some(&existing_price) = self.index.get(&order.id) else {
            if !order.size.is_zero() {
                self.add(order);
            }
            return;
        };

        if order.size.is_zero() {
            self.delete(&order);
            return;
        }

        if existing_price == order.price.as_decimal() {
            if let Some(level) = self.levels.get_mut(&existing_price) {
                level.update(order);
            }
        } else {
            self.delete(&order);
            self.add(order);
        }
    }

    /// Remove an order by id; empty levels are dropped
    pub fn delete(&mut self, order: &BookOrder) -> Option<BookOrder> {
        let price = self.index.remove(&order.id)?;
        let level = self.levels.get_mut(&price)?;
        let removed = level.delete(&order.id);
        if level.is_empty() {
            self.levels.remove(&price);
        }
        removed
    }

    /// Remove every level and order
    pub fn clear(&mut self) {
        self.levels.clear();
        self.index.clear();
    }

    /// The best level, if any
    pub fn top(&self) -> Option<&Level> {
        if self.reverse {
            self.levels.values().next_back()
        } else {
            self.levels.values().next()
        }
    }

    /// The best `n` levels, best first
    pub fn depth(&self, n: usize) -> Vec<&Level> {
        if self.reverse {
            self.levels.values().rev().take(n).collect()
        } else {
            self.levels.values().take(n).collect()
        }
    }

    /// All level prices, best first
    pub fn prices(&self) -> Vec<Decimal> {
        self.iter().map(|level| level.price.as_decimal()).collect()
    }

    /// Per-level volumes, best first
    pub fn volumes(&self) -> Vec<Decimal> {
        self.iter().map(|level| level.volume()).collect()
    }

    /// Per-level notional exposures, best first
    pub fn exposures(&self) -> Vec<Decimal> {
        self.iter().map(|level| level.exposure()).collect()
    }

    /// Iterate levels best-first
    pub fn iter(&self) -> Box<dyn Iterator<Item = &Level> + '_> {
        if self.reverse {
            Box::new(self.levels.values().rev())
        } else {
            Box::new(self.levels.values())
        }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Walk the ladder best-first, consuming depth until `quantity` is
    /// filled, the book is exhausted, or `limit` stops crossing.
    ///
    /// Returns one (price, qty) slice per resting order consumed. The ladder
    /// is not mutated; this is the projection used by the matching engine.
    pub fn simulate_fills(
        &self,
        quantity: Quantity,
        limit: Option<Price>,
    ) -> Vec<(Price, Quantity)> {
        let mut fills = Vec::new();
        let mut remaining = quantity.as_decimal();

        for level in self.iter() {
            if let Some(limit) = limit {
                let crosses = if self.reverse {
                    // bids ladder: a sell limit crosses while its price <= level
                    limit.as_decimal() <= level.price.as_decimal()
                } else {
                    // asks ladder: a buy limit crosses while its price >= level
                    limit.as_decimal() >= level.price.as_decimal()
                };
                if !crosses {
                    break;
                }
            }
            for order in level.orders() {
                if remaining <= Decimal::ZERO {
                    return fills;
                }
                let qty = remaining.min(order.size.as_decimal());
                if qty > Decimal::ZERO {
                    fills.push((level.price, Quantity::new(qty)));
                    remaining -= qty;
                }
            }
            if remaining <= Decimal::ZERO {
                break;
            }
        }

        fills
    }

    /// The mutating counterpart of `simulate_fills`: consume depth best-first
    /// until `quantity` is filled, the ladder is exhausted, or `limit` stops
    /// crossing. Fully consumed orders and empty levels are removed.
    pub fn consume(&mut self, quantity: Quantity, limit: Option<Price>) -> Vec<(Price, Quantity)> {
        let fills = self.simulate_fills(quantity, limit);
        for (price, qty) in &fills {
            let key = price.as_decimal();
            let Some(level) = self.levels.get_mut(&key) else {
                continue;
            };
            // Slices come out front-first within a level.
            if let Some(front) = level.orders().first().cloned() {
                let remaining = front.size.as_decimal() - qty.as_decimal();
                if remaining <= Decimal::ZERO {
                    level.delete(&front.id);
                    self.index.remove(&front.id);
                } else {
                    let mut reduced = front;
                    reduced.size = Quantity::new(remaining);
                    level.update(reduced);
                }
            }
            if level.is_empty() {
                self.levels.remove(&key);
            }
        }
        fills
    }
}

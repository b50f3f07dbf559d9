//! A single price level
//!
//! Holds all resting orders at one price in insertion order (time priority).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::book::BookOrder;
use types::numeric::{Price, Quantity};

/// All resting orders at one price on one side of a book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: Price,
    orders: Vec<BookOrder>,
}

impl Level {
    pub fn new(price: Price) -> Self {
        Self {
            price,
            orders: Vec::new(),
        }
    }

    /// Append an order at the back of the queue (time priority)
    pub fn add(&mut self, order: BookOrder) {
        debug_assert!(order.price == self.price, "order price must match level");
        self.orders.push(order);
    }

    /// Replace the order with the same id in place, preserving queue position
    ///
    /// A zero-size update removes the order. Returns false if no order with
    /// that id rests here.
    pub fn update(&mut self, order: BookOrder) -> bool {
        let Some(index) = self.orders.iter().position(|o| o.id == order.id) else {
            return false;
        };
        if order.size.is_zero() {
            self.orders.remove(index);
        } else {
            self.orders[index] = order;
        }
        true
    }

    /// Remove the order with the given id
    pub fn delete(&mut self, order_id: &str) -> Option<BookOrder> {
        let index = self.orders.iter().position(|o| o.id == order_id)?;
        Some(self.orders.remove(index))
    }

    /// Total resting volume at this level
    pub fn volume(&self) -> Decimal {
        self.orders.iter().map(|o| o.size.as_decimal()).sum()
    }

    /// Total notional exposure at this level (Σ price × size)
    pub fn exposure(&self) -> Decimal {
        self.orders.iter().map(|o| o.exposure()).sum()
    }

    pub fn orders(&self) -> &[BookOrder] {
        &self.orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// A price level ("limit") is the FIFO queue of orders resting at one price on one side of the
// book, together with the aggregate remaining volume of those orders.
//
// Levels only hold order identities. The orders themselves live in the order book's arena and
// are passed in when a level needs to read or mutate them.
//
// | Name          | Description                                        | Key Methods       |
// |---------------|----------------------------------------------------|-------------------|
// | PriceLevel    | FIFO queue of order ids with aggregate volume      | add               |
// |               |                                                    | remove            |
// |               |                                                    | fill              |
//--------------------------------------------------------------------------------------------------

use std::collections::{HashMap, VecDeque};

use rust_decimal::Decimal;
use tracing::trace;

use crate::domain::models::types::{Match, Order, OrderId};

/// Orders resting at a single price, in arrival order.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    /// The price for this level
    price: Decimal,
    /// FIFO queue of resting order ids
    orders: VecDeque<OrderId>,
    /// Sum of the remaining amounts of the queued orders
    total_volume: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            orders: VecDeque::with_capacity(4),
            total_volume: Decimal::ZERO,
        }
    }

    #[inline]
    pub fn price(&self) -> Decimal {
        self.price
    }

    #[inline]
    pub fn total_volume(&self) -> Decimal {
        self.total_volume
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Order ids in matching priority (oldest first).
    pub fn order_ids(&self) -> impl Iterator<Item = &OrderId> {
        self.orders.iter()
    }

    /// Appends `order` to the tail of the queue and points its back-reference at this level.
    pub fn add(&mut self, order: &mut Order) {
        order.level = Some(self.price);
        self.orders.push_back(order.id);
        self.total_volume += order.amount;
    }

    /// Removes `order` from the queue by identity.
    ///
    /// Returns `false` and leaves the level untouched when the order is not queued here.
    pub fn remove(&mut self, order: &mut Order) -> bool {
        let Some(position) = self.orders.iter().position(|id| *id == order.id) else {
            return false;
        };
        self.orders.remove(position);
        self.total_volume -= order.amount;
        order.level = None;
        true
    }

    /// Matches `incoming` against the queued orders, oldest first.
    ///
    /// Stops once `incoming` is filled or the queue is exhausted. Every pairing produces one
    /// [`Match`] at this level's price. Resting orders that reach zero are only taken off the
    /// queue after the walk, so the queue is never mutated while it is being iterated.
    ///
    /// # Arguments
    /// * `incoming` - The order taking liquidity
    /// * `arena` - The book's order storage holding every queued order
    ///
    /// # Returns
    /// The matches produced, in FIFO order of the resting orders consumed.
    pub fn fill(&mut self, incoming: &mut Order, arena: &mut HashMap<OrderId, Order>) -> Vec<Match> {
        let mut matches = Vec::new();
        let mut pending_removal = Vec::new();

        for id in self.orders.iter() {
            if incoming.is_filled() {
                break;
            }
            let Some(resting) = arena.get_mut(id) else {
                debug_assert!(false, "order {id} queued at {} but missing from the book", self.price);
                continue;
            };

            let quantity = resting.amount.min(incoming.amount);
            resting.consume(quantity);
            incoming.consume(quantity);
            self.total_volume -= quantity;

            trace!(
                "Filled {} @ {} (resting {}, incoming {})",
                quantity, self.price, resting.id, incoming.id
            );
            matches.push(Match::between(resting, incoming, quantity, self.price));

            if resting.is_filled() {
                pending_removal.push(*id);
            }
        }

        for id in pending_removal {
            if let Some(resting) = arena.get_mut(&id) {
                self.remove(resting);
            }
        }

        matches
    }

    /// Recomputes the aggregate volume from the arena and compares it with the running total.
    pub(crate) fn volume_is_consistent(&self, arena: &HashMap<OrderId, Order>) -> bool {
        let sum: Decimal = self
            .orders
            .iter()
            .filter_map(|id| arena.get(id))
            .map(|order| order.amount)
            .sum();
        sum == self.total_volume
    }
}

//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module implements the limit order book of a single market. Resting orders are kept in
// price levels on each side, and market orders are matched against them in price-time priority.
//
// | Component     | Description                                                               |
// |---------------|---------------------------------------------------------------------------|
// | OrderBook     | Ask and bid levels plus the arena of every resting order                  |
// | Price index   | One BTreeMap per side, keyed by price, holding the PriceLevels            |
// | Order arena   | HashMap from OrderId to Order, spanning both sides                        |
//
//--------------------------------------------------------------------------------------------------
// FUNCTIONS
//--------------------------------------------------------------------------------------------------
// | Name                  | Description                               | Return Type                 |
// |-----------------------|-------------------------------------------|-----------------------------|
// | place_limit_order     | Rests an order at a price                 | OrderbookResult<()>         |
// | place_market_order    | Sweeps the opposing side                  | OrderbookResult<Vec<Match>> |
// | cancel_order          | Removes a resting order                   | OrderbookResult<Order>      |
// | best_ask / best_bid   | Best level per side                       | Option<&PriceLevel>         |
// | ask_volume/bid_volume | Aggregate resting volume per side         | Decimal                     |
// | spread                | Best ask minus best bid                   | Option<Decimal>             |
// | snapshot              | Copy of the full depth                    | BookSnapshot                |
//
//--------------------------------------------------------------------------------------------------
// TESTS
//--------------------------------------------------------------------------------------------------
// | Name                                  | Description                                          |
// |---------------------------------------|------------------------------------------------------|
// | test_empty_orderbook                  | Verifies initial empty state                         |
// | test_limit_orders_rest_without_crossing | Crossing limit prices never match                  |
// | test_price_time_priority              | Best price consumed before worse prices              |
// | test_fifo_within_level                | Arrival order decides fills inside one level         |
// | test_market_ask_sweeps_bids_descending| Incoming asks hit the highest bids first             |
// | test_insufficient_liquidity           | Oversized market orders leave the book unchanged     |
// | test_exact_liquidity                  | A market order equal to the side volume clears it    |
// | test_level_pruned_and_recreated       | Emptied levels vanish and come back fresh            |
// | test_cancel_order                     | Cancel removes order and prunes its level            |
// | test_snapshot                         | Snapshot ordering and totals                         |
//--------------------------------------------------------------------------------------------------

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use tracing::{debug, trace, warn};

use super::price_level::PriceLevel;
use super::snapshot::{BookSnapshot, LevelSnapshot, OrderView};
use super::{OrderbookError, OrderbookResult};
use crate::domain::models::types::{Market, Match, Order, OrderId, OrderStatus, Side};

/// The order book of one market.
#[derive(Debug, Clone)]
pub struct OrderBook {
    market: Market,
    /// Ask levels keyed by price; iterated ascending.
    asks: BTreeMap<Decimal, PriceLevel>,
    /// Bid levels keyed by price; iterated descending.
    bids: BTreeMap<Decimal, PriceLevel>,
    /// Every resting order, by id.
    orders: HashMap<OrderId, Order>,
}

impl OrderBook {
    pub fn new(market: Market) -> Self {
        Self {
            market,
            asks: BTreeMap::new(),
            bids: BTreeMap::new(),
            orders: HashMap::new(),
        }
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    /// Rests `order` at `price` on its own side.
    ///
    /// The order joins the tail of the level at that price, which is created if this is the
    /// first order there. The book is never crossed here: a bid priced through the best ask
    /// still just rests.
    ///
    /// # Arguments
    /// * `price` - The limit price, already validated as positive
    /// * `order` - The order to rest, not yet known to the book
    ///
    /// # Returns
    /// * `Ok(())` - The order is resting
    /// * `Err(OrderbookError::DuplicateOrder)` - An order with the same id already rests here
    /// * `Err(OrderbookError::VolumeOverflow)` - The side total would exceed `Decimal::MAX`
    pub fn place_limit_order(&mut self, price: Decimal, mut order: Order) -> OrderbookResult<()> {
        if self.orders.contains_key(&order.id) {
            return Err(OrderbookError::DuplicateOrder(order.id));
        }
        // A level total never exceeds its side total, so bounding the side bounds every sum.
        if self.side_volume(order.side).checked_add(order.amount).is_none() {
            warn!(
                "Rejected order {} on {}: {} {} @ {} overflows the side volume",
                order.id, self.market, order.side, order.amount, price
            );
            return Err(OrderbookError::VolumeOverflow {
                side: order.side,
                price,
                amount: order.amount,
            });
        }

        let levels = self.levels_mut(order.side);
        let level = levels.entry(price).or_insert_with(|| {
            trace!("New price level {} created", price);
            PriceLevel::new(price)
        });
        level.add(&mut order);
        order.status = OrderStatus::Resting;

        debug!(
            "Order {} resting: {} {} @ {} on {}",
            order.id, order.side, order.amount, price, self.market
        );
        self.orders.insert(order.id, order);

        if cfg!(debug_assertions) {
            self.assert_consistent();
        }
        Ok(())
    }

    /// Matches `order` against the opposing side until it is completely filled.
    ///
    /// Liquidity is checked up front, so an order larger than the opposing side is rejected
    /// with the book untouched. Levels are consumed best price first, each in FIFO order.
    /// Emptied levels are pruned and fully filled resting orders leave the arena.
    ///
    /// # Returns
    /// All matches, in the order they were executed.
    pub fn place_market_order(&mut self, order: &mut Order) -> OrderbookResult<Vec<Match>> {
        let available = self.side_volume(order.side.opposite());
        if order.amount > available {
            warn!(
                "Rejected {} market order {} on {}: requested {}, available {}",
                order.side, order.id, self.market, order.amount, available
            );
            return Err(OrderbookError::InsufficientLiquidity {
                side: order.side,
                requested: order.amount,
                available,
            });
        }

        let (matches, emptied) = match order.side {
            Side::Bid => sweep(self.asks.iter_mut(), order, &mut self.orders),
            Side::Ask => sweep(self.bids.iter_mut().rev(), order, &mut self.orders),
        };

        let levels = self.levels_mut(order.side.opposite());
        for price in &emptied {
            levels.remove(price);
        }
        for m in &matches {
            let resting = match order.side {
                Side::Bid => m.ask_order_id,
                Side::Ask => m.bid_order_id,
            };
            if self.orders.get(&resting).is_some_and(Order::is_filled) {
                self.orders.remove(&resting);
            }
        }

        debug!(
            "Market order {} on {} filled {} in {} matches, {} levels emptied",
            order.id,
            self.market,
            order.filled_amount(),
            matches.len(),
            emptied.len()
        );

        if cfg!(debug_assertions) {
            self.assert_consistent();
        }
        Ok(matches)
    }

    /// Removes a resting order from the book, pruning its level if it becomes empty.
    ///
    /// Returns the canceled order.
    pub fn cancel_order(&mut self, order_id: OrderId) -> OrderbookResult<Order> {
        let mut order = self
            .orders
            .remove(&order_id)
            .ok_or(OrderbookError::OrderNotFound(order_id))?;

        if let Some(price) = order.level {
            let levels = self.levels_mut(order.side);
            if let Some(level) = levels.get_mut(&price) {
                level.remove(&mut order);
                if level.is_empty() {
                    levels.remove(&price);
                    trace!("Price level {} pruned after cancel", price);
                }
            }
        }
        order.status = OrderStatus::Canceled;

        debug!("Order {} canceled on {}", order.id, self.market);

        if cfg!(debug_assertions) {
            self.assert_consistent();
        }
        Ok(order)
    }

    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    /// Lowest-priced ask level.
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.values().next()
    }

    /// Highest-priced bid level.
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.values().next_back()
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => Some(ask.price() - bid.price()),
            _ => None,
        }
    }

    pub fn ask_volume(&self) -> Decimal {
        self.side_volume(Side::Ask)
    }

    pub fn bid_volume(&self) -> Decimal {
        self.side_volume(Side::Bid)
    }

    /// Sum of level volumes on `side`. Cannot overflow: placement keeps it within range.
    fn side_volume(&self, side: Side) -> Decimal {
        let levels = match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        };
        levels.values().map(PriceLevel::total_volume).sum()
    }

    /// Ask levels, lowest price first.
    pub fn asks(&self) -> impl Iterator<Item = &PriceLevel> {
        self.asks.values()
    }

    /// Bid levels, highest price first.
    pub fn bids(&self) -> impl Iterator<Item = &PriceLevel> {
        self.bids.values().rev()
    }

    /// Orders queued at `level`, in FIFO priority.
    pub fn orders_at<'a>(&'a self, level: &'a PriceLevel) -> impl Iterator<Item = &'a Order> {
        level.order_ids().filter_map(|id| self.orders.get(id))
    }

    /// Number of resting orders across both sides.
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            market: self.market.clone(),
            asks: self.asks().map(|level| self.level_snapshot(level)).collect(),
            bids: self.bids().map(|level| self.level_snapshot(level)).collect(),
            total_ask_volume: self.ask_volume(),
            total_bid_volume: self.bid_volume(),
        }
    }

    fn level_snapshot(&self, level: &PriceLevel) -> LevelSnapshot {
        LevelSnapshot {
            price: level.price(),
            total_volume: level.total_volume(),
            orders: self
                .orders_at(level)
                .map(|order| OrderView::from_order(&self.market, order))
                .collect(),
        }
    }

    fn levels_mut(&mut self, side: Side) -> &mut BTreeMap<Decimal, PriceLevel> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    /// Panics if any level or order disagrees with the rest of the book.
    fn assert_consistent(&self) {
        let mut queued = 0;
        for (side, levels) in [(Side::Ask, &self.asks), (Side::Bid, &self.bids)] {
            for (price, level) in levels {
                assert!(!level.is_empty(), "empty {side} level retained at {price}");
                assert!(
                    level.volume_is_consistent(&self.orders),
                    "{side} level {price} volume {} does not match its orders",
                    level.total_volume()
                );
                for id in level.order_ids() {
                    let order = self.orders.get(id);
                    assert!(
                        order.is_some_and(|o| o.side == side && o.level == Some(*price) && !o.is_filled()),
                        "order {id} at {side} {price} is missing, filled or misplaced"
                    );
                }
                queued += level.order_count();
            }
        }
        assert_eq!(queued, self.orders.len(), "orders in the arena but not in any level");
    }
}

/// Fills `incoming` level by level in the iteration order of `levels`.
///
/// Returns the matches and the prices of the levels left empty.
fn sweep<'a>(
    levels: impl Iterator<Item = (&'a Decimal, &'a mut PriceLevel)>,
    incoming: &mut Order,
    arena: &mut HashMap<OrderId, Order>,
) -> (Vec<Match>, Vec<Decimal>) {
    let mut matches = Vec::new();
    let mut emptied = Vec::new();

    for (price, level) in levels {
        if incoming.is_filled() {
            break;
        }
        matches.extend(level.fill(incoming, arena));
        if level.is_empty() {
            emptied.push(*price);
        }
    }

    (matches, emptied)
}

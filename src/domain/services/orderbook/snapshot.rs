//! Read-only views of book contents, safe to hand out after the market lock is released.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::models::types::{Market, Order, OrderId, OrderStatus, Side, UserId};

/// Caller-facing copy of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderView {
    pub id: OrderId,
    pub user: UserId,
    pub market: Market,
    pub side: Side,
    /// Limit price, `None` for market orders or orders no longer resting.
    pub price: Option<Decimal>,
    /// Remaining amount.
    pub amount: Decimal,
    pub original_amount: Decimal,
    pub status: OrderStatus,
    pub timestamp: i64,
}

impl OrderView {
    pub fn from_order(market: &Market, order: &Order) -> Self {
        Self {
            id: order.id,
            user: order.user,
            market: market.clone(),
            side: order.side,
            price: order.level,
            amount: order.amount,
            original_amount: order.original_amount,
            status: order.status,
            timestamp: order.timestamp,
        }
    }
}

/// One price level as seen in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSnapshot {
    pub price: Decimal,
    pub total_volume: Decimal,
    /// Orders in FIFO priority.
    pub orders: Vec<OrderView>,
}

/// Full depth of one market's book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub market: Market,
    /// Ask levels, lowest price first.
    pub asks: Vec<LevelSnapshot>,
    /// Bid levels, highest price first.
    pub bids: Vec<LevelSnapshot>,
    pub total_ask_volume: Decimal,
    pub total_bid_volume: Decimal,
}

impl BookSnapshot {
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|level| level.price)
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|level| level.price)
    }
}

//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module defines the core data types used throughout the exchange, including orders,
// matches, trades and the identifiers that tie them to users and markets.
//
// | Section            | Description                                                      |
// |--------------------|------------------------------------------------------------------|
// | IDENTIFIERS        | OrderId, UserId and Market newtypes.                             |
// | ENUMS              | Discrete sets of values (Side, OrderType, OrderStatus).          |
// | STRUCTS            | Order, Match and Trade.                                          |
// | Potential Errors   | Errors related to parsing the types above.                       |
// | TESTS              | Unit tests for the defined types.                                |
//--------------------------------------------------------------------------------------------------

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

//--------------------------------------------------------------------------------------------------
//  IDENTIFIERS
//--------------------------------------------------------------------------------------------------
// | Name          | Description                                          |
// |---------------|------------------------------------------------------|
// | OrderId       | Process-unique order identity assigned by the engine. |
// | UserId        | Identity of the user owning an order.                |
// | Market        | Symbol of a traded market (e.g. "ETH").              |
//--------------------------------------------------------------------------------------------------

/// Process-unique identifier of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the user that owns an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Symbol of a traded market. Symbols are normalized to upper case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Market(String);

impl Market {
    pub fn new(symbol: &str) -> Self {
        Self(symbol.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Market {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TypeError::InvalidMarket(s.to_string()));
        }
        Ok(Self::new(trimmed))
    }
}

//--------------------------------------------------------------------------------------------------
//  ENUMS
//--------------------------------------------------------------------------------------------------
// | Name          | Description                                         |
// |---------------|-----------------------------------------------------|
// | Side          | Represents the side of an order (Bid/Ask).          |
// | OrderType     | Market or Limit.                                    |
// | OrderStatus   | Lifecycle state of an order.                        |
//--------------------------------------------------------------------------------------------------

/// Represents the side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// A buy order.
    Bid,
    /// A sell order.
    Ask,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Bid => Self::Ask,
            Self::Ask => Self::Bid,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bid => f.write_str("BID"),
            Self::Ask => f.write_str("ASK"),
        }
    }
}

impl FromStr for Side {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bid" | "buy" => Ok(Self::Bid),
            "ask" | "sell" => Ok(Self::Ask),
            _ => Err(TypeError::InvalidSide(s.to_string())),
        }
    }
}

/// Represents the type of an order, which decides how it enters the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Rests at a given price until matched or canceled.
    Limit,
    /// Executes immediately and in full against resting liquidity.
    Market,
}

impl FromStr for OrderType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LIMIT" => Ok(Self::Limit),
            "MARKET" => Ok(Self::Market),
            _ => Err(TypeError::InvalidOrderType(s.to_string())),
        }
    }
}

/// Lifecycle status of an order.
///
/// `Open` only exists while an order is being processed; callers observe one of the
/// other states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Created, not yet resting or matched.
    Open,
    /// Resting in a price level with nothing filled yet.
    Resting,
    /// Some of the amount has been matched.
    PartiallyFilled,
    /// Fully matched. Terminal.
    Filled,
    /// Canceled on request. Terminal.
    Canceled,
}

//--------------------------------------------------------------------------------------------------
//  STRUCTS
//--------------------------------------------------------------------------------------------------
// | Name          | Description                                                  |
// |---------------|--------------------------------------------------------------|
// | Order         | A unit of trading intent, mutated as it gets matched.        |
// | Match         | One resting-vs-incoming pairing produced by a fill.          |
// | Trade         | A match recorded in a market's trade history.                |
//--------------------------------------------------------------------------------------------------

/// Represents a trading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Engine-assigned identity.
    pub id: OrderId,
    /// Owner of the order.
    pub user: UserId,
    /// Side of the order.
    pub side: Side,
    /// Remaining amount available to match.
    pub amount: Decimal,
    /// Amount requested at submission.
    pub original_amount: Decimal,
    /// Price of the level currently holding the order, `None` when not resting.
    pub level: Option<Decimal>,
    /// Monotonic submission time in nanoseconds, used for tie-breaking only.
    pub timestamp: i64,
    /// Current lifecycle status.
    pub status: OrderStatus,
}

impl Order {
    pub fn new(id: OrderId, user: UserId, side: Side, amount: Decimal, timestamp: i64) -> Self {
        Self {
            id,
            user,
            side,
            amount,
            original_amount: amount,
            level: None,
            timestamp,
            status: OrderStatus::Open,
        }
    }

    #[inline]
    pub fn is_filled(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn filled_amount(&self) -> Decimal {
        self.original_amount - self.amount
    }

    /// Takes `quantity` off the remaining amount and advances the status.
    ///
    /// Callers never pass more than the remaining amount.
    pub(crate) fn consume(&mut self, quantity: Decimal) {
        debug_assert!(quantity <= self.amount, "fill exceeds remaining amount of order {}", self.id);
        self.amount -= quantity;
        self.status = if self.amount.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
    }
}

/// One pairing of a resting order with an incoming order.
///
/// The execution price is always the resting level's price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub ask_order_id: OrderId,
    pub ask_owner: UserId,
    pub bid_order_id: OrderId,
    pub bid_owner: UserId,
    pub amount_filled: Decimal,
    pub price: Decimal,
}

impl Match {
    /// Builds a match from the two orders involved, placing each on its own side.
    pub fn between(resting: &Order, incoming: &Order, amount_filled: Decimal, price: Decimal) -> Self {
        let (ask, bid) = match resting.side {
            Side::Ask => (resting, incoming),
            Side::Bid => (incoming, resting),
        };
        Self {
            ask_order_id: ask.id,
            ask_owner: ask.user,
            bid_order_id: bid.id,
            bid_owner: bid.user,
            amount_filled,
            price,
        }
    }
}

/// Represents an executed match kept in a market's trade history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Unique identifier for the trade.
    pub id: Uuid,
    /// Market the trade happened on.
    pub market: Market,
    /// Side of the incoming (taker) order.
    pub taker_side: Side,
    pub ask_order_id: OrderId,
    pub bid_order_id: OrderId,
    pub amount: Decimal,
    pub price: Decimal,
    /// Timestamp when the trade occurred.
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    pub fn from_match(market: &Market, taker_side: Side, m: &Match) -> Self {
        Self {
            id: Uuid::new_v4(),
            market: market.clone(),
            taker_side,
            ask_order_id: m.ask_order_id,
            bid_order_id: m.bid_order_id,
            amount: m.amount_filled,
            price: m.price,
            executed_at: Utc::now(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
//  Potential Errors
//--------------------------------------------------------------------------------------------------

/// Errors raised when parsing the types of this module from text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("Invalid side specified: {0}")]
    InvalidSide(String),

    #[error("Invalid order type specified: {0}")]
    InvalidOrderType(String),

    #[error("Invalid market symbol: {0:?}")]
    InvalidMarket(String),
}

//--------------------------------------------------------------------------------------------------
//  TESTS
//--------------------------------------------------------------------------------------------------
// | Name                          | Description                                          |
// |-------------------------------|------------------------------------------------------|
// | test_order_creation           | New orders start open with nothing filled.           |
// | test_consume_transitions      | Consuming advances PartiallyFilled then Filled.      |
// | test_match_sides              | Match records ask and bid by side, not by role.      |
// | test_parsing                  | FromStr for Side, OrderType and Market.              |
//--------------------------------------------------------------------------------------------------

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::models::types::{OrderId, Side};

pub mod orderbook;
pub mod price_level;
pub mod snapshot;

/// Errors that can occur within the orderbook service.
///
/// None of these leave the book partially mutated: every check runs before the first
/// state change of the operation that reports it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderbookError {
    /// Order not found in the orderbook
    #[error("Order {0} not found in the orderbook")]
    OrderNotFound(OrderId),

    /// An order with this id already rests in the book
    #[error("Order {0} is already in the orderbook")]
    DuplicateOrder(OrderId),

    /// Resting the order would push the side's total volume past `Decimal::MAX`
    #[error("{side} order of {amount} @ {price} would overflow the book volume")]
    VolumeOverflow {
        side: Side,
        price: Decimal,
        amount: Decimal,
    },

    /// A market order asked for more than the opposing side holds
    #[error("Insufficient liquidity for {side} market order: requested {requested}, available {available}")]
    InsufficientLiquidity {
        side: Side,
        requested: Decimal,
        available: Decimal,
    },
}

pub type OrderbookResult<T> = Result<T, OrderbookError>;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::models::types::{Market, Match, OrderId, OrderStatus, OrderType, Side, UserId};
use crate::domain::services::orderbook::OrderbookError;
use crate::domain::services::settlement::SettlementError;

pub mod exchange;
mod user_index;

pub use exchange::Exchange;

/// Errors surfaced by the exchange coordinator.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("Unknown market: {0}")]
    UnknownMarket(Market),

    #[error("Invalid amount {0}: must be greater than zero")]
    InvalidAmount(Decimal),

    #[error("Limit orders require a price")]
    MissingPrice,

    #[error("Market orders must not carry a price")]
    UnexpectedPrice,

    #[error("Invalid price {0}: must be greater than zero")]
    InvalidPrice(Decimal),

    #[error("Order {0} not found")]
    OrderNotFound(OrderId),

    #[error("No {side} liquidity on {market}")]
    NoLiquidity { market: Market, side: Side },

    #[error(transparent)]
    Orderbook(#[from] OrderbookError),

    /// The book was already updated when settlement failed; `matches` are final.
    #[error("Settlement failed for order {order_id} after {} matches: {source}", .matches.len())]
    Settlement {
        order_id: OrderId,
        matches: Vec<Match>,
        source: SettlementError,
    },
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// A request to place an order on one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub user: UserId,
    pub market: Market,
    pub side: Side,
    pub kind: OrderType,
    pub amount: Decimal,
    /// Required for limit orders, forbidden for market orders.
    pub price: Option<Decimal>,
}

impl OrderRequest {
    pub fn limit(user: UserId, market: Market, side: Side, price: Decimal, amount: Decimal) -> Self {
        Self {
            user,
            market,
            side,
            kind: OrderType::Limit,
            amount,
            price: Some(price),
        }
    }

    pub fn market(user: UserId, market: Market, side: Side, amount: Decimal) -> Self {
        Self {
            user,
            market,
            side,
            kind: OrderType::Market,
            amount,
            price: None,
        }
    }

    /// Checks the request in isolation and returns the limit price, if any.
    pub(crate) fn validate(&self) -> ExchangeResult<Option<Decimal>> {
        if self.amount <= Decimal::ZERO {
            return Err(ExchangeError::InvalidAmount(self.amount));
        }
        match (self.kind, self.price) {
            (OrderType::Limit, None) => Err(ExchangeError::MissingPrice),
            (OrderType::Limit, Some(price)) if price <= Decimal::ZERO => Err(ExchangeError::InvalidPrice(price)),
            (OrderType::Limit, Some(price)) => Ok(Some(price)),
            (OrderType::Market, Some(_)) => Err(ExchangeError::UnexpectedPrice),
            (OrderType::Market, None) => Ok(None),
        }
    }
}

/// Result of an accepted submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub order_id: OrderId,
    /// `Resting` for limit orders, `Filled` for market orders.
    pub status: OrderStatus,
    pub matches: Vec<Match>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn eth() -> Market {
        Market::new("ETH")
    }

    #[test]
    fn test_validate_limit() {
        let ok = OrderRequest::limit(UserId(1), eth(), Side::Bid, dec!(100), dec!(1));
        assert_eq!(ok.validate().unwrap(), Some(dec!(100)));

        let mut no_price = ok.clone();
        no_price.price = None;
        assert!(matches!(no_price.validate(), Err(ExchangeError::MissingPrice)));

        let zero_price = OrderRequest::limit(UserId(1), eth(), Side::Bid, dec!(0), dec!(1));
        assert!(matches!(zero_price.validate(), Err(ExchangeError::InvalidPrice(_))));
    }

    #[test]
    fn test_validate_market() {
        let ok = OrderRequest::market(UserId(1), eth(), Side::Ask, dec!(2));
        assert_eq!(ok.validate().unwrap(), None);

        let mut priced = ok.clone();
        priced.price = Some(dec!(10));
        assert!(matches!(priced.validate(), Err(ExchangeError::UnexpectedPrice)));

        let negative = OrderRequest::market(UserId(1), eth(), Side::Ask, dec!(-1));
        assert!(matches!(negative.validate(), Err(ExchangeError::InvalidAmount(_))));
        let zero = OrderRequest::market(UserId(1), eth(), Side::Ask, dec!(0));
        assert!(matches!(zero.validate(), Err(ExchangeError::InvalidAmount(_))));
    }
}

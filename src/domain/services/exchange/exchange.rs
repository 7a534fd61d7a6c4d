//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// The exchange coordinates one order book per market. It validates requests, assigns order
// identities, serializes every mutation of a market behind that market's lock, keeps the user
// ownership index and trade history current, and hands executed matches to settlement.
//
// | Lock                    | Kind                       | Guards                              |
// |-------------------------|----------------------------|-------------------------------------|
// | per market              | tokio::sync::RwLock        | OrderBook and trade history         |
// | user index              | parking_lot::RwLock        | user -> orders, order -> market     |
//
// The market lock is always taken first. The user index lock is only held for short
// synchronous sections and never across an await.
//
//--------------------------------------------------------------------------------------------------
// STRUCTS
//--------------------------------------------------------------------------------------------------
// | Name          | Description                                        | Key Methods              |
// |---------------|----------------------------------------------------|--------------------------|
// | Exchange      | Multi-market coordinator                           | submit_order             |
// |               |                                                    | cancel_order             |
// |               |                                                    | query_book               |
// |               |                                                    | query_user_orders        |
// |               |                                                    | best_ask / best_bid      |
// |               |                                                    | query_trades             |
// | MarketState   | Book and trade history of one market               |                          |
//--------------------------------------------------------------------------------------------------

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use super::user_index::UserIndex;
use super::{ExchangeError, ExchangeResult, OrderRequest, SubmitOutcome};
use crate::config::Config;
use crate::domain::models::sequence::{MonotonicClock, OrderIdGenerator};
use crate::domain::models::types::{Market, Match, Order, OrderId, OrderStatus, Side, Trade, UserId};
use crate::domain::services::orderbook::OrderbookError;
use crate::domain::services::orderbook::orderbook::OrderBook;
use crate::domain::services::orderbook::snapshot::{BookSnapshot, OrderView};
use crate::domain::services::settlement::{SettlementService, Transfer};

#[derive(Debug)]
struct MarketState {
    book: OrderBook,
    trades: Vec<Trade>,
}

/// Multi-market limit order exchange.
pub struct Exchange {
    /// Map of market symbol to its book, fixed at construction
    markets: HashMap<Market, Arc<RwLock<MarketState>>>,
    users: parking_lot::RwLock<UserIndex>,
    ids: OrderIdGenerator,
    clock: MonotonicClock,
    settlement: Arc<dyn SettlementService>,
}

impl Exchange {
    /// Creates an exchange with an empty book for each of `markets`.
    pub fn new(markets: impl IntoIterator<Item = Market>, settlement: Arc<dyn SettlementService>) -> Self {
        let markets: HashMap<_, _> = markets
            .into_iter()
            .map(|market| {
                info!("Initializing order book for market {}", market);
                let state = MarketState {
                    book: OrderBook::new(market.clone()),
                    trades: Vec::new(),
                };
                (market, Arc::new(RwLock::new(state)))
            })
            .collect();

        Self {
            markets,
            users: parking_lot::RwLock::new(UserIndex::default()),
            ids: OrderIdGenerator::default(),
            clock: MonotonicClock::new(),
            settlement,
        }
    }

    pub fn from_config(config: &Config, settlement: Arc<dyn SettlementService>) -> Self {
        Self::new(config.markets.iter().cloned(), settlement)
    }

    /// Configured markets in symbol order.
    pub fn markets(&self) -> Vec<Market> {
        let mut markets: Vec<_> = self.markets.keys().cloned().collect();
        markets.sort();
        markets
    }

    fn market_state(&self, market: &Market) -> ExchangeResult<&Arc<RwLock<MarketState>>> {
        self.markets
            .get(market)
            .ok_or_else(|| ExchangeError::UnknownMarket(market.clone()))
    }

    /// Validates and executes an order request.
    ///
    /// Limit orders rest in the book without matching. Market orders execute in full against
    /// the opposing side or are rejected with the book unchanged. When matches were produced
    /// they are settled before the market is released; a settlement failure is reported as
    /// [`ExchangeError::Settlement`] and the executed matches are not undone.
    ///
    /// # Arguments
    /// * `request` - The order to place
    ///
    /// # Returns
    /// * `Ok(SubmitOutcome)` - The assigned order id, its status and any matches
    /// * `Err(ExchangeError)` - Validation, liquidity or settlement failure
    pub async fn submit_order(&self, request: OrderRequest) -> ExchangeResult<SubmitOutcome> {
        let handle = self.market_state(&request.market)?;
        let limit_price = request.validate()?;

        let mut state = handle.write().await;
        let mut order = Order::new(
            self.ids.next_id(),
            request.user,
            request.side,
            request.amount,
            self.clock.now_nanos(),
        );
        let order_id = order.id;

        if let Some(price) = limit_price {
            state.book.place_limit_order(price, order)?;
            self.users.write().insert(order_id, request.market.clone(), request.user);
            info!(
                "Order {} accepted: {} {} {} @ {} for user {}",
                order_id, request.market, request.side, request.amount, price, request.user
            );
            return Ok(SubmitOutcome {
                order_id,
                status: OrderStatus::Resting,
                matches: Vec::new(),
            });
        }

        let matches = state.book.place_market_order(&mut order)?;
        let trades: Vec<Trade> = matches
            .iter()
            .map(|m| Trade::from_match(&request.market, order.side, m))
            .collect();
        state.trades.extend(trades);

        {
            let mut users = self.users.write();
            for m in &matches {
                let resting = match order.side {
                    Side::Bid => m.ask_order_id,
                    Side::Ask => m.bid_order_id,
                };
                if state.book.order(resting).is_none() {
                    users.remove(resting);
                }
            }
        }

        info!(
            "Market order {} on {} for user {} executed {} in {} matches",
            order_id,
            request.market,
            request.user,
            order.filled_amount(),
            matches.len()
        );

        self.settle(&request.market, order_id, &matches).await?;

        Ok(SubmitOutcome {
            order_id,
            status: order.status,
            matches,
        })
    }

    /// Hands the transfers of `matches` to settlement. Called with the market lock held.
    async fn settle(&self, market: &Market, order_id: OrderId, matches: &[Match]) -> ExchangeResult<()> {
        if matches.is_empty() {
            return Ok(());
        }
        let transfers: Vec<Transfer> = matches.iter().map(Transfer::from).collect();
        match self.settlement.settle(market.clone(), transfers).await {
            Ok(()) => {
                debug!("Settled {} matches of order {} on {}", matches.len(), order_id, market);
                Ok(())
            }
            Err(source) => {
                error!(
                    "Settlement failed for order {} on {} after {} matches, book not rolled back: {}",
                    order_id,
                    market,
                    matches.len(),
                    source
                );
                Err(ExchangeError::Settlement {
                    order_id,
                    matches: matches.to_vec(),
                    source,
                })
            }
        }
    }

    /// Cancels a resting order.
    ///
    /// Canceling an order that is unknown, filled or already canceled fails with
    /// [`ExchangeError::OrderNotFound`] and changes nothing.
    pub async fn cancel_order(&self, order_id: OrderId) -> ExchangeResult<OrderView> {
        let market = self
            .users
            .read()
            .market_of(order_id)
            .cloned()
            .ok_or(ExchangeError::OrderNotFound(order_id))?;
        let handle = self.market_state(&market)?;

        let mut state = handle.write().await;
        let price = state.book.order(order_id).and_then(|order| order.level);
        let order = state.book.cancel_order(order_id).map_err(|e| match e {
            OrderbookError::OrderNotFound(id) => ExchangeError::OrderNotFound(id),
            other => other.into(),
        })?;
        self.users.write().remove(order_id);

        info!("Order {} canceled on {} for user {}", order_id, market, order.user);
        let mut view = OrderView::from_order(&market, &order);
        view.price = price;
        Ok(view)
    }

    /// Full depth of a market's book.
    pub async fn query_book(&self, market: &Market) -> ExchangeResult<BookSnapshot> {
        let state = self.market_state(market)?.read().await;
        Ok(state.book.snapshot())
    }

    /// Live orders of `user` across all markets, sorted by order id.
    pub async fn query_user_orders(&self, user: UserId) -> Vec<OrderView> {
        let owned = self.users.read().orders_of(user);
        let mut by_market: BTreeMap<Market, Vec<OrderId>> = BTreeMap::new();
        for (order_id, market) in owned {
            by_market.entry(market).or_default().push(order_id);
        }

        let mut views = Vec::new();
        for (market, ids) in by_market {
            let Some(handle) = self.markets.get(&market) else {
                continue;
            };
            let state = handle.read().await;
            views.extend(
                ids.into_iter()
                    .filter_map(|id| state.book.order(id))
                    .map(|order| OrderView::from_order(&market, order)),
            );
        }
        views.sort_by_key(|view| view.id);
        views
    }

    pub async fn best_ask(&self, market: &Market) -> ExchangeResult<Decimal> {
        let state = self.market_state(market)?.read().await;
        state
            .book
            .best_ask()
            .map(|level| level.price())
            .ok_or_else(|| ExchangeError::NoLiquidity {
                market: market.clone(),
                side: Side::Ask,
            })
    }

    pub async fn best_bid(&self, market: &Market) -> ExchangeResult<Decimal> {
        let state = self.market_state(market)?.read().await;
        state
            .book
            .best_bid()
            .map(|level| level.price())
            .ok_or_else(|| ExchangeError::NoLiquidity {
                market: market.clone(),
                side: Side::Bid,
            })
    }

    /// Trades executed on `market`, oldest first.
    pub async fn query_trades(&self, market: &Market) -> ExchangeResult<Vec<Trade>> {
        let state = self.market_state(market)?.read().await;
        Ok(state.trades.clone())
    }

    /// Number of resting orders tracked across all markets.
    pub fn open_orders(&self) -> usize {
        self.users.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::settlement::LoggingSettlement;
    use rust_decimal_macros::dec;

    fn exchange() -> Exchange {
        Exchange::new(
            [Market::new("ETH"), Market::new("BTC")],
            Arc::new(LoggingSettlement::new()),
        )
    }

    fn eth() -> Market {
        Market::new("ETH")
    }

    #[tokio::test]
    async fn test_markets_sorted() {
        assert_eq!(exchange().markets(), vec![Market::new("BTC"), Market::new("ETH")]);
    }

    #[tokio::test]
    async fn test_limit_then_market() {
        let exchange = exchange();
        let ask = exchange
            .submit_order(OrderRequest::limit(UserId(1), eth(), Side::Ask, dec!(100), dec!(4)))
            .await
            .unwrap();
        assert_eq!(ask.status, OrderStatus::Resting);
        assert!(ask.matches.is_empty());

        let bid = exchange
            .submit_order(OrderRequest::market(UserId(2), eth(), Side::Bid, dec!(4)))
            .await
            .unwrap();
        assert_eq!(bid.status, OrderStatus::Filled);
        assert_eq!(bid.matches.len(), 1);
        assert_eq!(bid.matches[0].ask_order_id, ask.order_id);
        assert_eq!(bid.matches[0].bid_order_id, bid.order_id);

        assert!(exchange.query_user_orders(UserId(1)).await.is_empty());
        assert_eq!(exchange.open_orders(), 0);
        let trades = exchange.query_trades(&eth()).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].taker_side, Side::Bid);
    }

    #[tokio::test]
    async fn test_unknown_market() {
        let exchange = exchange();
        let err = exchange
            .submit_order(OrderRequest::market(UserId(1), Market::new("DOGE"), Side::Bid, dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::UnknownMarket(m) if m.as_str() == "DOGE"));
        assert!(matches!(
            exchange.query_book(&Market::new("DOGE")).await,
            Err(ExchangeError::UnknownMarket(_))
        ));
    }

    #[tokio::test]
    async fn test_best_prices_and_no_liquidity() {
        let exchange = exchange();
        assert!(matches!(
            exchange.best_ask(&eth()).await,
            Err(ExchangeError::NoLiquidity { side: Side::Ask, .. })
        ));

        exchange
            .submit_order(OrderRequest::limit(UserId(1), eth(), Side::Ask, dec!(101), dec!(1)))
            .await
            .unwrap();
        exchange
            .submit_order(OrderRequest::limit(UserId(1), eth(), Side::Bid, dec!(99), dec!(1)))
            .await
            .unwrap();

        assert_eq!(exchange.best_ask(&eth()).await.unwrap(), dec!(101));
        assert_eq!(exchange.best_bid(&eth()).await.unwrap(), dec!(99));
    }

    #[tokio::test]
    async fn test_cancel_keeps_price_in_view() {
        let exchange = exchange();
        let placed = exchange
            .submit_order(OrderRequest::limit(UserId(5), eth(), Side::Bid, dec!(50), dec!(2)))
            .await
            .unwrap();

        let view = exchange.cancel_order(placed.order_id).await.unwrap();
        assert_eq!(view.status, OrderStatus::Canceled);
        assert_eq!(view.price, Some(dec!(50)));
        assert_eq!(view.user, UserId(5));
    }
}

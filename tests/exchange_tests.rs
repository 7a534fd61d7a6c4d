//--------------------------------------------------------------------------------------------------
// TEST MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Integration tests for the exchange coordinator: matching through the public async API,
// settlement hand-off and failure, cancellation, user queries and concurrent access.
//--------------------------------------------------------------------------------------------------

use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;
use mockall::predicate::eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use limit_exchange::{
    Exchange, ExchangeError, LedgerSettlement, LoggingSettlement, Market, OrderId, OrderRequest,
    OrderStatus, OrderbookError, SettlementError, SettlementService, Side, Transfer, UserId,
};

mock! {
    pub Settlement {}

    #[async_trait]
    impl SettlementService for Settlement {
        async fn settle(&self, market: Market, transfers: Vec<Transfer>) -> Result<(), SettlementError>;
    }
}

fn eth() -> Market {
    Market::new("ETH")
}

fn btc() -> Market {
    Market::new("BTC")
}

fn logging_exchange() -> Exchange {
    Exchange::new([eth(), btc()], Arc::new(LoggingSettlement::new()))
}

async fn rest(exchange: &Exchange, user: u64, side: Side, price: Decimal, amount: Decimal) -> OrderId {
    exchange
        .submit_order(OrderRequest::limit(UserId(user), eth(), side, price, amount))
        .await
        .unwrap()
        .order_id
}

#[tokio::test]
async fn test_price_time_priority_through_exchange() {
    let exchange = logging_exchange();
    let worse = rest(&exchange, 1, Side::Ask, dec!(120), dec!(5)).await;
    let better = rest(&exchange, 2, Side::Ask, dec!(100), dec!(8)).await;

    let outcome = exchange
        .submit_order(OrderRequest::market(UserId(3), eth(), Side::Bid, dec!(10)))
        .await
        .unwrap();

    let fills: Vec<_> = outcome
        .matches
        .iter()
        .map(|m| (m.ask_order_id, m.amount_filled, m.price))
        .collect();
    assert_eq!(fills, vec![(better, dec!(8), dec!(100)), (worse, dec!(2), dec!(120))]);
    assert_eq!(outcome.status, OrderStatus::Filled);

    let book = exchange.query_book(&eth()).await.unwrap();
    assert_eq!(book.asks.len(), 1);
    assert_eq!(book.asks[0].price, dec!(120));
    assert_eq!(book.total_ask_volume, dec!(3));
}

#[tokio::test]
async fn test_volume_conservation_and_trade_history() {
    let exchange = logging_exchange();
    for (i, price) in [dec!(101), dec!(102), dec!(103)].into_iter().enumerate() {
        rest(&exchange, i as u64 + 1, Side::Ask, price, dec!(2.5)).await;
    }
    let before = exchange.query_book(&eth()).await.unwrap().total_ask_volume;

    let outcome = exchange
        .submit_order(OrderRequest::market(UserId(9), eth(), Side::Bid, dec!(6)))
        .await
        .unwrap();

    let filled: Decimal = outcome.matches.iter().map(|m| m.amount_filled).sum();
    assert_eq!(filled, dec!(6));
    let after = exchange.query_book(&eth()).await.unwrap().total_ask_volume;
    assert_eq!(before - after, filled);

    let trades = exchange.query_trades(&eth()).await.unwrap();
    assert_eq!(trades.len(), outcome.matches.len());
    assert!(trades.iter().all(|t| t.market == eth() && t.taker_side == Side::Bid));
    assert!(exchange.query_trades(&btc()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_insufficient_liquidity_leaves_book_unchanged() {
    let mut settlement = MockSettlement::new();
    settlement.expect_settle().never();
    let exchange = Exchange::new([eth()], Arc::new(settlement));

    exchange
        .submit_order(OrderRequest::limit(UserId(1), eth(), Side::Bid, dec!(90), dec!(3)))
        .await
        .unwrap();
    let before = exchange.query_book(&eth()).await.unwrap();

    let err = exchange
        .submit_order(OrderRequest::market(UserId(2), eth(), Side::Ask, dec!(3.01)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExchangeError::Orderbook(OrderbookError::InsufficientLiquidity { side: Side::Ask, available, .. })
            if available == dec!(3)
    ));
    assert_eq!(exchange.query_book(&eth()).await.unwrap(), before);
    assert!(exchange.query_trades(&eth()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_settlement_receives_every_transfer_once() {
    let mut settlement = MockSettlement::new();
    settlement
        .expect_settle()
        .with(
            eq(eth()),
            eq(vec![
                Transfer { ask_owner: UserId(1), bid_owner: UserId(3), amount: dec!(1), price: dec!(10) },
                Transfer { ask_owner: UserId(2), bid_owner: UserId(3), amount: dec!(0.5), price: dec!(11) },
            ]),
        )
        .times(1)
        .returning(|_, _| Ok(()));
    let exchange = Exchange::new([eth()], Arc::new(settlement));

    rest(&exchange, 1, Side::Ask, dec!(10), dec!(1)).await;
    rest(&exchange, 2, Side::Ask, dec!(11), dec!(1)).await;

    exchange
        .submit_order(OrderRequest::market(UserId(3), eth(), Side::Bid, dec!(1.5)))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_settlement_failure_is_surfaced_without_rollback() {
    let mut settlement = MockSettlement::new();
    settlement
        .expect_settle()
        .times(1)
        .returning(|_, _| Err(SettlementError::Rejected("node unavailable".to_string())));
    let exchange = Exchange::new([eth()], Arc::new(settlement));

    let resting = rest(&exchange, 1, Side::Bid, dec!(50), dec!(4)).await;

    let err = exchange
        .submit_order(OrderRequest::market(UserId(2), eth(), Side::Ask, dec!(1)))
        .await
        .unwrap_err();

    match err {
        ExchangeError::Settlement { matches, source, .. } => {
            assert_eq!(matches.len(), 1);
            assert_eq!(matches[0].bid_order_id, resting);
            assert_eq!(source, SettlementError::Rejected("node unavailable".to_string()));
        }
        other => panic!("expected settlement error, got {other:?}"),
    }

    // The fill stands.
    let book = exchange.query_book(&eth()).await.unwrap();
    assert_eq!(book.total_bid_volume, dec!(3));
    assert_eq!(exchange.query_trades(&eth()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_limit_orders_do_not_settle() {
    let mut settlement = MockSettlement::new();
    settlement.expect_settle().never();
    let exchange = Exchange::new([eth()], Arc::new(settlement));

    rest(&exchange, 1, Side::Ask, dec!(100), dec!(1)).await;
    // Crossing limit prices rest without matching.
    rest(&exchange, 2, Side::Bid, dec!(150), dec!(1)).await;

    let book = exchange.query_book(&eth()).await.unwrap();
    assert_eq!(book.total_ask_volume, dec!(1));
    assert_eq!(book.total_bid_volume, dec!(1));
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let exchange = logging_exchange();
    let id = rest(&exchange, 1, Side::Ask, dec!(100), dec!(2)).await;
    let other = rest(&exchange, 2, Side::Ask, dec!(100), dec!(3)).await;
    let listed: Vec<_> = exchange.query_user_orders(UserId(1)).await.iter().map(|o| o.id).collect();
    assert_eq!(listed, vec![id]);

    let view = exchange.cancel_order(id).await.unwrap();
    assert_eq!(view.status, OrderStatus::Canceled);
    let after_first = exchange.query_book(&eth()).await.unwrap();
    assert_eq!(after_first.total_ask_volume, dec!(3));
    assert!(exchange.query_user_orders(UserId(1)).await.is_empty());

    assert!(matches!(
        exchange.cancel_order(id).await,
        Err(ExchangeError::OrderNotFound(missing)) if missing == id
    ));
    assert_eq!(exchange.query_book(&eth()).await.unwrap(), after_first);
    assert!(exchange.query_user_orders(UserId(1)).await.is_empty());
    let still_listed: Vec<_> = exchange.query_user_orders(UserId(2)).await.iter().map(|o| o.id).collect();
    assert_eq!(still_listed, vec![other]);
    assert!(matches!(
        exchange.cancel_order(OrderId(9_999)).await,
        Err(ExchangeError::OrderNotFound(_))
    ));
}

#[tokio::test]
async fn test_cancel_last_order_removes_level() {
    let exchange = logging_exchange();
    rest(&exchange, 1, Side::Ask, dec!(100), dec!(2)).await;
    let id = rest(&exchange, 2, Side::Ask, dec!(101), dec!(1)).await;

    exchange.cancel_order(id).await.unwrap();

    let book = exchange.query_book(&eth()).await.unwrap();
    let prices: Vec<_> = book.asks.iter().map(|l| l.price).collect();
    assert_eq!(prices, vec![dec!(100)]);
    assert_eq!(book.total_ask_volume, dec!(2));
    assert!(exchange.query_user_orders(UserId(2)).await.is_empty());
}

#[tokio::test]
async fn test_cancel_filled_order_not_found() {
    let exchange = logging_exchange();
    let id = rest(&exchange, 1, Side::Ask, dec!(100), dec!(2)).await;
    exchange
        .submit_order(OrderRequest::market(UserId(2), eth(), Side::Bid, dec!(2)))
        .await
        .unwrap();

    assert!(matches!(exchange.cancel_order(id).await, Err(ExchangeError::OrderNotFound(_))));
}

#[tokio::test]
async fn test_validation_rejects_before_any_change() {
    let exchange = logging_exchange();

    let mut missing_price = OrderRequest::limit(UserId(1), eth(), Side::Bid, dec!(1), dec!(1));
    missing_price.price = None;
    let mut priced_market = OrderRequest::market(UserId(1), eth(), Side::Bid, dec!(1));
    priced_market.price = Some(dec!(1));

    let cases = [
        (missing_price, "missing price"),
        (priced_market, "priced market order"),
        (OrderRequest::limit(UserId(1), eth(), Side::Bid, dec!(-5), dec!(1)), "negative price"),
        (OrderRequest::limit(UserId(1), eth(), Side::Bid, dec!(5), dec!(0)), "zero amount"),
        (OrderRequest::market(UserId(1), Market::new("XRP"), Side::Bid, dec!(1)), "unknown market"),
    ];
    for (request, label) in cases {
        assert!(exchange.submit_order(request).await.is_err(), "{label} accepted");
    }

    assert_eq!(exchange.open_orders(), 0);
    assert!(exchange.query_user_orders(UserId(1)).await.is_empty());
}

#[tokio::test]
async fn test_query_user_orders_across_markets() {
    let exchange = logging_exchange();
    let a = rest(&exchange, 7, Side::Bid, dec!(10), dec!(1)).await;
    let b = exchange
        .submit_order(OrderRequest::limit(UserId(7), btc(), Side::Ask, dec!(30_000), dec!(0.1)))
        .await
        .unwrap()
        .order_id;
    let c = rest(&exchange, 7, Side::Ask, dec!(12), dec!(2)).await;
    rest(&exchange, 8, Side::Ask, dec!(13), dec!(2)).await;

    // Partially fill c.
    exchange
        .submit_order(OrderRequest::market(UserId(9), eth(), Side::Bid, dec!(0.5)))
        .await
        .unwrap();

    let views = exchange.query_user_orders(UserId(7)).await;
    let ids: Vec<_> = views.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![a, b, c]);
    assert_eq!(views[1].market, btc());
    assert_eq!(views[2].amount, dec!(1.5));
    assert_eq!(views[2].status, OrderStatus::PartiallyFilled);
    assert_eq!(views[2].price, Some(dec!(12)));
}

#[tokio::test]
async fn test_ledger_settlement_end_to_end() {
    let ledger = Arc::new(LedgerSettlement::new("USD"));
    ledger.deposit(UserId(1), "ETH", dec!(5)).unwrap();
    ledger.deposit(UserId(2), "USD", dec!(1_000)).unwrap();
    let exchange = Exchange::new([eth()], ledger.clone());

    rest(&exchange, 1, Side::Ask, dec!(100), dec!(3)).await;
    exchange
        .submit_order(OrderRequest::market(UserId(2), eth(), Side::Bid, dec!(2)))
        .await
        .unwrap();

    assert_eq!(ledger.balance(UserId(1), "ETH"), Some(dec!(3)));
    assert_eq!(ledger.balance(UserId(1), "USD"), Some(dec!(200)));
    assert_eq!(ledger.balance(UserId(2), "ETH"), Some(dec!(2)));
    assert_eq!(ledger.balance(UserId(2), "USD"), Some(dec!(800)));

    // An unregistered taker still executes against the book but fails settlement.
    let err = exchange
        .submit_order(OrderRequest::market(UserId(42), eth(), Side::Bid, dec!(1)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExchangeError::Settlement { source: SettlementError::UnknownUser(UserId(42)), .. }
    ));
    assert_eq!(exchange.query_book(&eth()).await.unwrap().total_ask_volume, dec!(0));
}

#[tokio::test]
async fn test_volume_overflow_rejected_through_exchange() {
    let exchange = logging_exchange();
    let first = rest(&exchange, 1, Side::Ask, dec!(100), Decimal::MAX / dec!(2)).await;
    let before = exchange.query_book(&eth()).await.unwrap();

    let err = exchange
        .submit_order(OrderRequest::limit(UserId(2), eth(), Side::Ask, dec!(100), Decimal::MAX / dec!(2) + dec!(1)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExchangeError::Orderbook(OrderbookError::VolumeOverflow { side: Side::Ask, .. })
    ));
    assert_eq!(exchange.query_book(&eth()).await.unwrap(), before);
    assert!(exchange.query_user_orders(UserId(2)).await.is_empty());

    let outcome = exchange
        .submit_order(OrderRequest::market(UserId(3), eth(), Side::Bid, dec!(1)))
        .await
        .unwrap();
    assert_eq!(outcome.matches[0].ask_order_id, first);
}

#[tokio::test]
async fn test_oversized_notional_fails_settlement_without_panic() {
    let huge = Decimal::from(1_000_000_000_000_000u64);
    let ledger = Arc::new(LedgerSettlement::new("USD"));
    ledger.deposit(UserId(1), "ETH", huge).unwrap();
    ledger.deposit(UserId(2), "USD", dec!(1_000)).unwrap();
    let exchange = Exchange::new([eth()], ledger.clone());

    rest(&exchange, 1, Side::Ask, huge, huge).await;
    let err = exchange
        .submit_order(OrderRequest::market(UserId(2), eth(), Side::Bid, huge))
        .await
        .unwrap_err();
    match err {
        ExchangeError::Settlement { matches, source, .. } => {
            assert_eq!(matches.len(), 1);
            assert!(matches!(source, SettlementError::Overflow(_)));
        }
        other => panic!("expected settlement error, got {other:?}"),
    }

    // The fill stands, balances do not move.
    assert_eq!(exchange.query_book(&eth()).await.unwrap().total_ask_volume, dec!(0));
    assert_eq!(ledger.balance(UserId(1), "ETH"), Some(huge));
    assert_eq!(ledger.balance(UserId(2), "USD"), Some(dec!(1_000)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_conserve_volume() {
    let exchange = Arc::new(logging_exchange());
    for i in 0..100 {
        rest(&exchange, 1, Side::Ask, Decimal::from(100 + i % 10), dec!(2)).await;
    }

    let mut handles = Vec::new();
    for i in 0..50u64 {
        let takers = Arc::clone(&exchange);
        handles.push(tokio::spawn(async move {
            takers
                .submit_order(OrderRequest::market(UserId(100 + i), eth(), Side::Bid, dec!(2)))
                .await
        }));
        let makers = Arc::clone(&exchange);
        handles.push(tokio::spawn(async move {
            makers
                .submit_order(OrderRequest::limit(UserId(200 + i), eth(), Side::Ask, dec!(105), dec!(1)))
                .await
        }));
    }

    let mut filled = Decimal::ZERO;
    let mut ids = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        filled += outcome.matches.iter().map(|m| m.amount_filled).sum::<Decimal>();
        ids.push(outcome.order_id);
    }

    assert_eq!(filled, dec!(100));
    let book = exchange.query_book(&eth()).await.unwrap();
    assert_eq!(book.total_ask_volume, dec!(200) + dec!(50) - filled);
    let resting: Decimal = book.asks.iter().flat_map(|l| &l.orders).map(|o| o.amount).sum();
    assert_eq!(resting, book.total_ask_volume);

    let traded: Decimal = exchange
        .query_trades(&eth())
        .await
        .unwrap()
        .iter()
        .map(|t| t.amount)
        .sum();
    assert_eq!(traded, filled);

    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_markets_are_independent() {
    let exchange = Arc::new(logging_exchange());
    let mut handles = Vec::new();
    for (i, market) in [eth(), btc()].into_iter().cycle().take(40).enumerate() {
        let exchange = Arc::clone(&exchange);
        handles.push(tokio::spawn(async move {
            exchange
                .submit_order(OrderRequest::limit(UserId(i as u64), market, Side::Bid, dec!(10), dec!(1)))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(exchange.query_book(&eth()).await.unwrap().total_bid_volume, dec!(20));
    assert_eq!(exchange.query_book(&btc()).await.unwrap().total_bid_volume, dec!(20));
    assert_eq!(exchange.open_orders(), 40);
}

//--------------------------------------------------------------------------------------------------
// DEMO BINARY
//--------------------------------------------------------------------------------------------------
// Seeds an exchange with a ladder of resting limit orders from a maker, sweeps part of one
// side with a market order from a taker, then prints the book, the trades and the balances.
//
// | Step            | Description                                                        |
// |-----------------|--------------------------------------------------------------------|
// | configure       | Config from env (.env supported), market list overridable by flag  |
// | seed            | Ledger balances and a random ladder around --mid                   |
// | sweep           | One market order of --sweep on --side                              |
// | report          | JSON on stdout                                                     |
//--------------------------------------------------------------------------------------------------

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use rand::Rng;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use limit_exchange::config::parse_markets;
use limit_exchange::{Config, Exchange, LedgerSettlement, Market, OrderRequest, Side, UserId};

const MAKER: UserId = UserId(1);
const TAKER: UserId = UserId(2);

/// Command line arguments for the demo
#[derive(Parser, Debug)]
#[command(author, version, about = "In-memory limit order exchange demo")]
struct Args {
    /// Comma separated markets, overrides EXCHANGE_MARKETS
    #[arg(long)]
    markets: Option<String>,

    /// Market to trade on, defaults to the first configured market
    #[arg(short, long)]
    market: Option<String>,

    /// Price levels seeded on each side
    #[arg(short, long, default_value = "5")]
    levels: u32,

    /// Mid price the ladder is built around
    #[arg(long, default_value = "1000")]
    mid: Decimal,

    /// Amount of the market order
    #[arg(short, long, default_value = "4")]
    sweep: Decimal,

    /// Side of the market order (bid/buy or ask/sell)
    #[arg(long, default_value = "bid")]
    side: Side,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::try_from_env().context("failed to load configuration")?;
    if let Some(list) = &args.markets {
        config.markets = parse_markets(list)?;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .init();

    let market = match &args.market {
        Some(symbol) => symbol.parse::<Market>()?,
        None => config
            .markets
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("no markets configured"))?,
    };

    let ledger = Arc::new(LedgerSettlement::new(&config.quote_asset));
    let quote = ledger.quote_asset();
    for user in [MAKER, TAKER] {
        ledger.deposit(user, market.as_str(), Decimal::from(1_000_000))?;
        ledger.deposit(user, quote, Decimal::from(1_000_000_000))?;
    }

    let exchange = Exchange::from_config(&config, ledger.clone());
    info!("Exchange started with markets {:?}", exchange.markets());

    seed_ladder(&exchange, &market, args.mid, args.levels).await?;

    let outcome = exchange
        .submit_order(OrderRequest::market(TAKER, market.clone(), args.side, args.sweep))
        .await
        .context("market order failed")?;
    info!(
        "Market order {} executed in {} matches",
        outcome.order_id,
        outcome.matches.len()
    );

    let report = json!({
        "outcome": outcome,
        "book": exchange.query_book(&market).await?,
        "trades": exchange.query_trades(&market).await?,
        "balances": {
            "maker": {
                "base": ledger.balance(MAKER, market.as_str()),
                "quote": ledger.balance(MAKER, quote),
            },
            "taker": {
                "base": ledger.balance(TAKER, market.as_str()),
                "quote": ledger.balance(TAKER, quote),
            },
        },
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

/// Places `levels` asks above and `levels` bids below `mid`, one tick apart, with random sizes.
async fn seed_ladder(exchange: &Exchange, market: &Market, mid: Decimal, levels: u32) -> Result<()> {
    for i in 1..=levels {
        let offset = Decimal::from(i);
        for (side, price) in [(Side::Ask, mid.checked_add(offset)), (Side::Bid, mid.checked_sub(offset))] {
            let Some(price) = price.filter(|p| *p > Decimal::ZERO) else {
                continue;
            };
            let amount = Decimal::new(rand::thread_rng().gen_range(5..=50), 1);
            exchange
                .submit_order(OrderRequest::limit(MAKER, market.clone(), side, price, amount))
                .await?;
        }
    }
    Ok(())
}

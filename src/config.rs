use dotenv::dotenv;
use std::env;
use thiserror::Error;
use tracing::info;

use crate::domain::models::types::{Market, TypeError};
use crate::domain::services::settlement::ledger::DEFAULT_QUOTE_ASSET;

const MARKETS: &str = "EXCHANGE_MARKETS";
const LOG: &str = "EXCHANGE_LOG";
const QUOTE_ASSET: &str = "EXCHANGE_QUOTE_ASSET";

const DEFAULT_MARKETS: &str = "ETH,BTC";
const DEFAULT_LOG: &str = "info";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to parse {var}: {source}")]
    InvalidMarket { var: &'static str, source: TypeError },

    #[error("{0} must list at least one market")]
    NoMarkets(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub markets: Vec<Market>,
    /// `tracing_subscriber::EnvFilter` directive.
    pub log_filter: String,
    pub quote_asset: String,
}

impl Config {
    pub fn try_from_env() -> Result<Config, ConfigError> {
        // Load .env file
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let markets_str = lookup(MARKETS).unwrap_or_else(|| DEFAULT_MARKETS.to_string());
        let markets = parse_markets(&markets_str)?;
        info!("Parsed markets from env: {}", markets_str.trim());

        let log_filter = lookup(LOG).unwrap_or_else(|| DEFAULT_LOG.to_string());
        let quote_asset = lookup(QUOTE_ASSET)
            .map(|s| s.trim().to_uppercase())
            .unwrap_or_else(|| DEFAULT_QUOTE_ASSET.to_string());

        Ok(Config {
            markets,
            log_filter,
            quote_asset,
        })
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            markets: vec![Market::new("ETH"), Market::new("BTC")],
            log_filter: DEFAULT_LOG.to_string(),
            quote_asset: DEFAULT_QUOTE_ASSET.to_string(),
        }
    }
}

/// Parses a comma separated market list, dropping duplicates and empty entries.
pub fn parse_markets(list: &str) -> Result<Vec<Market>, ConfigError> {
    let mut markets: Vec<Market> = Vec::new();
    for symbol in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let market = symbol
            .parse::<Market>()
            .map_err(|source| ConfigError::InvalidMarket { var: MARKETS, source })?;
        if !markets.contains(&market) {
            markets.push(market);
        }
    }
    if markets.is_empty() {
        return Err(ConfigError::NoMarkets(MARKETS));
    }
    Ok(markets)
}

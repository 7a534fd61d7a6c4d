// Expose the modules
pub mod config;
pub mod domain;

// Re-export key types for easier usage
pub use config::{Config, ConfigError};
pub use domain::models::types::{Market, Match, Order, OrderId, OrderStatus, OrderType, Side, Trade, UserId};
pub use domain::services::exchange::{Exchange, ExchangeError, ExchangeResult, OrderRequest, SubmitOutcome};
pub use domain::services::orderbook::orderbook::OrderBook;
pub use domain::services::orderbook::price_level::PriceLevel;
pub use domain::services::orderbook::snapshot::{BookSnapshot, LevelSnapshot, OrderView};
pub use domain::services::orderbook::{OrderbookError, OrderbookResult};
pub use domain::services::settlement::{
    LedgerSettlement, LoggingSettlement, SettlementError, SettlementService, Transfer,
};

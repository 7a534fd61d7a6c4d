pub mod exchange;
pub mod orderbook;
pub mod settlement;

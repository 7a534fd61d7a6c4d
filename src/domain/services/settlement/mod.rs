//--------------------------------------------------------------------------------------------------
// STRUCTS & TRAITS
//--------------------------------------------------------------------------------------------------
// | Name                    | Description                                       | Key Methods       |
// |-------------------------|---------------------------------------------------|-------------------|
// | Transfer                | Value owed between two users for one match        | notional          |
// | SettlementService       | Trait for settling the transfers of an operation  | settle            |
// | LoggingSettlement       | Accepts every batch and logs it                   | batches_settled   |
// | LedgerSettlement        | In-memory balances, all-or-nothing per batch      | deposit, balance  |
//--------------------------------------------------------------------------------------------------

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::domain::models::types::{Market, Match, UserId};

pub mod ledger;

pub use ledger::LedgerSettlement;

/// What one match obliges its two owners to exchange.
///
/// The ask owner delivers `amount` of the market's asset and receives `amount * price`
/// of the quote asset; the bid owner does the opposite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub ask_owner: UserId,
    pub bid_owner: UserId,
    pub amount: Decimal,
    pub price: Decimal,
}

impl Transfer {
    /// Quote value of the transfer, rejected when it does not fit in a `Decimal`.
    pub fn notional(&self) -> Result<Decimal, SettlementError> {
        self.amount
            .checked_mul(self.price)
            .ok_or_else(|| SettlementError::Overflow(format!("notional of {} @ {}", self.amount, self.price)))
    }
}

impl From<&Match> for Transfer {
    fn from(m: &Match) -> Self {
        Self {
            ask_owner: m.ask_owner,
            bid_owner: m.bid_owner,
            amount: m.amount_filled,
            price: m.price,
        }
    }
}

/// Errors reported by a settlement collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("User {0} not found")]
    UnknownUser(UserId),

    #[error("User {user} holds {available} {asset} but must deliver {required}")]
    InsufficientFunds {
        user: UserId,
        asset: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("Settlement amount overflow: {0}")]
    Overflow(String),

    #[error("Settlement rejected: {0}")]
    Rejected(String),
}

/// Settles the value transfers produced by one matching operation.
///
/// Called at most once per operation, with every transfer of that operation, while the
/// market is still locked. Implementations must not call back into the exchange.
#[async_trait]
pub trait SettlementService: Send + Sync {
    async fn settle(&self, market: Market, transfers: Vec<Transfer>) -> Result<(), SettlementError>;
}

/// Settlement that accepts every batch whose notionals are representable and only logs it.
#[derive(Debug, Default)]
pub struct LoggingSettlement {
    batches: AtomicUsize,
}

impl LoggingSettlement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of batches accepted so far.
    pub fn batches_settled(&self) -> usize {
        self.batches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SettlementService for LoggingSettlement {
    async fn settle(&self, market: Market, transfers: Vec<Transfer>) -> Result<(), SettlementError> {
        let notionals = transfers
            .iter()
            .map(Transfer::notional)
            .collect::<Result<Vec<_>, _>>()?;
        for (t, notional) in transfers.iter().zip(notionals) {
            info!(
                "Settle {}: {} {} from {} to {} for {}",
                market, t.amount, market, t.ask_owner, t.bid_owner, notional
            );
        }
        self.batches.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::types::OrderId;
    use rust_decimal_macros::dec;

    #[test]
    fn test_transfer_from_match() {
        let m = Match {
            ask_order_id: OrderId(1),
            ask_owner: UserId(10),
            bid_order_id: OrderId(2),
            bid_owner: UserId(20),
            amount_filled: dec!(1.5),
            price: dec!(200),
        };
        let t = Transfer::from(&m);
        assert_eq!(t.ask_owner, UserId(10));
        assert_eq!(t.bid_owner, UserId(20));
        assert_eq!(t.notional(), Ok(dec!(300)));

        let huge = Decimal::from(1_000_000_000_000_000u64);
        let oversized = Transfer { amount: huge, price: huge, ..t };
        assert!(matches!(oversized.notional(), Err(SettlementError::Overflow(_))));
    }

    #[tokio::test]
    async fn test_logging_settlement_counts_batches() {
        let settlement = LoggingSettlement::new();
        let transfer = Transfer {
            ask_owner: UserId(1),
            bid_owner: UserId(2),
            amount: dec!(1),
            price: dec!(10),
        };
        settlement.settle(Market::new("ETH"), vec![transfer.clone()]).await.unwrap();
        settlement.settle(Market::new("BTC"), vec![transfer.clone()]).await.unwrap();
        assert_eq!(settlement.batches_settled(), 2);

        let huge = Decimal::from(1_000_000_000_000_000u64);
        let oversized = Transfer { amount: huge, price: huge, ..transfer.clone() };
        let err = settlement
            .settle(Market::new("ETH"), vec![transfer, oversized])
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Overflow(_)));
        assert_eq!(settlement.batches_settled(), 2);
    }
}

//! In-memory balance ledger used as a settlement backend.
//!
//! Every user holds a balance per asset. A market's base asset is named after the market
//! symbol and all markets share one quote asset. A batch of transfers is validated as a
//! whole against the resulting balances before anything is applied, so a rejected batch
//! leaves every balance untouched.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use super::{SettlementError, SettlementService, Transfer};
use crate::domain::models::types::{Market, UserId};

pub const DEFAULT_QUOTE_ASSET: &str = "USD";

type Balances = HashMap<UserId, HashMap<String, Decimal>>;

#[derive(Debug)]
pub struct LedgerSettlement {
    quote_asset: String,
    balances: Mutex<Balances>,
}

impl LedgerSettlement {
    pub fn new(quote_asset: &str) -> Self {
        Self {
            quote_asset: quote_asset.trim().to_uppercase(),
            balances: Mutex::new(HashMap::new()),
        }
    }

    pub fn quote_asset(&self) -> &str {
        &self.quote_asset
    }

    /// Registers `user` with no balances. Registering twice keeps existing balances.
    pub fn register_user(&self, user: UserId) {
        self.balances.lock().entry(user).or_default();
    }

    /// Credits `amount` of `asset` to `user`, registering the user if needed.
    ///
    /// Fails without changing anything when the balance would overflow.
    pub fn deposit(&self, user: UserId, asset: &str, amount: Decimal) -> Result<(), SettlementError> {
        let asset = asset.to_uppercase();
        let mut balances = self.balances.lock();
        let balance = balances
            .entry(user)
            .or_default()
            .entry(asset.clone())
            .or_insert(Decimal::ZERO);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| SettlementError::Overflow(format!("{asset} balance of user {user}")))?;
        Ok(())
    }

    /// Balance of `asset` held by `user`, `None` for unknown users.
    pub fn balance(&self, user: UserId, asset: &str) -> Option<Decimal> {
        let balances = self.balances.lock();
        balances.get(&user).map(|assets| {
            assets
                .get(&asset.to_uppercase())
                .copied()
                .unwrap_or(Decimal::ZERO)
        })
    }

    /// Net change per (user, asset) produced by the whole batch.
    fn net_changes(&self, market: &Market, transfers: &[Transfer]) -> Result<Changes, SettlementError> {
        let base = market.as_str();
        let quote = self.quote_asset.as_str();
        let mut changes = Changes::new();
        for t in transfers {
            let notional = t.notional()?;
            accumulate(&mut changes, t.ask_owner, base, -t.amount)?;
            accumulate(&mut changes, t.ask_owner, quote, notional)?;
            accumulate(&mut changes, t.bid_owner, base, t.amount)?;
            accumulate(&mut changes, t.bid_owner, quote, -notional)?;
        }
        Ok(changes)
    }
}

type Changes = HashMap<(UserId, String), Decimal>;

fn accumulate(changes: &mut Changes, user: UserId, asset: &str, delta: Decimal) -> Result<(), SettlementError> {
    let net = changes.entry((user, asset.to_string())).or_default();
    *net = net
        .checked_add(delta)
        .ok_or_else(|| SettlementError::Overflow(format!("net {asset} change of user {user}")))?;
    Ok(())
}

impl Default for LedgerSettlement {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTE_ASSET)
    }
}

#[async_trait]
impl SettlementService for LedgerSettlement {
    async fn settle(&self, market: Market, transfers: Vec<Transfer>) -> Result<(), SettlementError> {
        let changes = self.net_changes(&market, &transfers)?;
        let mut balances = self.balances.lock();

        let mut updated = Vec::with_capacity(changes.len());
        for ((user, asset), delta) in changes {
            let Some(assets) = balances.get(&user) else {
                warn!("Settlement on {} references unknown user {}", market, user);
                return Err(SettlementError::UnknownUser(user));
            };
            let available = assets.get(&asset).copied().unwrap_or(Decimal::ZERO);
            let Some(balance) = available.checked_add(delta) else {
                warn!("Settlement on {} rejected: {} balance of user {} overflows", market, asset, user);
                return Err(SettlementError::Overflow(format!("{asset} balance of user {user}")));
            };
            if balance < Decimal::ZERO {
                warn!(
                    "Settlement on {} rejected: user {} holds {} {}, needs {}",
                    market, user, available, asset, -delta
                );
                return Err(SettlementError::InsufficientFunds {
                    user,
                    asset,
                    required: -delta,
                    available,
                });
            }
            updated.push((user, asset, balance));
        }

        for (user, asset, balance) in updated {
            if let Some(assets) = balances.get_mut(&user) {
                assets.insert(asset, balance);
            }
        }

        debug!("Settled {} transfers on {}", transfers.len(), market);
        Ok(())
    }
}

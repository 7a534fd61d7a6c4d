use std::collections::{BTreeSet, HashMap};

use crate::domain::models::types::{Market, OrderId, UserId};

/// Which user owns which live order, and on which market it rests.
#[derive(Debug, Default)]
pub(crate) struct UserIndex {
    by_user: HashMap<UserId, BTreeSet<OrderId>>,
    by_order: HashMap<OrderId, (Market, UserId)>,
}

impl UserIndex {
    pub fn insert(&mut self, order_id: OrderId, market: Market, user: UserId) {
        self.by_user.entry(user).or_default().insert(order_id);
        self.by_order.insert(order_id, (market, user));
    }

    pub fn remove(&mut self, order_id: OrderId) -> Option<(Market, UserId)> {
        let (market, user) = self.by_order.remove(&order_id)?;
        if let Some(orders) = self.by_user.get_mut(&user) {
            orders.remove(&order_id);
            if orders.is_empty() {
                self.by_user.remove(&user);
            }
        }
        Some((market, user))
    }

    pub fn market_of(&self, order_id: OrderId) -> Option<&Market> {
        self.by_order.get(&order_id).map(|(market, _)| market)
    }

    /// The user's live orders with their markets, in ascending id order.
    pub fn orders_of(&self, user: UserId) -> Vec<(OrderId, Market)> {
        self.by_user
            .get(&user)
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_order.get(id).map(|(market, _)| (*id, market.clone())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_remove() {
        let mut index = UserIndex::default();
        index.insert(OrderId(3), Market::new("ETH"), UserId(1));
        index.insert(OrderId(1), Market::new("BTC"), UserId(1));
        index.insert(OrderId(2), Market::new("ETH"), UserId(2));

        let ids: Vec<_> = index.orders_of(UserId(1)).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![OrderId(1), OrderId(3)]);
        assert_eq!(index.market_of(OrderId(1)), Some(&Market::new("BTC")));

        assert_eq!(index.remove(OrderId(2)), Some((Market::new("ETH"), UserId(2))));
        assert!(index.orders_of(UserId(2)).is_empty());
        assert_eq!(index.remove(OrderId(2)), None);
        assert_eq!(index.len(), 2);
    }
}

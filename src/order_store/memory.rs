use super::OrderStore;
use crate::core_types::{OrderId, UserId};
use crate::error::{Error, Result};
use crate::models::{Order, OrderStatus, Side};
use crate::money::{Price, weighted_average};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Mutex;

pub struct InMemoryOrderStore {
    orders: DashMap<OrderId, Mutex<Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        InMemoryOrderStore {
            orders: DashMap::new(),
        }
    }
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(&self, order: Order) -> Result<()> {
        if self.orders.contains_key(&order.id) {
            return Err(Error::Conflict(format!("order {} already exists", order.id)));
        }
        self.orders.insert(order.id, Mutex::new(order));
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.orders
            .get(&id)
            .map(|entry| entry.lock().unwrap().clone())
            .ok_or_else(|| Error::NotFound(format!("order {id}")))
    }

    async fn apply_fill(&self, id: OrderId, fill_qty: u64, fill_price: Price) -> Result<()> {
        let entry = self
            .orders
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("order {id}")))?;
        let mut order = entry.lock().unwrap();
        if order.status.is_terminal() {
            return Err(Error::Invariant(format!(
                "order {id} received a fill after reaching terminal status"
            )));
        }
        let prior_qty = order.filled_qty;
        let prior_avg = order.avg_fill_price.unwrap_or(fill_price);
        let new_avg = weighted_average(prior_qty, prior_avg.inner(), fill_qty, fill_price.inner());
        order.filled_qty = order
            .filled_qty
            .checked_add(fill_qty)
            .filter(|&q| q <= order.qty)
            .ok_or_else(|| Error::Invariant(format!("order {id} overfilled")))?;
        order.avg_fill_price = Price::new(new_avg);
        if order.side == Side::Buy {
            order.consumed_cash = order
                .consumed_cash
                .checked_add(fill_price.times_qty(fill_qty))
                .ok_or_else(|| Error::Invariant(format!("order {id} consumed_cash overflowed scale")))?;
        }
        order.status = if order.filled_qty == order.qty {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        Ok(())
    }

    async fn cancel_order(&self, id: OrderId) -> Result<()> {
        let entry = self
            .orders
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("order {id}")))?;
        let mut order = entry.lock().unwrap();
        if order.status == OrderStatus::Cancelled {
            return Ok(());
        }
        if order.status == OrderStatus::Filled {
            return Err(Error::Invariant(format!(
                "order {id} cannot be cancelled after being filled"
            )));
        }
        order.status = OrderStatus::Cancelled;
        Ok(())
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let mut out: Vec<Order> = self
            .orders
            .iter()
            .map(|entry| entry.lock().unwrap().clone())
            .filter(|o| o.user_id == user_id)
            .collect();
        out.sort_by_key(|o| o.seq);
        Ok(out)
    }

    async fn list_resting_by_side(&self, side: Side) -> Result<Vec<Order>> {
        let mut out: Vec<Order> = self
            .orders
            .iter()
            .map(|entry| entry.lock().unwrap().clone())
            .filter(|o| o.side == side && super::is_resting(o.status))
            .collect();
        match side {
            Side::Buy => out.sort_by(|a, b| {
                b.price
                    .map(|p| p.inner())
                    .cmp(&a.price.map(|p| p.inner()))
                    .then(a.seq.cmp(&b.seq))
            }),
            Side::Sell => out.sort_by(|a, b| {
                a.price
                    .map(|p| p.inner())
                    .cmp(&b.price.map(|p| p.inner()))
                    .then(a.seq.cmp(&b.seq))
            }),
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderMethod;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn make_order(id: OrderId, side: Side, price: f64, qty: u64, seq: u64) -> Order {
        let limit_price = Price::new(rust_decimal::Decimal::try_from(price).unwrap()).unwrap();
        let reserved_cash = match side {
            Side::Buy => limit_price.times_qty(qty),
            Side::Sell => crate::money::Cash::ZERO,
        };
        Order {
            id,
            user_id: 1,
            side,
            method: OrderMethod::Limit,
            price: Some(limit_price),
            qty,
            filled_qty: 0,
            status: OrderStatus::Open,
            avg_fill_price: None,
            created_at: Utc::now(),
            seq,
            reserved_cash,
            consumed_cash: crate::money::Cash::ZERO,
        }
    }

    #[tokio::test]
    async fn resting_buys_sort_best_price_first_then_fifo() {
        let store = InMemoryOrderStore::new();
        store.create_order(make_order(1, Side::Buy, 10.0, 5, 1)).await.unwrap();
        store.create_order(make_order(2, Side::Buy, 12.0, 5, 2)).await.unwrap();
        store.create_order(make_order(3, Side::Buy, 12.0, 5, 3)).await.unwrap();

        let resting = store.list_resting_by_side(Side::Buy).await.unwrap();
        let ids: Vec<_> = resting.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn apply_fill_transitions_to_filled_at_full_quantity() {
        let store = InMemoryOrderStore::new();
        store.create_order(make_order(1, Side::Buy, 10.0, 5, 1)).await.unwrap();
        store
            .apply_fill(1, 5, Price::new(dec!(10.0000)).unwrap())
            .await
            .unwrap();
        let order = store.get_order(1).await.unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_qty, 5);
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let store = InMemoryOrderStore::new();
        store.create_order(make_order(1, Side::Buy, 10.0, 5, 1)).await.unwrap();
        store.cancel_order(1).await.unwrap();
        store.cancel_order(1).await.unwrap();
        assert_eq!(store.get_order(1).await.unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn fill_after_terminal_is_an_invariant_error() {
        let store = InMemoryOrderStore::new();
        store.create_order(make_order(1, Side::Buy, 10.0, 5, 1)).await.unwrap();
        store.cancel_order(1).await.unwrap();
        let err = store
            .apply_fill(1, 1, Price::new(dec!(10.0000)).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }
}

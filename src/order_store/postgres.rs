//! Postgres-backed order store, grounded in the same runtime-checked
//! `sqlx::query`/`query_as` style as [`crate::ledger::postgres`].

use super::OrderStore;
use crate::core_types::{OrderId, UserId};
use crate::error::{Error, Result};
use crate::models::{Order, OrderMethod, OrderStatus, Side};
use crate::money::{Cash, Price, weighted_average};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        PgOrderStore { pool }
    }
}

fn row_to_order(row: &sqlx::postgres::PgRow) -> Result<Order> {
    let side_str: String = row.try_get("side")?;
    let method_str: String = row.try_get("method")?;
    let status_str: String = row.try_get("status")?;
    let price: Option<Decimal> = row.try_get("price")?;
    let avg_fill_price: Option<Decimal> = row.try_get("avg_fill_price")?;
    let reserved_cash: Decimal = row.try_get("reserved_cash")?;
    let consumed_cash: Decimal = row.try_get("consumed_cash")?;

    Ok(Order {
        id: row.try_get::<i64, _>("id")? as OrderId,
        user_id: row.try_get::<i64, _>("user_id")? as UserId,
        side: match side_str.as_str() {
            "buy" => Side::Buy,
            _ => Side::Sell,
        },
        method: match method_str.as_str() {
            "market" => OrderMethod::Market,
            _ => OrderMethod::Limit,
        },
        price: price.and_then(Price::new),
        qty: row.try_get::<i64, _>("qty")? as u64,
        filled_qty: row.try_get::<i64, _>("filled_qty")? as u64,
        status: match status_str.as_str() {
            "open" => OrderStatus::Open,
            "partially_filled" => OrderStatus::PartiallyFilled,
            "filled" => OrderStatus::Filled,
            "cancelled" => OrderStatus::Cancelled,
            _ => OrderStatus::Pending,
        },
        avg_fill_price: avg_fill_price.and_then(Price::new),
        created_at: row.try_get("created_at")?,
        seq: row.try_get::<i64, _>("seq")? as u64,
        reserved_cash: {
            let id: i64 = row.try_get("id")?;
            Cash::new(reserved_cash)
                .ok_or_else(|| Error::Invariant(format!("order {} has negative reserved_cash", id)))?
        },
        consumed_cash: {
            let id: i64 = row.try_get("id")?;
            Cash::new(consumed_cash)
                .ok_or_else(|| Error::Invariant(format!("order {} has negative consumed_cash", id)))?
        },
    })
}

fn side_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

fn status_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "pending",
        OrderStatus::Open => "open",
        OrderStatus::PartiallyFilled => "partially_filled",
        OrderStatus::Filled => "filled",
        OrderStatus::Cancelled => "cancelled",
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create_order(&self, order: Order) -> Result<()> {
        let method = match order.method {
            OrderMethod::Limit => "limit",
            OrderMethod::Market => "market",
        };
        sqlx::query(
            "INSERT INTO orders (id, user_id, side, method, price, qty, filled_qty, status, avg_fill_price, created_at, seq, reserved_cash, consumed_cash)
             VALUES ($1, $2, $3, $4, $5, $6, 0, $7, NULL, $8, $9, $10, $11)",
        )
        .bind(order.id as i64)
        .bind(order.user_id as i64)
        .bind(side_str(order.side))
        .bind(method)
        .bind(order.price.map(|p| p.inner()))
        .bind(order.qty as i64)
        .bind(status_str(order.status))
        .bind(order.created_at)
        .bind(order.seq as i64)
        .bind(order.reserved_cash.inner())
        .bind(order.consumed_cash.inner())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::Conflict(format!("order {} already exists", order.id))
            }
            other => other.into(),
        })?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Order> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(id as i64)
            .fetch_one(&self.pool)
            .await?;
        row_to_order(&row)
    }

    async fn apply_fill(&self, id: OrderId, fill_qty: u64, fill_price: Price) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT side, filled_qty, qty, avg_fill_price, status, consumed_cash FROM orders WHERE id = $1 FOR UPDATE",
        )
        .bind(id as i64)
        .fetch_one(&mut *tx)
        .await?;
        let status: String = row.try_get("status")?;
        if status == "filled" || status == "cancelled" {
            return Err(Error::Invariant(format!(
                "order {id} received a fill after reaching terminal status"
            )));
        }
        let side_str: String = row.try_get("side")?;
        let prior_qty: i64 = row.try_get("filled_qty")?;
        let total_qty: i64 = row.try_get("qty")?;
        let prior_avg: Option<Decimal> = row.try_get("avg_fill_price")?;
        let prior_consumed: Decimal = row.try_get("consumed_cash")?;
        let new_filled = prior_qty + fill_qty as i64;
        if new_filled > total_qty {
            return Err(Error::Invariant(format!("order {id} overfilled")));
        }
        let new_avg = weighted_average(
            prior_qty as u64,
            prior_avg.unwrap_or(fill_price.inner()),
            fill_qty,
            fill_price.inner(),
        );
        let new_consumed = if side_str == "buy" {
            let notional = fill_price.times_qty(fill_qty);
            prior_consumed + notional.inner()
        } else {
            prior_consumed
        };
        let new_status = if new_filled == total_qty { "filled" } else { "partially_filled" };
        sqlx::query(
            "UPDATE orders SET filled_qty = $2, avg_fill_price = $3, status = $4, consumed_cash = $5 WHERE id = $1",
        )
        .bind(id as i64)
        .bind(new_filled)
        .bind(new_avg)
        .bind(new_status)
        .bind(new_consumed)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn cancel_order(&self, id: OrderId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET status = 'cancelled' WHERE id = $1 AND status != 'filled' RETURNING id",
        )
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await?;
        if result.is_none() {
            let order = self.get_order(id).await?;
            if order.status != OrderStatus::Cancelled {
                return Err(Error::Invariant(format!(
                    "order {id} cannot be cancelled after being filled"
                )));
            }
        }
        Ok(())
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query("SELECT * FROM orders WHERE user_id = $1 ORDER BY seq ASC")
            .bind(user_id as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_order).collect()
    }

    async fn list_resting_by_side(&self, side: Side) -> Result<Vec<Order>> {
        let order_by = match side {
            Side::Buy => "price DESC, seq ASC",
            Side::Sell => "price ASC, seq ASC",
        };
        let query = format!(
            "SELECT * FROM orders WHERE side = $1 AND status IN ('open', 'partially_filled') ORDER BY {order_by}"
        );
        let rows = sqlx::query(&query)
            .bind(side_str(side))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_order).collect()
    }
}

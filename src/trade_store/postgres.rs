use super::TradeStore;
use crate::core_types::UserId;
use crate::error::Result;
use crate::models::Trade;
use crate::money::Price;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

pub struct PgTradeStore {
    pool: PgPool,
}

impl PgTradeStore {
    pub fn new(pool: PgPool) -> Self {
        PgTradeStore { pool }
    }
}

#[async_trait]
impl TradeStore for PgTradeStore {
    async fn record_trade(&self, trade: Trade) -> Result<()> {
        sqlx::query(
            "INSERT INTO trades (id, buy_order_id, sell_order_id, buyer_id, seller_id, price, qty, executed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(trade.id as i64)
        .bind(trade.buy_order_id as i64)
        .bind(trade.sell_order_id as i64)
        .bind(trade.buyer_id as i64)
        .bind(trade.seller_id as i64)
        .bind(trade.price.inner())
        .bind(trade.qty as i64)
        .bind(trade.executed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_trades_for_user(&self, user_id: UserId) -> Result<Vec<Trade>> {
        let rows = sqlx::query(
            "SELECT * FROM trades WHERE buyer_id = $1 OR seller_id = $1 ORDER BY executed_at DESC",
        )
        .bind(user_id as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(Trade {
                    id: row.try_get::<i64, _>("id")? as u64,
                    buy_order_id: row.try_get::<i64, _>("buy_order_id")? as u64,
                    sell_order_id: row.try_get::<i64, _>("sell_order_id")? as u64,
                    buyer_id: row.try_get::<i64, _>("buyer_id")? as UserId,
                    seller_id: row.try_get::<i64, _>("seller_id")? as UserId,
                    price: Price::new(row.try_get::<Decimal, _>("price")?).unwrap_or(Price::new(Decimal::ONE).unwrap()),
                    qty: row.try_get::<i64, _>("qty")? as u64,
                    executed_at: row.try_get("executed_at")?,
                })
            })
            .collect()
    }
}

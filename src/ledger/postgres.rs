//! Postgres-backed ledger.
//!
//! Built with runtime-checked `sqlx::query`/`sqlx::query_as` rather than
//! the compile-time `query!` macros, since those require a live database
//! reachable at build time.
//!
//! Every mutation is a single `UPDATE ... WHERE <guard> RETURNING id`
//! statement. The guard encodes the precondition (enough available cash
//! or shares, or enough frozen to release/settle); `fetch_optional`
//! returning `None` means the guard failed, which this module turns into
//! the matching domain error rather than a generic conflict.

use super::{Account, Ledger, Position};
use crate::core_types::UserId;
use crate::error::{Error, Result};
use crate::money::{Cash, Price};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        PgLedger { pool }
    }
}

fn to_cash(value: Decimal) -> Cash {
    Cash::new(value).unwrap_or(Cash::ZERO)
}

#[async_trait]
impl Ledger for PgLedger {
    async fn get_account(&self, user_id: UserId) -> Result<Account> {
        let row = sqlx::query(
            "SELECT cash_avail, cash_frozen FROM accounts WHERE user_id = $1",
        )
        .bind(user_id as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(Account {
            user_id,
            cash_avail: to_cash(row.try_get("cash_avail")?),
            cash_frozen: to_cash(row.try_get("cash_frozen")?),
        })
    }

    async fn get_position(&self, user_id: UserId) -> Result<Position> {
        let row = sqlx::query(
            "SELECT shares_avail, shares_frozen, avg_cost FROM positions WHERE user_id = $1",
        )
        .bind(user_id as i64)
        .fetch_one(&self.pool)
        .await?;
        let shares_avail: i64 = row.try_get("shares_avail")?;
        let shares_frozen: i64 = row.try_get("shares_frozen")?;
        let avg_cost: Decimal = row.try_get("avg_cost")?;
        Ok(Position {
            user_id,
            shares_avail: shares_avail as u64,
            shares_frozen: shares_frozen as u64,
            avg_cost: Price::new(avg_cost).unwrap_or(Price::new(Decimal::ONE).unwrap()),
        })
    }

    async fn reserve_cash(&self, user_id: UserId, amount: Cash) -> Result<()> {
        let result = sqlx::query(
            "UPDATE accounts SET cash_avail = cash_avail - $2, cash_frozen = cash_frozen + $2
             WHERE user_id = $1 AND cash_avail >= $2
             RETURNING user_id",
        )
        .bind(user_id as i64)
        .bind(amount.inner())
        .fetch_optional(&self.pool)
        .await?;
        result.ok_or_else(|| {
            Error::InsufficientFunds(format!("user {user_id} lacks {amount} available cash"))
        })?;
        Ok(())
    }

    async fn reserve_all_cash(&self, user_id: UserId) -> Result<Cash> {
        // `RETURNING` reflects the post-update row, so the moved amount
        // (the pre-update `cash_avail`) has to come from a locked read
        // inside the same transaction rather than the UPDATE's output.
        let mut tx = self.pool.begin().await?;
        let before = sqlx::query("SELECT cash_avail FROM accounts WHERE user_id = $1 FOR UPDATE")
            .bind(user_id as i64)
            .fetch_one(&mut *tx)
            .await?;
        let avail: Decimal = before.try_get("cash_avail")?;
        sqlx::query("UPDATE accounts SET cash_avail = 0, cash_frozen = cash_frozen + $2 WHERE user_id = $1")
            .bind(user_id as i64)
            .bind(avail)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(to_cash(avail))
    }

    async fn release_cash(&self, user_id: UserId, amount: Cash) -> Result<()> {
        let result = sqlx::query(
            "UPDATE accounts SET cash_avail = cash_avail + $2, cash_frozen = cash_frozen - $2
             WHERE user_id = $1 AND cash_frozen >= $2
             RETURNING user_id",
        )
        .bind(user_id as i64)
        .bind(amount.inner())
        .fetch_optional(&self.pool)
        .await?;
        result.ok_or_else(|| {
            Error::Invariant(format!("user {user_id} release_cash({amount}) exceeds frozen"))
        })?;
        Ok(())
    }

    async fn settle_cash_debit(&self, user_id: UserId, amount: Cash) -> Result<()> {
        let result = sqlx::query(
            "UPDATE accounts SET cash_frozen = cash_frozen - $2
             WHERE user_id = $1 AND cash_frozen >= $2
             RETURNING user_id",
        )
        .bind(user_id as i64)
        .bind(amount.inner())
        .fetch_optional(&self.pool)
        .await?;
        result.ok_or_else(|| {
            Error::Invariant(format!(
                "user {user_id} settle_cash_debit({amount}) exceeds frozen"
            ))
        })?;
        Ok(())
    }

    async fn settle_cash_credit(&self, user_id: UserId, amount: Cash) -> Result<()> {
        sqlx::query("UPDATE accounts SET cash_avail = cash_avail + $2 WHERE user_id = $1")
            .bind(user_id as i64)
            .bind(amount.inner())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reserve_shares(&self, user_id: UserId, qty: u64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE positions SET shares_avail = shares_avail - $2, shares_frozen = shares_frozen + $2
             WHERE user_id = $1 AND shares_avail >= $2
             RETURNING user_id",
        )
        .bind(user_id as i64)
        .bind(qty as i64)
        .fetch_optional(&self.pool)
        .await?;
        result.ok_or_else(|| {
            Error::InsufficientShares(format!("user {user_id} lacks {qty} available shares"))
        })?;
        Ok(())
    }

    async fn release_shares(&self, user_id: UserId, qty: u64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE positions SET shares_avail = shares_avail + $2, shares_frozen = shares_frozen - $2
             WHERE user_id = $1 AND shares_frozen >= $2
             RETURNING user_id",
        )
        .bind(user_id as i64)
        .bind(qty as i64)
        .fetch_optional(&self.pool)
        .await?;
        result.ok_or_else(|| {
            Error::Invariant(format!("user {user_id} release_shares({qty}) exceeds frozen"))
        })?;
        Ok(())
    }

    async fn settle_share_debit(&self, user_id: UserId, qty: u64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE positions SET shares_frozen = shares_frozen - $2
             WHERE user_id = $1 AND shares_frozen >= $2
             RETURNING user_id",
        )
        .bind(user_id as i64)
        .bind(qty as i64)
        .fetch_optional(&self.pool)
        .await?;
        result.ok_or_else(|| {
            Error::Invariant(format!("user {user_id} settle_share_debit({qty}) exceeds frozen"))
        })?;
        Ok(())
    }

    async fn settle_share_credit_with_cost(
        &self,
        user_id: UserId,
        qty: u64,
        fill_price: Price,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT shares_avail, avg_cost FROM positions WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id as i64)
        .fetch_one(&mut *tx)
        .await?;
        let prior_qty: i64 = row.try_get("shares_avail")?;
        let prior_cost: Decimal = row.try_get("avg_cost")?;
        let new_avg = crate::money::weighted_average(
            prior_qty as u64,
            prior_cost,
            qty,
            fill_price.inner(),
        );
        sqlx::query(
            "UPDATE positions SET shares_avail = shares_avail + $2, avg_cost = $3 WHERE user_id = $1",
        )
        .bind(user_id as i64)
        .bind(qty as i64)
        .bind(new_avg)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

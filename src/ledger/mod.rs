//! Account ledger
//!
//! Every account holds two resources: cash and shares of the one traded
//! symbol, each split into available and frozen balances. Every mutation
//! is expressed as a named operation (`reserve_*`, `release_*`,
//! `settle_*`) that either fully applies or returns an error — nothing
//! partially applies.
//!
//! Two implementations exist: [`memory::InMemoryLedger`] for tests and
//! [`postgres::PgLedger`] for the conditional-update-backed store
//! described in the design notes.

pub mod memory;
pub mod postgres;

use crate::core_types::UserId;
use crate::error::Result;
use crate::money::{Cash, Price};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub cash_avail: Cash,
    pub cash_frozen: Cash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub user_id: UserId,
    pub shares_avail: u64,
    pub shares_frozen: u64,
    /// Weighted-average cost basis per share of currently-held shares.
    pub avg_cost: Price,
}

impl Position {
    pub fn total_shares(&self) -> u64 {
        self.shares_avail + self.shares_frozen
    }
}

/// The account ledger: cash and share reservation and settlement
/// primitives. Every method is atomic with respect to concurrent callers
/// for the same `user_id` — implementations enforce this either with a
/// per-account lock (in-memory) or a conditional `UPDATE ... WHERE ...
/// RETURNING` whose row presence is checked (Postgres).
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn get_account(&self, user_id: UserId) -> Result<Account>;
    async fn get_position(&self, user_id: UserId) -> Result<Position>;

    /// Move `amount` from available to frozen cash. Fails with
    /// `InsufficientFunds` if available cash is short.
    async fn reserve_cash(&self, user_id: UserId, amount: Cash) -> Result<()>;

    /// Move the account's entire available cash to frozen in one atomic
    /// step and return the amount moved — the reservation policy for a
    /// BUY MARKET order, which has no limit price to size a reservation
    /// against.
    async fn reserve_all_cash(&self, user_id: UserId) -> Result<Cash>;

    /// Move `amount` back from frozen to available cash — used when an
    /// order is cancelled or reduced and its remaining reservation is
    /// released.
    async fn release_cash(&self, user_id: UserId, amount: Cash) -> Result<()>;

    /// Like [`Self::release_cash`], but clamps `amount` down to the
    /// account's current frozen cash instead of erroring past it — the
    /// safety floor a residual-release computed from an order's own
    /// `reserved_cash`/`consumed_cash` fields needs, since those can
    /// drift from the account's live frozen balance under concurrent
    /// partial fills.
    async fn release_cash_clamped(&self, user_id: UserId, amount: Cash) -> Result<()> {
        let account = self.get_account(user_id).await?;
        let actual = if amount > account.cash_frozen { account.cash_frozen } else { amount };
        if actual.is_zero() {
            return Ok(());
        }
        self.release_cash(user_id, actual).await
    }

    /// Remove `amount` from frozen cash without crediting available —
    /// the buyer side of trade settlement.
    async fn settle_cash_debit(&self, user_id: UserId, amount: Cash) -> Result<()>;

    /// Credit `amount` directly to available cash — the seller side of
    /// trade settlement.
    async fn settle_cash_credit(&self, user_id: UserId, amount: Cash) -> Result<()>;

    /// Move `qty` shares from available to frozen. Fails with
    /// `InsufficientShares` if available shares are short.
    async fn reserve_shares(&self, user_id: UserId, qty: u64) -> Result<()>;

    /// Move `qty` shares back from frozen to available.
    async fn release_shares(&self, user_id: UserId, qty: u64) -> Result<()>;

    /// Remove `qty` shares from frozen without crediting available — the
    /// seller side of trade settlement.
    async fn settle_share_debit(&self, user_id: UserId, qty: u64) -> Result<()>;

    /// Credit `qty` shares to available and update the weighted-average
    /// cost basis at `fill_price` — the buyer side of trade settlement.
    async fn settle_share_credit_with_cost(
        &self,
        user_id: UserId,
        qty: u64,
        fill_price: Price,
    ) -> Result<()>;
}

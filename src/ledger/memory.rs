//! In-memory ledger used by unit and property tests.
//!
//! Every mutation is checked before it applies, and nothing is left
//! partially applied; each account's state sits behind its own lock so
//! concurrent callers serialize cleanly without needing a database.

use super::{Account, Ledger, Position};
use crate::core_types::UserId;
use crate::error::{Error, Result};
use crate::money::{Cash, Price, weighted_average};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
struct AccountState {
    cash_avail: Cash,
    cash_frozen: Cash,
    shares_avail: u64,
    shares_frozen: u64,
    avg_cost: Price,
}

impl Default for AccountState {
    fn default() -> Self {
        AccountState {
            cash_avail: Cash::ZERO,
            cash_frozen: Cash::ZERO,
            shares_avail: 0,
            shares_frozen: 0,
            avg_cost: Price::new(rust_decimal::Decimal::ONE).unwrap(),
        }
    }
}

pub struct InMemoryLedger {
    accounts: DashMap<UserId, Mutex<AccountState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        InMemoryLedger {
            accounts: DashMap::new(),
        }
    }

    /// Test/seed helper: credit cash directly to available, bypassing
    /// reservation. There is no production-facing deposit operation in
    /// scope; funding is an external collaborator's job.
    pub fn seed_cash(&self, user_id: UserId, amount: Cash) {
        let entry = self
            .accounts
            .entry(user_id)
            .or_insert_with(|| Mutex::new(AccountState::default()));
        let mut state = entry.lock().unwrap();
        state.cash_avail = state
            .cash_avail
            .checked_add(amount)
            .expect("seed overflowed cash scale");
    }

    pub fn seed_shares(&self, user_id: UserId, qty: u64, avg_cost: Price) {
        let entry = self
            .accounts
            .entry(user_id)
            .or_insert_with(|| Mutex::new(AccountState::default()));
        let mut state = entry.lock().unwrap();
        state.shares_avail += qty;
        state.avg_cost = avg_cost;
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn get_account(&self, user_id: UserId) -> Result<Account> {
        let state = self
            .accounts
            .entry(user_id)
            .or_insert_with(|| Mutex::new(AccountState::default()))
            .lock()
            .unwrap()
            .clone();
        Ok(Account {
            user_id,
            cash_avail: state.cash_avail,
            cash_frozen: state.cash_frozen,
        })
    }

    async fn get_position(&self, user_id: UserId) -> Result<Position> {
        let state = self
            .accounts
            .entry(user_id)
            .or_insert_with(|| Mutex::new(AccountState::default()))
            .lock()
            .unwrap()
            .clone();
        Ok(Position {
            user_id,
            shares_avail: state.shares_avail,
            shares_frozen: state.shares_frozen,
            avg_cost: state.avg_cost,
        })
    }

    async fn reserve_cash(&self, user_id: UserId, amount: Cash) -> Result<()> {
        let entry = self
            .accounts
            .entry(user_id)
            .or_insert_with(|| Mutex::new(AccountState::default()));
        let mut state = entry.lock().unwrap();
        if state.cash_avail < amount {
            return Err(Error::InsufficientFunds(format!(
                "user {user_id} has {} available, needs {amount}",
                state.cash_avail
            )));
        }
        state.cash_avail = state.cash_avail.checked_sub(amount).unwrap();
        state.cash_frozen = state
            .cash_frozen
            .checked_add(amount)
            .ok_or_else(|| Error::Invariant("cash_frozen overflowed scale".into()))?;
        Ok(())
    }

    async fn reserve_all_cash(&self, user_id: UserId) -> Result<Cash> {
        let entry = self
            .accounts
            .entry(user_id)
            .or_insert_with(|| Mutex::new(AccountState::default()));
        let mut state = entry.lock().unwrap();
        let amount = state.cash_avail;
        state.cash_avail = Cash::ZERO;
        state.cash_frozen = state
            .cash_frozen
            .checked_add(amount)
            .ok_or_else(|| Error::Invariant("cash_frozen overflowed scale".into()))?;
        Ok(amount)
    }

    async fn release_cash(&self, user_id: UserId, amount: Cash) -> Result<()> {
        let entry = self
            .accounts
            .entry(user_id)
            .or_insert_with(|| Mutex::new(AccountState::default()));
        let mut state = entry.lock().unwrap();
        if state.cash_frozen < amount {
            return Err(Error::Invariant(format!(
                "user {user_id} release_cash({amount}) exceeds frozen {}",
                state.cash_frozen
            )));
        }
        state.cash_frozen = state.cash_frozen.checked_sub(amount).unwrap();
        state.cash_avail = state
            .cash_avail
            .checked_add(amount)
            .ok_or_else(|| Error::Invariant("cash_avail overflowed scale".into()))?;
        Ok(())
    }

    async fn settle_cash_debit(&self, user_id: UserId, amount: Cash) -> Result<()> {
        let entry = self
            .accounts
            .entry(user_id)
            .or_insert_with(|| Mutex::new(AccountState::default()));
        let mut state = entry.lock().unwrap();
        if state.cash_frozen < amount {
            return Err(Error::Invariant(format!(
                "user {user_id} settle_cash_debit({amount}) exceeds frozen {}",
                state.cash_frozen
            )));
        }
        state.cash_frozen = state.cash_frozen.checked_sub(amount).unwrap();
        Ok(())
    }

    async fn settle_cash_credit(&self, user_id: UserId, amount: Cash) -> Result<()> {
        let entry = self
            .accounts
            .entry(user_id)
            .or_insert_with(|| Mutex::new(AccountState::default()));
        let mut state = entry.lock().unwrap();
        state.cash_avail = state
            .cash_avail
            .checked_add(amount)
            .ok_or_else(|| Error::Invariant("cash_avail overflowed scale".into()))?;
        Ok(())
    }

    async fn reserve_shares(&self, user_id: UserId, qty: u64) -> Result<()> {
        let entry = self
            .accounts
            .entry(user_id)
            .or_insert_with(|| Mutex::new(AccountState::default()));
        let mut state = entry.lock().unwrap();
        if state.shares_avail < qty {
            return Err(Error::InsufficientShares(format!(
                "user {user_id} has {} shares available, needs {qty}",
                state.shares_avail
            )));
        }
        state.shares_avail -= qty;
        state.shares_frozen = state
            .shares_frozen
            .checked_add(qty)
            .ok_or_else(|| Error::Invariant("shares_frozen overflowed".into()))?;
        Ok(())
    }

    async fn release_shares(&self, user_id: UserId, qty: u64) -> Result<()> {
        let entry = self
            .accounts
            .entry(user_id)
            .or_insert_with(|| Mutex::new(AccountState::default()));
        let mut state = entry.lock().unwrap();
        if state.shares_frozen < qty {
            return Err(Error::Invariant(format!(
                "user {user_id} release_shares({qty}) exceeds frozen {}",
                state.shares_frozen
            )));
        }
        state.shares_frozen -= qty;
        state.shares_avail = state
            .shares_avail
            .checked_add(qty)
            .ok_or_else(|| Error::Invariant("shares_avail overflowed".into()))?;
        Ok(())
    }

    async fn settle_share_debit(&self, user_id: UserId, qty: u64) -> Result<()> {
        let entry = self
            .accounts
            .entry(user_id)
            .or_insert_with(|| Mutex::new(AccountState::default()));
        let mut state = entry.lock().unwrap();
        if state.shares_frozen < qty {
            return Err(Error::Invariant(format!(
                "user {user_id} settle_share_debit({qty}) exceeds frozen {}",
                state.shares_frozen
            )));
        }
        state.shares_frozen -= qty;
        Ok(())
    }

    async fn settle_share_credit_with_cost(
        &self,
        user_id: UserId,
        qty: u64,
        fill_price: Price,
    ) -> Result<()> {
        let entry = self
            .accounts
            .entry(user_id)
            .or_insert_with(|| Mutex::new(AccountState::default()));
        let mut state = entry.lock().unwrap();
        let new_avg = weighted_average(
            state.shares_avail,
            state.avg_cost.inner(),
            qty,
            fill_price.inner(),
        );
        state.shares_avail = state
            .shares_avail
            .checked_add(qty)
            .ok_or_else(|| Error::Invariant("shares_avail overflowed".into()))?;
        state.avg_cost = Price::new(new_avg).unwrap_or(state.avg_cost);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cash(v: rust_decimal::Decimal) -> Cash {
        Cash::new(v).unwrap()
    }

    #[tokio::test]
    async fn reserve_then_release_round_trips() {
        let ledger = InMemoryLedger::new();
        ledger.seed_cash(1, cash(dec!(100.00)));
        ledger.reserve_cash(1, cash(dec!(40.00))).await.unwrap();
        let acct = ledger.get_account(1).await.unwrap();
        assert_eq!(acct.cash_avail.inner(), dec!(60.00));
        assert_eq!(acct.cash_frozen.inner(), dec!(40.00));

        ledger.release_cash(1, cash(dec!(40.00))).await.unwrap();
        let acct = ledger.get_account(1).await.unwrap();
        assert_eq!(acct.cash_avail.inner(), dec!(100.00));
        assert_eq!(acct.cash_frozen.inner(), dec!(0.00));
    }

    #[tokio::test]
    async fn reserve_cash_rejects_insufficient_funds() {
        let ledger = InMemoryLedger::new();
        ledger.seed_cash(1, cash(dec!(10.00)));
        let err = ledger.reserve_cash(1, cash(dec!(20.00))).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds(_)));
    }

    #[tokio::test]
    async fn settle_share_credit_updates_weighted_average_cost() {
        let ledger = InMemoryLedger::new();
        ledger.seed_shares(1, 3, Price::new(dec!(100.0000)).unwrap());
        ledger
            .settle_share_credit_with_cost(1, 1, Price::new(dec!(104.0000)).unwrap())
            .await
            .unwrap();
        let pos = ledger.get_position(1).await.unwrap();
        assert_eq!(pos.shares_avail, 4);
        assert_eq!(pos.avg_cost.inner(), dec!(101.0000));
    }

    #[tokio::test]
    async fn settle_share_debit_exceeding_frozen_is_an_invariant_error() {
        let ledger = InMemoryLedger::new();
        let err = ledger.settle_share_debit(1, 5).await.unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }
}

//! Candle persistence and startup schema management.
//!
//! The account ledger and order store each own their persistence in
//! [`crate::ledger::postgres`] and [`crate::order_store::postgres`];
//! this module covers what is left — the candle table — plus the
//! `schema` submodule that pre-creates all five tables on startup.

pub mod memory;
pub mod postgres;
pub mod schema;

use crate::core_types::Symbol;
use crate::error::Result;
use crate::models::{Candle, CandlePeriod};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait CandleRepository: Send + Sync {
    /// Upsert one candle, keyed by `(symbol, period, open_time)`.
    async fn save_candle(&self, candle: Candle) -> Result<()>;

    async fn get_candles(
        &self,
        symbol: &Symbol,
        period: CandlePeriod,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;

    /// Most recently closed candle for `(symbol, period)`, used by the
    /// gap-fill maintenance task to know what close price to carry
    /// forward into synthesized flat candles.
    async fn latest_candle(&self, symbol: &Symbol, period: CandlePeriod) -> Result<Option<Candle>>;
}

use super::CandleRepository;
use crate::core_types::Symbol;
use crate::error::Result;
use crate::models::{Candle, CandlePeriod};
use crate::money::Price;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

pub struct PgCandleRepository {
    pool: PgPool,
}

impl PgCandleRepository {
    pub fn new(pool: PgPool) -> Self {
        PgCandleRepository { pool }
    }
}

fn period_str(period: CandlePeriod) -> &'static str {
    match period {
        CandlePeriod::OneMinute => "1m",
        CandlePeriod::FiveMinutes => "5m",
        CandlePeriod::FifteenMinutes => "15m",
        CandlePeriod::OneHour => "1h",
        CandlePeriod::OneDay => "1d",
    }
}

fn row_to_candle(row: &sqlx::postgres::PgRow, symbol: String, period: CandlePeriod) -> Result<Candle> {
    Ok(Candle {
        symbol,
        period,
        open_time: row.try_get("open_time")?,
        open: Price::new(row.try_get::<Decimal, _>("open")?).unwrap_or(Price::new(Decimal::ONE).unwrap()),
        high: Price::new(row.try_get::<Decimal, _>("high")?).unwrap_or(Price::new(Decimal::ONE).unwrap()),
        low: Price::new(row.try_get::<Decimal, _>("low")?).unwrap_or(Price::new(Decimal::ONE).unwrap()),
        close: Price::new(row.try_get::<Decimal, _>("close")?).unwrap_or(Price::new(Decimal::ONE).unwrap()),
        volume: row.try_get::<i64, _>("volume")? as u64,
        is_flat: row.try_get("is_flat")?,
    })
}

#[async_trait]
impl CandleRepository for PgCandleRepository {
    async fn save_candle(&self, candle: Candle) -> Result<()> {
        sqlx::query(
            "INSERT INTO candles (symbol, period, open_time, open, high, low, close, volume, is_flat)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (symbol, period, open_time) DO UPDATE SET
               high = EXCLUDED.high, low = EXCLUDED.low, close = EXCLUDED.close,
               volume = EXCLUDED.volume, is_flat = EXCLUDED.is_flat",
        )
        .bind(&candle.symbol)
        .bind(period_str(candle.period))
        .bind(candle.open_time)
        .bind(candle.open.inner())
        .bind(candle.high.inner())
        .bind(candle.low.inner())
        .bind(candle.close.inner())
        .bind(candle.volume as i64)
        .bind(candle.is_flat)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_candles(
        &self,
        symbol: &Symbol,
        period: CandlePeriod,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            "SELECT * FROM candles WHERE symbol = $1 AND period = $2 AND open_time >= $3 AND open_time < $4
             ORDER BY open_time ASC",
        )
        .bind(symbol)
        .bind(period_str(period))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|r| row_to_candle(r, symbol.clone(), period)).collect()
    }

    async fn latest_candle(&self, symbol: &Symbol, period: CandlePeriod) -> Result<Option<Candle>> {
        let row = sqlx::query(
            "SELECT * FROM candles WHERE symbol = $1 AND period = $2 ORDER BY open_time DESC LIMIT 1",
        )
        .bind(symbol)
        .bind(period_str(period))
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_candle(&r, symbol.clone(), period)).transpose()
    }
}

use super::CandleRepository;
use crate::core_types::Symbol;
use crate::error::Result;
use crate::models::{Candle, CandlePeriod};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

pub struct InMemoryCandleRepository {
    candles: Mutex<Vec<Candle>>,
}

impl InMemoryCandleRepository {
    pub fn new() -> Self {
        InMemoryCandleRepository {
            candles: Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryCandleRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CandleRepository for InMemoryCandleRepository {
    async fn save_candle(&self, candle: Candle) -> Result<()> {
        let mut candles = self.candles.lock().unwrap();
        if let Some(existing) = candles.iter_mut().find(|c| {
            c.symbol == candle.symbol && c.period == candle.period && c.open_time == candle.open_time
        }) {
            *existing = candle;
        } else {
            candles.push(candle);
        }
        Ok(())
    }

    async fn get_candles(
        &self,
        symbol: &Symbol,
        period: CandlePeriod,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let candles = self.candles.lock().unwrap();
        let mut out: Vec<Candle> = candles
            .iter()
            .filter(|c| &c.symbol == symbol && c.period == period && c.open_time >= from && c.open_time < to)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.open_time);
        Ok(out)
    }

    async fn latest_candle(&self, symbol: &Symbol, period: CandlePeriod) -> Result<Option<Candle>> {
        let candles = self.candles.lock().unwrap();
        Ok(candles
            .iter()
            .filter(|c| &c.symbol == symbol && c.period == period)
            .max_by_key(|c| c.open_time)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Price;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn save_candle_upserts_by_open_time() {
        let repo = InMemoryCandleRepository::new();
        let t = Utc::now();
        let c1 = Candle::open_new("XYZ".into(), CandlePeriod::OneMinute, t, Price::new(dec!(10.00)).unwrap());
        repo.save_candle(c1.clone()).await.unwrap();
        let mut c2 = c1.clone();
        c2.apply_trade(Price::new(dec!(12.00)).unwrap(), 3);
        repo.save_candle(c2).await.unwrap();

        let latest = repo.latest_candle(&"XYZ".to_string(), CandlePeriod::OneMinute).await.unwrap().unwrap();
        assert_eq!(latest.close.inner(), dec!(12.00));
        assert_eq!(latest.volume, 3);
    }
}

//! CandleBuilder
//!
//! Consumes trade batches off the market-data-update queue and maintains
//! one in-memory accumulator per `(symbol, period)`. On bucket rollover
//! the closed candle is persisted and a fresh accumulator opens for the
//! next bucket. Each of the five periods (1m, 5m, 15m, 1h, 1d) keeps its
//! own independent accumulator, updated directly from every trade rather
//! than re-derived from the 1-minute base candle.

use crate::broadcaster::Broadcaster;
use crate::core_types::BatchId;
use crate::error::Result;
use crate::messages::{MarketDataJob, MarketEvent};
use crate::models::{Candle, CandlePeriod};
use crate::money::Price;
use crate::persistence::CandleRepository;
use crate::queue::WorkQueue;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use tracing::{debug, info, warn};

fn floor_to_period(ts: DateTime<Utc>, period: CandlePeriod) -> DateTime<Utc> {
    let secs = period.duration().num_seconds();
    let epoch = ts.timestamp();
    let floored = epoch - epoch.rem_euclid(secs);
    DateTime::from_timestamp(floored, 0).unwrap_or(ts)
}

pub struct CandleBuilder {
    symbol: String,
    repo: Arc<dyn CandleRepository>,
    queue: Arc<WorkQueue>,
    broadcaster: Arc<Broadcaster>,
    accumulators: DashMap<CandlePeriod, Mutex<Candle>>,
    /// Batch ids already folded into a candle this run, so a redelivered
    /// at-least-once job is not double-counted.
    seen_batches: Mutex<HashSet<BatchId>>,
}

impl CandleBuilder {
    pub fn new(symbol: String, repo: Arc<dyn CandleRepository>, queue: Arc<WorkQueue>, broadcaster: Arc<Broadcaster>) -> Self {
        CandleBuilder {
            symbol,
            repo,
            queue,
            broadcaster,
            accumulators: DashMap::new(),
            seen_batches: Mutex::new(HashSet::new()),
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                job = self.queue.market_data_update.pop() => {
                    let attempts = job.attempts;
                    let payload = job.payload.clone();
                    if let Err(err) = self.process(payload).await {
                        warn!(attempts, error = %err, "market data job failed, scheduling retry");
                        self.queue.market_data_update.retry_or_fail(job);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("candle builder shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn process(&self, job: MarketDataJob) -> Result<()> {
        let batch = job.batch;
        {
            let mut seen = self.seen_batches.lock().unwrap();
            if !seen.insert(batch.batch_id) {
                debug!(batch_id = batch.batch_id, "duplicate market data batch, skipping");
                return Ok(());
            }
        }

        for trade in &batch.trades {
            for period in CandlePeriod::all() {
                self.apply_trade_to_period(period, trade.executed_at, trade.price, trade.qty)
                    .await?;
            }
        }
        Ok(())
    }

    async fn apply_trade_to_period(
        &self,
        period: CandlePeriod,
        at: DateTime<Utc>,
        price: Price,
        qty: u64,
    ) -> Result<()> {
        let bucket_open = floor_to_period(at, period);
        let entry = self
            .accumulators
            .entry(period)
            .or_insert_with(|| Mutex::new(Candle::open_new(self.symbol.clone(), period, bucket_open, price)));

        let (rolled_closed, current, is_new_candle) = {
            let mut candle = entry.lock().unwrap();
            if candle.open_time == bucket_open {
                candle.apply_trade(price, qty);
                (None, candle.clone(), false)
            } else {
                // Trade belongs to a new bucket; close the current one
                // and start fresh.
                let closed = candle.clone();
                *candle = Candle::open_new(self.symbol.clone(), period, bucket_open, price);
                candle.apply_trade(price, qty);
                (Some(closed), candle.clone(), true)
            }
        };

        if let Some(closed) = rolled_closed {
            self.repo.save_candle(closed).await?;
        }
        self.broadcaster.publish(
            &self.symbol,
            MarketEvent::KlineUpdate { period, candle: current.clone(), is_new_candle },
        );
        if period == CandlePeriod::OneDay {
            self.publish_market_update(&current, at);
        }
        Ok(())
    }

    /// Derive a session-summary `MarketUpdate` from the running 1-day
    /// candle: last price, OHLC so far, and change versus the day's open.
    fn publish_market_update(&self, candle: &Candle, at: DateTime<Utc>) {
        let open = candle.open.inner();
        let close = candle.close.inner();
        let change = close - open;
        let change_percent = if open.is_zero() { Decimal::ZERO } else { change / open * Decimal::from(100) };
        self.broadcaster.publish(
            &self.symbol,
            MarketEvent::MarketUpdate {
                symbol: self.symbol.clone(),
                last_price: candle.close,
                open: candle.open,
                high: candle.high,
                low: candle.low,
                volume: candle.volume,
                change,
                change_percent,
                timestamp: at,
            },
        );
    }

    /// Persist the current, still-open accumulator for every period —
    /// used on shutdown so an in-progress candle is not lost.
    pub async fn flush(&self) -> Result<()> {
        for entry in self.accumulators.iter() {
            let candle = entry.value().lock().unwrap().clone();
            self.repo.save_candle(candle).await?;
        }
        Ok(())
    }

    /// Close the current 1-minute bucket if `now` has moved past it,
    /// even with no trade to trigger the roll. Called by the gap-fill
    /// maintenance task on a timer.
    pub async fn force_roll_if_stale(&self, now: DateTime<Utc>) -> Result<()> {
        for period in CandlePeriod::all() {
            let bucket_open = floor_to_period(now, period);
            let Some(entry) = self.accumulators.get(&period) else {
                continue;
            };
            let rolled = {
                let mut candle = entry.lock().unwrap();
                if candle.open_time < bucket_open {
                    let closed = candle.clone();
                    *candle = Candle::flat(self.symbol.clone(), period, bucket_open, closed.close);
                    Some(closed)
                } else {
                    None
                }
            };
            if let Some(closed) = rolled {
                self.repo.save_candle(closed).await?;
                let flat = entry.lock().unwrap().clone();
                self.broadcaster.publish(
                    &self.symbol,
                    MarketEvent::KlineUpdate { period, candle: flat.clone(), is_new_candle: true },
                );
                if period == CandlePeriod::OneDay {
                    self.publish_market_update(&flat, now);
                }
            }
        }
        Ok(())
    }

    pub fn open_candle(&self, period: CandlePeriod) -> Option<Candle> {
        self.accumulators.get(&period).map(|e| e.lock().unwrap().clone())
    }
}

/// How far apart consecutive 1-minute buckets must be before they count
/// as a gap for [`super::gap_fill`] to backfill.
pub fn one_minute() -> ChronoDuration {
    CandlePeriod::OneMinute.duration()
}

//! Gap-fill maintenance task.
//!
//! A periodic task, grounded in `transfer::worker::RecoveryWorker::run`'s
//! loop-with-interval shape: wake on a fixed cadence, do one bounded
//! unit of work, sleep, repeat. Here the unit of work is rolling any
//! candle bucket that has gone stale with no trades, synthesizing flat
//! candles (open == high == low == close, volume 0) up to the configured
//! horizon so a quiet market still produces a continuous candle series.

use crate::candle::CandleBuilder;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub struct GapFillTask {
    builder: Arc<CandleBuilder>,
    tick_interval: Duration,
}

impl GapFillTask {
    pub fn new(builder: Arc<CandleBuilder>, tick_interval: Duration) -> Self {
        GapFillTask { builder, tick_interval }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.builder.force_roll_if_stale(Utc::now()).await {
                        error!(error = %err, "gap-fill pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("gap-fill task shutting down");
                        break;
                    }
                }
            }
        }
    }
}

//! Drains the trade-processing queue: records every trade in a settled
//! batch to the trade store and publishes one uncoalesced
//! `TradeCompleted` summary for the batch. Kept separate from the
//! MatchingEngine so a slow trade-store write never blocks the matching
//! loop.

use crate::broadcaster::Broadcaster;
use crate::messages::{MarketEvent, TradeJob};
use crate::money::weighted_average;
use crate::queue::WorkQueue;
use crate::trade_store::TradeStore;
use std::sync::Arc;
use tracing::{info, warn};

pub struct TradeProcessor {
    trade_store: Arc<dyn TradeStore>,
    broadcaster: Arc<Broadcaster>,
    queue: Arc<WorkQueue>,
    symbol: String,
}

impl TradeProcessor {
    pub fn new(trade_store: Arc<dyn TradeStore>, broadcaster: Arc<Broadcaster>, queue: Arc<WorkQueue>, symbol: String) -> Self {
        TradeProcessor { trade_store, broadcaster, queue, symbol }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                job = self.queue.trade_processing.pop() => {
                    let attempts = job.attempts;
                    let payload = job.payload.clone();
                    if let Err(err) = self.process(payload).await {
                        warn!(attempts, error = %err, "trade job failed, scheduling retry");
                        self.queue.trade_processing.retry_or_fail(job);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("trade processor shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn process(&self, job: TradeJob) -> crate::error::Result<()> {
        let batch = job.batch;
        let mut avg_price = rust_decimal::Decimal::ZERO;
        let mut qty_so_far = 0u64;
        for trade in &batch.trades {
            self.trade_store.record_trade(trade.clone()).await?;
            avg_price = weighted_average(qty_so_far, avg_price, trade.qty, trade.price.inner());
            qty_so_far += trade.qty;
        }

        let first_trade_id = batch.trades.first().map(|t| t.id).unwrap_or_default();
        self.broadcaster.publish(
            &self.symbol,
            MarketEvent::TradeCompleted {
                symbol: batch.symbol.clone(),
                batch_id: batch.batch_id,
                first_trade_id,
                avg_price: crate::money::Price::new(avg_price).unwrap_or_default(),
                total_volume: batch.total_volume,
                batch_size: batch.trades.len(),
                timestamp: batch.timestamp,
            },
        );
        Ok(())
    }
}

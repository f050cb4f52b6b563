//! Broadcaster
//!
//! Coalesces rapidly repeating events per `(symbol, kind)` behind a
//! trailing debounce window with a hard deadline, then fans the result
//! out over a `tokio::sync::broadcast` channel. `TradeCompleted` events
//! bypass coalescing entirely and are sent immediately.
//!
//! An in-process debounce map feeding a broadcast channel: accumulate
//! the latest payload per key, flush on whichever of the debounce window
//! or the hard deadline fires first. No external transport — wiring a
//! subscriber up to a network connection is the embedding gateway's job.

use crate::messages::MarketEvent;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

struct PendingSlot {
    latest: MarketEvent,
    first_seen: Instant,
    last_seen: Instant,
}

pub struct Broadcaster {
    sender: broadcast::Sender<MarketEvent>,
    pending: DashMap<(String, &'static str), PendingSlot>,
    debounce: Duration,
    max_wait: Duration,
}

impl Broadcaster {
    pub fn new(debounce: Duration, max_wait: Duration) -> (Arc<Self>, broadcast::Receiver<MarketEvent>) {
        let (sender, receiver) = broadcast::channel(1024);
        let broadcaster = Arc::new(Broadcaster {
            sender,
            pending: DashMap::new(),
            debounce,
            max_wait,
        });
        (broadcaster, receiver)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.sender.subscribe()
    }

    /// Record an event. Coalescable events update the pending slot for
    /// their `(symbol, kind)` key and are flushed later by
    /// [`Self::run_flush_loop`]; `TradeCompleted` is sent immediately.
    pub fn publish(&self, symbol: &str, event: MarketEvent) {
        match event.coalesce_key(symbol) {
            None => {
                let _ = self.sender.send(event);
            }
            Some(key) => {
                let now = Instant::now();
                self.pending
                    .entry(key)
                    .and_modify(|slot| {
                        slot.latest = event.clone();
                        slot.last_seen = now;
                    })
                    .or_insert_with(|| PendingSlot { latest: event, first_seen: now, last_seen: now });
            }
        }
    }

    /// Run forever, flushing any pending slot once it has gone quiet for
    /// `debounce` or has been pending for `max_wait`, whichever comes
    /// first. Intended to run on a short fixed-tick timer.
    pub async fn run_flush_loop(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let tick = self.debounce.min(Duration::from_millis(10)).max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(tick);
        loop {
            tokio::select! {
                _ = interval.tick() => self.flush_ready(),
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.flush_all();
                        break;
                    }
                }
            }
        }
    }

    fn flush_ready(&self) {
        let now = Instant::now();
        let ready_keys: Vec<_> = self
            .pending
            .iter()
            .filter(|entry| {
                let slot = entry.value();
                now.duration_since(slot.last_seen) >= self.debounce
                    || now.duration_since(slot.first_seen) >= self.max_wait
            })
            .map(|entry| entry.key().clone())
            .collect();
        for key in ready_keys {
            if let Some((_, slot)) = self.pending.remove(&key) {
                debug!(symbol = %key.0, kind = key.1, "flushing coalesced event");
                let _ = self.sender.send(slot.latest);
            }
        }
    }

    fn flush_all(&self) {
        let keys: Vec<_> = self.pending.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, slot)) = self.pending.remove(&key) {
                let _ = self.sender.send(slot.latest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;

    fn order_update(order_id: u64, filled_qty: u64) -> MarketEvent {
        MarketEvent::OrderUpdate {
            order_id,
            user_id: 1,
            status: OrderStatus::PartiallyFilled,
            filled_qty,
        }
    }

    #[tokio::test]
    async fn trade_completed_bypasses_coalescing() {
        let (broadcaster, mut rx) = Broadcaster::new(Duration::from_millis(50), Duration::from_millis(500));
        broadcaster.publish(
            "XYZ",
            MarketEvent::TradeCompleted {
                symbol: "XYZ".into(),
                batch_id: 1,
                first_trade_id: 1,
                avg_price: crate::money::Price::new(rust_decimal::Decimal::ONE).unwrap(),
                total_volume: 1,
                batch_size: 1,
                timestamp: chrono::Utc::now(),
            },
        );
        let received = rx.try_recv().unwrap();
        assert!(matches!(received, MarketEvent::TradeCompleted { .. }));
    }

    #[tokio::test]
    async fn repeated_order_updates_coalesce_to_the_latest() {
        let (broadcaster, mut rx) = Broadcaster::new(Duration::from_millis(20), Duration::from_millis(500));
        broadcaster.publish("XYZ", order_update(1, 1));
        broadcaster.publish("XYZ", order_update(1, 2));
        broadcaster.publish("XYZ", order_update(1, 3));

        tokio::time::sleep(Duration::from_millis(60)).await;
        broadcaster.flush_ready();

        let received = rx.try_recv().unwrap();
        match received {
            MarketEvent::OrderUpdate { filled_qty, .. } => assert_eq!(filled_qty, 3),
            _ => panic!("expected OrderUpdate"),
        }
        assert!(rx.try_recv().is_err());
    }
}

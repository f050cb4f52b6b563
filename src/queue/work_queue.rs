use super::SingleQueue;
use crate::config::EngineConfig;
use crate::messages::{MarketDataJob, OrderJob, TradeJob};

/// The three named queues, each independently backed off and each with
/// its own failed-jobs partition.
pub struct WorkQueue {
    pub order_processing: SingleQueue<OrderJob>,
    pub trade_processing: SingleQueue<TradeJob>,
    pub market_data_update: SingleQueue<MarketDataJob>,
}

impl WorkQueue {
    pub fn new(config: &EngineConfig) -> Self {
        fn make<T: Clone>(config: &EngineConfig) -> SingleQueue<T> {
            SingleQueue::new(
                config.retry_max_attempts,
                config.retry_backoff_base,
                config.retry_backoff_factor,
            )
        }
        WorkQueue {
            order_processing: make(config),
            trade_processing: make(config),
            market_data_update: make(config),
        }
    }
}

//! Job payloads and broadcast event types that flow between components.

use crate::core_types::{BatchId, OrderId, TradeId, UserId};
use crate::models::{Candle, CandlePeriod, Order, Trade};
use crate::money::{Cash, Price};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Job consumed by the MatchingEngine off the order-processing queue.
#[derive(Debug, Clone)]
pub enum OrderJob {
    Submit(Order),
    Cancel { order_id: OrderId, user_id: UserId },
}

/// One incoming order's worth of trades, enqueued as a single unit after
/// a matching pass completes. Consumers dedupe on `batch_id` rather than
/// per-trade id, since redelivery replays the whole batch.
#[derive(Debug, Clone)]
pub struct TradeBatch {
    pub batch_id: BatchId,
    pub symbol: String,
    pub trades: Vec<Trade>,
    pub total_volume: u64,
    pub timestamp: DateTime<Utc>,
}

/// Job consumed by the settlement/ledger step off the trade-processing
/// queue.
#[derive(Debug, Clone)]
pub struct TradeJob {
    pub batch: TradeBatch,
}

/// Job consumed by the CandleBuilder off the market-data-update queue.
#[derive(Debug, Clone)]
pub struct MarketDataJob {
    pub batch: TradeBatch,
}

/// Events broadcast to subscribers. `TradeCompleted` is always emitted
/// uncoalesced; the others go through the debounce window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum MarketEvent {
    OrderUpdate {
        order_id: OrderId,
        user_id: UserId,
        status: crate::models::OrderStatus,
        filled_qty: u64,
    },
    /// Summary of one settled batch: weighted-average price across the
    /// batch's trades, total volume, and the number of trades it held.
    TradeCompleted {
        symbol: String,
        batch_id: BatchId,
        /// Id of the first trade in the batch, for clients correlating
        /// this summary against individual `PriceUpdate` ticks.
        first_trade_id: TradeId,
        avg_price: Price,
        total_volume: u64,
        batch_size: usize,
        timestamp: DateTime<Utc>,
    },
    /// Per-trade tick, coalescable since only the latest price matters to
    /// a subscriber that isn't keeping a full tape.
    PriceUpdate {
        symbol: String,
        price: Price,
        volume: u64,
        trade_id: TradeId,
        timestamp: DateTime<Utc>,
    },
    /// Session summary derived from the running 1-day candle: last price,
    /// OHLC so far, and the change versus the day's open.
    MarketUpdate {
        symbol: String,
        last_price: Price,
        open: Price,
        high: Price,
        low: Price,
        volume: u64,
        change: Decimal,
        change_percent: Decimal,
        timestamp: DateTime<Utc>,
    },
    BalanceUpdate {
        user_id: UserId,
        cash_avail: Cash,
        cash_frozen: Cash,
    },
    /// A candle accumulator changed. `is_new_candle` is true when this
    /// update opened a fresh bucket (the prior one just closed), false
    /// when it's an in-place update to the still-open candle.
    KlineUpdate {
        period: CandlePeriod,
        candle: Candle,
        is_new_candle: bool,
    },
}

impl MarketEvent {
    /// The `(symbol, kind)` coalescing key used by the Broadcaster's
    /// debounce window. `TradeCompleted` has no coalescing key since it
    /// is never coalesced.
    pub fn coalesce_key(&self, symbol: &str) -> Option<(String, &'static str)> {
        match self {
            MarketEvent::OrderUpdate { .. } => Some((symbol.to_string(), "order_update")),
            MarketEvent::PriceUpdate { .. } => Some((symbol.to_string(), "price_update")),
            MarketEvent::MarketUpdate { .. } => Some((symbol.to_string(), "market_update")),
            MarketEvent::BalanceUpdate { .. } => Some((symbol.to_string(), "balance_update")),
            MarketEvent::KlineUpdate { .. } => Some((symbol.to_string(), "kline_update")),
            MarketEvent::TradeCompleted { .. } => None,
        }
    }
}

//! Order, trade and candle domain types.

use crate::core_types::{OrderId, TradeId, UserId};
use crate::money::{Cash, Price};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderMethod {
    Limit,
    Market,
}

/// Lifecycle state of an order. Terminal states are `Filled` and
/// `Cancelled` — once reached, no further transition is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub side: Side,
    pub method: OrderMethod,
    /// Limit price. `None` for market orders.
    pub price: Option<Price>,
    pub qty: u64,
    pub filled_qty: u64,
    pub status: OrderStatus,
    /// Weighted-average fill price across all trades so far, `None` until
    /// the first fill.
    pub avg_fill_price: Option<Price>,
    pub created_at: DateTime<Utc>,
    /// Monotonic tiebreaker for price-time priority, assigned at
    /// acceptance time. Distinct from `id` so a future multi-writer
    /// sequence source cannot collide with identifiers.
    pub seq: u64,
    /// Cash reserved at submission: `limitPrice × qty` for a BUY LIMIT,
    /// the caller's entire available cash for a BUY MARKET, zero for a
    /// SELL. Fixed for the order's lifetime.
    pub reserved_cash: Cash,
    /// Cumulative cash actually spent across this order's fills
    /// (`Σ fillQty × fillPrice`). Always `≤ reserved_cash` for a BUY.
    pub consumed_cash: Cash,
}

impl Order {
    pub fn remaining_qty(&self) -> u64 {
        self.qty - self.filled_qty
    }

    pub fn is_resting(&self) -> bool {
        matches!(self.status, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }

    /// Cash still tied up by this order's reservation that has not yet
    /// been spent on a fill — what a cancel or a market-order finalize
    /// must release.
    pub fn unspent_reserved_cash(&self) -> Cash {
        self.reserved_cash.checked_sub(self.consumed_cash).unwrap_or(Cash::ZERO)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub price: Price,
    pub qty: u64,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    pub fn notional(&self) -> Cash {
        self.price.times_qty(self.qty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandlePeriod {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    OneHour,
    OneDay,
}

impl CandlePeriod {
    pub fn duration(self) -> chrono::Duration {
        match self {
            CandlePeriod::OneMinute => chrono::Duration::minutes(1),
            CandlePeriod::FiveMinutes => chrono::Duration::minutes(5),
            CandlePeriod::FifteenMinutes => chrono::Duration::minutes(15),
            CandlePeriod::OneHour => chrono::Duration::hours(1),
            CandlePeriod::OneDay => chrono::Duration::days(1),
        }
    }

    pub fn all() -> [CandlePeriod; 5] {
        [
            CandlePeriod::OneMinute,
            CandlePeriod::FiveMinutes,
            CandlePeriod::FifteenMinutes,
            CandlePeriod::OneHour,
            CandlePeriod::OneDay,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub period: CandlePeriod,
    pub open_time: DateTime<Utc>,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: u64,
    /// True for a gap-filled candle with no trades: open == high == low ==
    /// close, carried forward from the prior close.
    pub is_flat: bool,
}

impl Candle {
    pub fn open_new(symbol: String, period: CandlePeriod, open_time: DateTime<Utc>, price: Price) -> Self {
        Candle {
            symbol,
            period,
            open_time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0,
            is_flat: false,
        }
    }

    pub fn flat(symbol: String, period: CandlePeriod, open_time: DateTime<Utc>, carried_close: Price) -> Self {
        Candle {
            symbol,
            period,
            open_time,
            open: carried_close,
            high: carried_close,
            low: carried_close,
            close: carried_close,
            volume: 0,
            is_flat: true,
        }
    }

    pub fn apply_trade(&mut self, price: Price, qty: u64) {
        if price.inner() > self.high.inner() {
            self.high = price;
        }
        if price.inner() < self.low.inner() {
            self.low = price;
        }
        self.close = price;
        self.volume += qty;
        self.is_flat = false;
    }
}

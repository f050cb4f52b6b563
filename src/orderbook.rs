//! In-memory resting order book for one symbol.
//!
//! A `BTreeMap<Decimal, VecDeque<RestingOrder>>` per side. `Decimal`
//! orders natively, so bids are simply iterated in reverse to get
//! best-price-first; no encoding trick is needed to flip the ordering.

use crate::core_types::{OrderId, UserId};
use crate::money::Price;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone)]
pub struct RestingOrder {
    pub id: OrderId,
    pub user_id: UserId,
    pub remaining_qty: u64,
    pub seq: u64,
}

#[derive(Debug, Default)]
pub struct OrderBook {
    bids: BTreeMap<rust_decimal::Decimal, VecDeque<RestingOrder>>,
    asks: BTreeMap<rust_decimal::Decimal, VecDeque<RestingOrder>>,
    /// order_id -> (price, is_bid) for O(1) cancel-by-id.
    index: FxHashMap<OrderId, (rust_decimal::Decimal, bool)>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next_back().copied().and_then(Price::new)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied().and_then(Price::new)
    }

    pub fn spread(&self) -> Option<rust_decimal::Decimal> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => Some(ask.inner() - bid.inner()),
            _ => None,
        }
    }

    /// Rest an order at `price` on the given side.
    pub fn rest_order(&mut self, price: Price, order: RestingOrder, is_bid: bool) {
        let id = order.id;
        let book = if is_bid { &mut self.bids } else { &mut self.asks };
        book.entry(price.inner()).or_default().push_back(order);
        self.index.insert(id, (price.inner(), is_bid));
    }

    /// Best-priced queue on the requested side, front-of-queue first.
    pub fn best_queue_mut(&mut self, is_bid: bool) -> Option<(&mut VecDeque<RestingOrder>, rust_decimal::Decimal)> {
        if is_bid {
            let price = *self.bids.keys().next_back()?;
            Some((self.bids.get_mut(&price).unwrap(), price))
        } else {
            let price = *self.asks.keys().next()?;
            Some((self.asks.get_mut(&price).unwrap(), price))
        }
    }

    /// Remove a resting order by id, wherever it sits. No-op if absent
    /// (idempotent cancel).
    pub fn remove_order_by_id(&mut self, id: OrderId) -> bool {
        let Some((price, is_bid)) = self.index.remove(&id) else {
            return false;
        };
        let book = if is_bid { &mut self.bids } else { &mut self.asks };
        if let Some(queue) = book.get_mut(&price) {
            queue.retain(|o| o.id != id);
            if queue.is_empty() {
                book.remove(&price);
            }
        }
        true
    }

    pub fn reduce_order_qty(&mut self, id: OrderId, new_remaining: u64) {
        let Some(&(price, is_bid)) = self.index.get(&id) else {
            return;
        };
        let book = if is_bid { &mut self.bids } else { &mut self.asks };
        if let Some(queue) = book.get_mut(&price) {
            if let Some(o) = queue.iter_mut().find(|o| o.id == id) {
                o.remaining_qty = new_remaining;
            }
        }
    }

    /// Aggregate quantity resting at exactly `price` on the given side.
    pub fn qty_at_price(&self, price: Price, is_bid: bool) -> u64 {
        let book = if is_bid { &self.bids } else { &self.asks };
        book.get(&price.inner())
            .map(|q| q.iter().map(|o| o.remaining_qty).sum())
            .unwrap_or(0)
    }

    /// Top `levels` price levels aggregated by quantity, best price
    /// first on each side.
    pub fn depth(&self, levels: usize) -> (Vec<(Price, u64)>, Vec<(Price, u64)>) {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(levels)
            .filter_map(|(p, q)| Price::new(*p).map(|price| (price, q.iter().map(|o| o.remaining_qty).sum())))
            .collect();
        let asks = self
            .asks
            .iter()
            .take(levels)
            .filter_map(|(p, q)| Price::new(*p).map(|price| (price, q.iter().map(|o| o.remaining_qty).sum())))
            .collect();
        (bids, asks)
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Scan `is_bid_side` price levels, best first, and within each
    /// level front-to-back, for the first resting order NOT owned by
    /// `exclude_user`. This is the self-trade prevention mechanism: the
    /// submitting user's own resting orders are excluded from matching
    /// consideration entirely rather than causing a reject, but they are
    /// left resting untouched (not removed, not reordered).
    pub fn peek_match(&self, is_bid_side: bool, exclude_user: UserId) -> Option<(rust_decimal::Decimal, RestingOrder)> {
        let book = if is_bid_side { &self.bids } else { &self.asks };
        let levels: Box<dyn Iterator<Item = (&rust_decimal::Decimal, &VecDeque<RestingOrder>)>> = if is_bid_side {
            Box::new(book.iter().rev())
        } else {
            Box::new(book.iter())
        };
        for (price, queue) in levels {
            if let Some(order) = queue.iter().find(|o| o.user_id != exclude_user) {
                return Some((*price, order.clone()));
            }
        }
        None
    }
}

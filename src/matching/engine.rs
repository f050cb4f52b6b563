//! MatchingEngine
//!
//! A single task owns the order book for the symbol and drains the
//! order-processing queue one job at a time — the single-writer-per-symbol
//! model named in the design notes' concurrency section. All settlement
//! against the ledger happens from inside this loop, so there is never a
//! race between "the book changed" and "the account changed" for the
//! same fill.
//!
//! Price-time priority, self-trade exclusion and partial-fill handling
//! all happen inside the single crossing loop in `process_submit`,
//! built around `Decimal` prices and an async ledger rather than a
//! synchronous in-process balance.

use crate::broadcaster::Broadcaster;
use crate::core_types::TradeId;
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::messages::{MarketDataJob, MarketEvent, OrderJob, TradeBatch, TradeJob};
use crate::models::{Order, OrderMethod, OrderStatus, Side, Trade};
use crate::order_store::OrderStore;
use crate::orderbook::{OrderBook, RestingOrder};
use crate::queue::WorkQueue;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct MatchingEngine {
    symbol: String,
    book: Mutex<OrderBook>,
    ledger: Arc<dyn Ledger>,
    order_store: Arc<dyn OrderStore>,
    queue: Arc<WorkQueue>,
    broadcaster: Arc<Broadcaster>,
    next_trade_id: AtomicU64,
    next_batch_id: AtomicU64,
}

impl MatchingEngine {
    pub fn new(
        symbol: String,
        ledger: Arc<dyn Ledger>,
        order_store: Arc<dyn OrderStore>,
        queue: Arc<WorkQueue>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        MatchingEngine {
            symbol,
            book: Mutex::new(OrderBook::new()),
            ledger,
            order_store,
            queue,
            broadcaster,
            next_trade_id: AtomicU64::new(1),
            next_batch_id: AtomicU64::new(1),
        }
    }

    fn publish_order_update(&self, order: &Order) {
        self.broadcaster.publish(
            &self.symbol,
            MarketEvent::OrderUpdate {
                order_id: order.id,
                user_id: order.user_id,
                status: order.status,
                filled_qty: order.filled_qty,
            },
        );
    }

    async fn publish_balance_update(&self, user_id: crate::core_types::UserId) -> Result<()> {
        let account = self.ledger.get_account(user_id).await?;
        self.broadcaster.publish(
            &self.symbol,
            MarketEvent::BalanceUpdate {
                user_id,
                cash_avail: account.cash_avail,
                cash_frozen: account.cash_frozen,
            },
        );
        Ok(())
    }

    /// Drain the order-processing queue forever. Intended to run as a
    /// single dedicated task; `shutdown` resolves when the caller's
    /// `tokio::sync::watch` cancellation signal fires.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                job = self.queue.order_processing.pop() => {
                    let attempts = job.attempts;
                    let payload = job.payload.clone();
                    if let Err(err) = self.process(payload).await {
                        warn!(attempts, error = %err, "order job failed, scheduling retry");
                        self.queue.order_processing.retry_or_fail(job);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("matching engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn process(&self, job: OrderJob) -> Result<()> {
        match job {
            OrderJob::Submit(order) => self.process_submit(order).await,
            OrderJob::Cancel { order_id, user_id } => self.process_cancel(order_id, user_id).await,
        }
    }

    async fn process_cancel(&self, order_id: crate::core_types::OrderId, user_id: crate::core_types::UserId) -> Result<()> {
        let order = self.order_store.get_order(order_id).await?;
        if order.status.is_terminal() {
            return Ok(());
        }
        let mut book = self.book.lock().await;
        book.remove_order_by_id(order_id);
        drop(book);

        let remaining = order.remaining_qty();
        match order.side {
            Side::Buy => {
                self.ledger
                    .release_cash_clamped(user_id, order.unspent_reserved_cash())
                    .await?;
            }
            Side::Sell => {
                self.ledger.release_shares(user_id, remaining).await?;
            }
        }
        self.order_store.cancel_order(order_id).await?;
        let cancelled = self.order_store.get_order(order_id).await?;
        self.publish_order_update(&cancelled);
        self.publish_balance_update(user_id).await?;
        Ok(())
    }

    async fn process_submit(&self, mut incoming: Order) -> Result<()> {
        let is_bid = incoming.side == Side::Buy;
        let opposite_is_bid_side = !is_bid;
        let mut book = self.book.lock().await;
        let mut trades = Vec::new();

        loop {
            if incoming.remaining_qty() == 0 {
                break;
            }
            let Some((price, resting)) = book.peek_match(opposite_is_bid_side, incoming.user_id) else {
                break;
            };
            if let Some(limit) = incoming.price {
                let crosses = if is_bid { price >= limit.inner() } else { price <= limit.inner() };
                if !crosses {
                    break;
                }
            }

            let fill_qty = incoming.remaining_qty().min(resting.remaining_qty);
            let fill_price = crate::money::Price::new(price)
                .ok_or_else(|| Error::Invariant("resting price was non-positive".into()))?;

            drop(book);
            let trade = self
                .settle_fill(&mut incoming, resting.id, resting.user_id, fill_qty, fill_price)
                .await?;
            trades.push(trade);
            book = self.book.lock().await;

            let new_remaining = resting.remaining_qty - fill_qty;
            if new_remaining == 0 {
                book.remove_order_by_id(resting.id);
            } else {
                book.reduce_order_qty(resting.id, new_remaining);
            }
        }

        if incoming.remaining_qty() > 0 {
            match incoming.method {
                OrderMethod::Limit => {
                    let price = incoming.price.ok_or_else(|| {
                        Error::Invariant("limit order missing price at rest time".into())
                    })?;
                    book.rest_order(
                        price,
                        RestingOrder {
                            id: incoming.id,
                            user_id: incoming.user_id,
                            remaining_qty: incoming.remaining_qty(),
                            seq: incoming.seq,
                        },
                        is_bid,
                    );
                }
                OrderMethod::Market => {
                    // Unfilled remainder of a market order does not rest;
                    // release its reservation and cancel it.
                    drop(book);
                    let remaining = incoming.remaining_qty();
                    match incoming.side {
                        Side::Buy => {
                            self.ledger
                                .release_cash_clamped(incoming.user_id, incoming.unspent_reserved_cash())
                                .await?;
                        }
                        Side::Sell => {
                            self.ledger.release_shares(incoming.user_id, remaining).await?;
                        }
                    }
                    self.order_store.cancel_order(incoming.id).await?;
                    let cancelled = self.order_store.get_order(incoming.id).await?;
                    self.publish_order_update(&cancelled);
                    self.publish_balance_update(incoming.user_id).await?;
                }
            }
        }

        self.enqueue_trade_batch(trades);
        Ok(())
    }

    /// Step 5 of the submit pipeline: if the matching pass produced any
    /// trades, enqueue exactly one batch job carrying all of them.
    fn enqueue_trade_batch(&self, trades: Vec<Trade>) {
        if trades.is_empty() {
            return;
        }
        let total_volume = trades.iter().map(|t| t.qty).sum();
        let batch = TradeBatch {
            batch_id: self.next_batch_id.fetch_add(1, AtomicOrdering::SeqCst),
            symbol: self.symbol.clone(),
            trades,
            total_volume,
            timestamp: Utc::now(),
        };
        self.queue.trade_processing.push(TradeJob { batch: batch.clone() }, 0);
        self.queue.market_data_update.push(MarketDataJob { batch }, 0);
    }

    #[allow(clippy::too_many_arguments)]
    async fn settle_fill(
        &self,
        incoming: &mut Order,
        maker_order_id: crate::core_types::OrderId,
        maker_user_id: crate::core_types::UserId,
        qty: u64,
        price: crate::money::Price,
    ) -> Result<Trade> {
        let (buyer_id, seller_id, buy_order_id, sell_order_id) = if incoming.side == Side::Buy {
            (incoming.user_id, maker_user_id, incoming.id, maker_order_id)
        } else {
            (maker_user_id, incoming.user_id, maker_order_id, incoming.id)
        };

        let notional = price.times_qty(qty);

        // Buyer: remove frozen cash at the resting (maker) price, not the
        // taker's possibly worse limit price — price improvement accrues
        // to the buyer and its unused reservation is released on cancel
        // or on full fill at a better average.
        self.ledger.settle_cash_debit(buyer_id, notional).await?;
        self.ledger.settle_share_debit(seller_id, qty).await?;
        self.ledger.settle_cash_credit(seller_id, notional).await?;
        self.ledger
            .settle_share_credit_with_cost(buyer_id, qty, price)
            .await?;

        self.order_store.apply_fill(buy_order_id, qty, price).await?;
        self.order_store.apply_fill(sell_order_id, qty, price).await?;
        let buy_order = self.order_store.get_order(buy_order_id).await?;
        let sell_order = self.order_store.get_order(sell_order_id).await?;
        self.publish_order_update(&buy_order);
        self.publish_order_update(&sell_order);
        self.publish_balance_update(buyer_id).await?;
        self.publish_balance_update(seller_id).await?;

        incoming.filled_qty += qty;
        incoming.status = if incoming.filled_qty == incoming.qty {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        // The buyer side accumulates consumed_cash; sync back into the
        // taker's in-flight copy so a market buy's residual release at
        // the end of process_submit sees the up-to-date figure.
        if incoming.side == Side::Buy {
            incoming.consumed_cash = buy_order.consumed_cash;
        }

        let trade_id: TradeId = self.next_trade_id.fetch_add(1, AtomicOrdering::SeqCst);
        let trade = Trade {
            id: trade_id,
            buy_order_id,
            sell_order_id,
            buyer_id,
            seller_id,
            price,
            qty,
            executed_at: Utc::now(),
        };

        self.broadcaster.publish(
            &self.symbol,
            MarketEvent::PriceUpdate {
                symbol: self.symbol.clone(),
                price,
                volume: qty,
                trade_id,
                timestamp: trade.executed_at,
            },
        );

        Ok(trade)
    }
}

impl std::fmt::Debug for MatchingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingEngine").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::InMemoryLedger;
    use crate::order_store::memory::InMemoryOrderStore;
    use rust_decimal_macros::dec;

    fn make_order(id: u64, user_id: u64, side: Side, price: rust_decimal::Decimal, qty: u64, seq: u64) -> Order {
        let limit_price = crate::money::Price::new(price).unwrap();
        let reserved_cash = match side {
            Side::Buy => limit_price.times_qty(qty),
            Side::Sell => crate::money::Cash::ZERO,
        };
        Order {
            id,
            user_id,
            side,
            method: OrderMethod::Limit,
            price: Some(limit_price),
            qty,
            filled_qty: 0,
            status: OrderStatus::Open,
            avg_fill_price: None,
            created_at: Utc::now(),
            seq,
            reserved_cash,
            consumed_cash: crate::money::Cash::ZERO,
        }
    }

    async fn new_test_engine() -> (MatchingEngine, Arc<InMemoryLedger>, Arc<InMemoryOrderStore>) {
        let ledger = Arc::new(InMemoryLedger::new());
        let store = Arc::new(InMemoryOrderStore::new());
        let config = crate::config::EngineConfig::from_env();
        let queue = Arc::new(WorkQueue::new(&config));
        let (broadcaster, _rx) = crate::broadcaster::Broadcaster::new(
            std::time::Duration::from_millis(50),
            std::time::Duration::from_millis(500),
        );
        let engine = MatchingEngine::new("XYZ".into(), ledger.clone(), store.clone(), queue, broadcaster);
        (engine, ledger, store)
    }

    #[tokio::test]
    async fn crossing_limit_orders_match_at_maker_price() {
        let (engine, ledger, store) = new_test_engine().await;
        ledger.seed_cash(2, crate::money::Cash::new(dec!(1000.00)).unwrap());
        ledger.seed_shares(1, 10, crate::money::Price::new(dec!(1.0000)).unwrap());

        let sell = make_order(1, 1, Side::Sell, dec!(10.0000), 5, 1);
        store.create_order(sell.clone()).await.unwrap();
        ledger.reserve_shares(1, 5).await.unwrap();
        engine.process_submit(sell).await.unwrap();

        let buy = make_order(2, 2, Side::Buy, dec!(11.0000), 5, 2);
        store.create_order(buy.clone()).await.unwrap();
        ledger
            .reserve_cash(2, crate::money::Price::new(dec!(11.0000)).unwrap().times_qty(5))
            .await
            .unwrap();
        engine.process_submit(buy).await.unwrap();

        let filled_buy = store.get_order(2).await.unwrap();
        let filled_sell = store.get_order(1).await.unwrap();
        assert_eq!(filled_buy.status, OrderStatus::Filled);
        assert_eq!(filled_sell.status, OrderStatus::Filled);
        assert_eq!(filled_buy.avg_fill_price.unwrap().inner(), dec!(10.0000));

        let seller_account = ledger.get_account(1).await.unwrap();
        assert_eq!(seller_account.cash_avail.inner(), dec!(50.00));
        let buyer_position = ledger.get_position(2).await.unwrap();
        assert_eq!(buyer_position.shares_avail, 5);
    }

    #[tokio::test]
    async fn non_crossing_limit_order_rests() {
        let (engine, ledger, store) = new_test_engine().await;
        ledger.seed_cash(1, crate::money::Cash::new(dec!(1000.00)).unwrap());
        let buy = make_order(1, 1, Side::Buy, dec!(9.0000), 5, 1);
        store.create_order(buy.clone()).await.unwrap();
        ledger
            .reserve_cash(1, crate::money::Price::new(dec!(9.0000)).unwrap().times_qty(5))
            .await
            .unwrap();
        engine.process_submit(buy).await.unwrap();

        let order = store.get_order(1).await.unwrap();
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.filled_qty, 0);
    }

    #[tokio::test]
    async fn self_trade_is_excluded_resting_order_stays_open() {
        let (engine, ledger, store) = new_test_engine().await;
        ledger.seed_shares(1, 10, crate::money::Price::new(dec!(1.0000)).unwrap());
        ledger.seed_cash(1, crate::money::Cash::new(dec!(1000.00)).unwrap());

        let sell = make_order(1, 1, Side::Sell, dec!(10.0000), 5, 1);
        store.create_order(sell.clone()).await.unwrap();
        ledger.reserve_shares(1, 5).await.unwrap();
        engine.process_submit(sell).await.unwrap();

        // Same user submits a crossing buy; it must not match its own
        // resting sell.
        let buy = make_order(2, 1, Side::Buy, dec!(11.0000), 5, 2);
        store.create_order(buy.clone()).await.unwrap();
        ledger
            .reserve_cash(1, crate::money::Price::new(dec!(11.0000)).unwrap().times_qty(5))
            .await
            .unwrap();
        engine.process_submit(buy).await.unwrap();

        let resting_sell = store.get_order(1).await.unwrap();
        let resting_buy = store.get_order(2).await.unwrap();
        assert_eq!(resting_sell.status, OrderStatus::Open);
        assert_eq!(resting_buy.status, OrderStatus::Open);
        assert_eq!(resting_sell.filled_qty, 0);
        assert_eq!(resting_buy.filled_qty, 0);
    }
}

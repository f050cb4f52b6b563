//! Submission
//!
//! Validates an incoming order request, reserves the resources it needs
//! from the [`Ledger`], creates the order row, and enqueues it for the
//! matching engine — then returns immediately without waiting for a
//! match.

use crate::core_types::{OrderId, UserId};
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::messages::OrderJob;
use crate::models::{Order, OrderMethod, OrderStatus, Side};
use crate::money::{Cash, Price};
use crate::order_store::OrderStore;
use crate::queue::WorkQueue;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

pub struct NewOrderRequest {
    pub user_id: UserId,
    pub side: Side,
    pub method: OrderMethod,
    pub price: Option<Price>,
    pub qty: u64,
}

pub struct Submission {
    ledger: Arc<dyn Ledger>,
    order_store: Arc<dyn OrderStore>,
    queue: Arc<WorkQueue>,
    next_order_id: AtomicU64,
    next_seq: AtomicU64,
}

impl Submission {
    pub fn new(ledger: Arc<dyn Ledger>, order_store: Arc<dyn OrderStore>, queue: Arc<WorkQueue>) -> Self {
        Submission {
            ledger,
            order_store,
            queue,
            next_order_id: AtomicU64::new(1),
            next_seq: AtomicU64::new(1),
        }
    }

    fn validate(req: &NewOrderRequest) -> Result<()> {
        if req.qty == 0 {
            return Err(Error::Validation("qty must be greater than zero".into()));
        }
        match req.method {
            OrderMethod::Limit if req.price.is_none() => {
                Err(Error::Validation("limit orders require a price".into()))
            }
            OrderMethod::Market if req.price.is_some() => {
                Err(Error::Validation("market orders must not specify a price".into()))
            }
            _ => Ok(()),
        }
    }

    /// Validate, reserve, persist and enqueue a new order. Returns the
    /// assigned order id. The caller does not wait for the order to
    /// match; progress is observed via the order's status or the
    /// broadcast subscription.
    pub async fn submit(&self, req: NewOrderRequest) -> Result<OrderId> {
        Self::validate(&req)?;

        let reserved_cash = match req.side {
            Side::Buy => match req.method {
                OrderMethod::Limit => {
                    // Validated above: a limit order always carries a price.
                    let price = req.price.expect("limit order missing price after validate");
                    let amount = price.times_qty(req.qty);
                    self.ledger.reserve_cash(req.user_id, amount).await?;
                    amount
                }
                OrderMethod::Market => self.ledger.reserve_all_cash(req.user_id).await?,
            },
            Side::Sell => {
                self.ledger.reserve_shares(req.user_id, req.qty).await?;
                Cash::ZERO
            }
        };

        let id = self.next_order_id.fetch_add(1, AtomicOrdering::SeqCst);
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
        let order = Order {
            id,
            user_id: req.user_id,
            side: req.side,
            method: req.method,
            price: req.price,
            qty: req.qty,
            filled_qty: 0,
            status: OrderStatus::Open,
            avg_fill_price: None,
            created_at: Utc::now(),
            seq,
            reserved_cash,
            consumed_cash: Cash::ZERO,
        };

        self.order_store.create_order(order.clone()).await?;
        self.queue.order_processing.push(OrderJob::Submit(order), 0);
        Ok(id)
    }

    /// Cancel a resting order. Releases whatever portion of the original
    /// reservation is still unfilled. Idempotent: cancelling an
    /// already-cancelled order succeeds without effect.
    pub async fn cancel(&self, order_id: OrderId, user_id: UserId) -> Result<()> {
        let order = self.order_store.get_order(order_id).await?;
        if order.user_id != user_id {
            return Err(Error::Forbidden(format!(
                "user {user_id} may not cancel order {order_id} owned by {}",
                order.user_id
            )));
        }
        if order.status.is_terminal() {
            return Ok(());
        }
        self.queue
            .order_processing
            .push(OrderJob::Cancel { order_id, user_id }, 1);
        Ok(())
    }
}

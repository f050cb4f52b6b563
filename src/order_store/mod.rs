//! Order storage
//!
//! The system of record for order rows: creation, state transitions
//! (fill/cancel), and the two read paths the rest of the system needs —
//! a single user's order/trade history, and the resting book ordered by
//! price-time priority for engine warm-start and depth queries.

pub mod memory;
pub mod postgres;

use crate::core_types::{OrderId, UserId};
use crate::error::Result;
use crate::models::{Order, OrderStatus, Side};
use async_trait::async_trait;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Atomically create a resting order row in `Open` status. Fails with
    /// `Conflict` if `id` already exists.
    async fn create_order(&self, order: Order) -> Result<()>;

    async fn get_order(&self, id: OrderId) -> Result<Order>;

    /// Apply a fill: increase `filled_qty`, update `avg_fill_price`, and
    /// move status to `PartiallyFilled` or `Filled`. Fails with
    /// `Invariant` if the order is already terminal.
    async fn apply_fill(&self, id: OrderId, fill_qty: u64, fill_price: crate::money::Price) -> Result<()>;

    /// Transition an order to `Cancelled`. A no-op success (not an
    /// error) if the order is already `Cancelled` — cancellation is
    /// idempotent per the terminality invariant.
    async fn cancel_order(&self, id: OrderId) -> Result<()>;

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Resting orders on one side, ordered price-time priority: best
    /// price first (descending for bids, ascending for asks), then
    /// ascending `seq` within a price level.
    async fn list_resting_by_side(&self, side: Side) -> Result<Vec<Order>>;
}

pub fn is_resting(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Open | OrderStatus::PartiallyFilled)
}

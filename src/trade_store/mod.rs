//! Trade history storage — the read side behind `list_my_trades`. Every
//! trade the MatchingEngine produces is appended here by the
//! trade-processing queue consumer, independent of candle aggregation.

pub mod memory;
pub mod postgres;

use crate::core_types::UserId;
use crate::error::Result;
use crate::models::Trade;
use async_trait::async_trait;

#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn record_trade(&self, trade: Trade) -> Result<()>;

    /// Trades where `user_id` was buyer or seller, most recent first.
    async fn list_trades_for_user(&self, user_id: UserId) -> Result<Vec<Trade>>;
}

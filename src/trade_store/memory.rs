use super::TradeStore;
use crate::core_types::UserId;
use crate::error::Result;
use crate::models::Trade;
use async_trait::async_trait;
use std::sync::Mutex;

pub struct InMemoryTradeStore {
    trades: Mutex<Vec<Trade>>,
}

impl InMemoryTradeStore {
    pub fn new() -> Self {
        InMemoryTradeStore { trades: Mutex::new(Vec::new()) }
    }
}

impl Default for InMemoryTradeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TradeStore for InMemoryTradeStore {
    async fn record_trade(&self, trade: Trade) -> Result<()> {
        self.trades.lock().unwrap().push(trade);
        Ok(())
    }

    async fn list_trades_for_user(&self, user_id: UserId) -> Result<Vec<Trade>> {
        let trades = self.trades.lock().unwrap();
        let mut out: Vec<Trade> = trades
            .iter()
            .filter(|t| t.buyer_id == user_id || t.seller_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        Ok(out)
    }
}

//! External interface.
//!
//! A plain async-function facade over the core's components — no HTTP
//! framing, no auth — wired together with plain constructors rather
//! than a decorator-driven DI container.

use crate::broadcaster::Broadcaster;
use crate::candle::gap_fill::GapFillTask;
use crate::candle::CandleBuilder;
use crate::config::EngineConfig;
use crate::core_types::{OrderId, UserId};
use crate::error::Result;
use crate::ledger::{Account, Ledger, Position};
use crate::matching::MatchingEngine;
use crate::messages::MarketEvent;
use crate::models::{Candle, CandlePeriod, Order, OrderMethod, Side, Trade};
use crate::order_store::OrderStore;
use crate::persistence::CandleRepository;
use crate::queue::WorkQueue;
use crate::submission::{NewOrderRequest, Submission};
use crate::trade_processor::TradeProcessor;
use crate::trade_store::TradeStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Everything the core needs, constructed once at startup and shared
/// behind `Arc`s.
pub struct ExchangeCore {
    pub symbol: String,
    submission: Submission,
    ledger: Arc<dyn Ledger>,
    order_store: Arc<dyn OrderStore>,
    trade_store: Arc<dyn TradeStore>,
    candle_repo: Arc<dyn CandleRepository>,
    candle_builder: Arc<CandleBuilder>,
    broadcaster: Arc<Broadcaster>,
}

/// The long-running workers a caller must spawn as tasks after
/// constructing an [`ExchangeCore`], each draining its own named queue.
pub struct CoreWorkers {
    pub matching_engine: Arc<MatchingEngine>,
    pub candle_builder: Arc<CandleBuilder>,
    pub trade_processor: Arc<TradeProcessor>,
    pub gap_fill: GapFillTask,
    pub broadcaster: Arc<Broadcaster>,
}

impl ExchangeCore {
    pub fn new(
        symbol: String,
        ledger: Arc<dyn Ledger>,
        order_store: Arc<dyn OrderStore>,
        trade_store: Arc<dyn TradeStore>,
        candle_repo: Arc<dyn CandleRepository>,
        queue: Arc<WorkQueue>,
        broadcaster: Arc<Broadcaster>,
        config: &EngineConfig,
    ) -> (Self, CoreWorkers) {
        let submission = Submission::new(ledger.clone(), order_store.clone(), queue.clone());
        let matching_engine = Arc::new(MatchingEngine::new(
            symbol.clone(),
            ledger.clone(),
            order_store.clone(),
            queue.clone(),
            broadcaster.clone(),
        ));
        let candle_builder = Arc::new(CandleBuilder::new(
            symbol.clone(),
            candle_repo.clone(),
            queue.clone(),
            broadcaster.clone(),
        ));
        let trade_processor = Arc::new(TradeProcessor::new(
            trade_store.clone(),
            broadcaster.clone(),
            queue,
            symbol.clone(),
        ));
        let gap_fill = GapFillTask::new(candle_builder.clone(), config.candle_gap_fill_tick);

        let core = ExchangeCore {
            symbol,
            submission,
            ledger,
            order_store,
            trade_store,
            candle_repo,
            candle_builder: candle_builder.clone(),
            broadcaster: broadcaster.clone(),
        };
        (core, CoreWorkers { matching_engine, candle_builder, trade_processor, gap_fill, broadcaster })
    }

    pub async fn submit_order(
        &self,
        user_id: UserId,
        side: Side,
        method: OrderMethod,
        price: Option<crate::money::Price>,
        qty: u64,
    ) -> Result<OrderId> {
        self.submission
            .submit(NewOrderRequest { user_id, side, method, price, qty })
            .await
    }

    pub async fn cancel_order(&self, order_id: OrderId, user_id: UserId) -> Result<()> {
        self.submission.cancel(order_id, user_id).await
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.order_store.get_order(order_id).await
    }

    pub async fn list_my_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        self.order_store.list_orders_for_user(user_id).await
    }

    pub async fn list_my_trades(&self, user_id: UserId) -> Result<Vec<Trade>> {
        self.trade_store.list_trades_for_user(user_id).await
    }

    pub async fn get_account(&self, user_id: UserId) -> Result<Account> {
        self.ledger.get_account(user_id).await
    }

    pub async fn get_position(&self, user_id: UserId) -> Result<Position> {
        self.ledger.get_position(user_id).await
    }

    pub async fn get_candles(
        &self,
        period: CandlePeriod,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        self.candle_repo.get_candles(&self.symbol, period, from, to).await
    }

    pub fn current_candle(&self, period: CandlePeriod) -> Option<Candle> {
        self.candle_builder.open_candle(period)
    }

    /// Subscribe to the coalesced event stream. Each call returns
    /// an independent receiver; lagged receivers silently drop old
    /// events rather than blocking publishers, per `broadcast`'s normal
    /// semantics.
    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.broadcaster.subscribe()
    }
}

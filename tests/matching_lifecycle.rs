//! End-to-end order lifecycle scenarios against the public `ExchangeCore`
//! facade, wired with the in-memory repository implementations.

use rust_decimal_macros::dec;
use single_exchange_core::api::ExchangeCore;
use single_exchange_core::broadcaster::Broadcaster;
use single_exchange_core::config::EngineConfig;
use single_exchange_core::ledger::memory::InMemoryLedger;
use single_exchange_core::messages::MarketEvent;
use single_exchange_core::models::{OrderMethod, OrderStatus, Side};
use single_exchange_core::money::{Cash, Price};
use single_exchange_core::order_store::memory::InMemoryOrderStore;
use single_exchange_core::persistence::memory::InMemoryCandleRepository;
use single_exchange_core::queue::WorkQueue;
use single_exchange_core::trade_store::memory::InMemoryTradeStore;
use std::sync::Arc;
use std::time::Duration;

fn build_core(ledger: Arc<InMemoryLedger>) -> (ExchangeCore, single_exchange_core::api::CoreWorkers) {
    let config = EngineConfig::from_env();
    let order_store = Arc::new(InMemoryOrderStore::new());
    let trade_store = Arc::new(InMemoryTradeStore::new());
    let candle_repo = Arc::new(InMemoryCandleRepository::new());
    let queue = Arc::new(WorkQueue::new(&config));
    let (broadcaster, _rx) = Broadcaster::new(config.broadcast_debounce, config.broadcast_max_wait);
    ExchangeCore::new(
        "ACME".into(),
        ledger,
        order_store,
        trade_store,
        candle_repo,
        queue,
        broadcaster,
        &config,
    )
}

async fn spawn_workers(
    workers: &single_exchange_core::api::CoreWorkers,
    shutdown: tokio::sync::watch::Receiver<bool>,
) {
    tokio::spawn(workers.matching_engine.clone().run(shutdown.clone()));
    tokio::spawn(workers.trade_processor.clone().run(shutdown.clone()));
    tokio::spawn(workers.candle_builder.clone().run(shutdown));
}

#[tokio::test]
async fn partial_fill_leaves_maker_resting_with_reduced_quantity() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.seed_shares(1, 20, Price::new(dec!(1.0000)).unwrap());
    ledger.seed_cash(2, Cash::new(dec!(1000.00)).unwrap());

    let (core, workers) = build_core(ledger);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    spawn_workers(&workers, shutdown_rx).await;

    let sell_id = core
        .submit_order(1, Side::Sell, OrderMethod::Limit, Some(Price::new(dec!(10.0000)).unwrap()), 20)
        .await
        .unwrap();
    let buy_id = core
        .submit_order(2, Side::Buy, OrderMethod::Limit, Some(Price::new(dec!(10.0000)).unwrap()), 8)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let sell_order = core.get_order(sell_id).await.unwrap();
    let buy_order = core.get_order(buy_id).await.unwrap();
    assert_eq!(buy_order.status, OrderStatus::Filled);
    assert_eq!(sell_order.status, OrderStatus::PartiallyFilled);
    assert_eq!(sell_order.filled_qty, 8);
    assert_eq!(sell_order.remaining_qty(), 12);

    let _ = shutdown_tx.send(true);
}

#[tokio::test]
async fn cancel_releases_the_remaining_reservation() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.seed_cash(1, Cash::new(dec!(500.00)).unwrap());

    let (core, workers) = build_core(ledger.clone());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    spawn_workers(&workers, shutdown_rx).await;

    let order_id = core
        .submit_order(1, Side::Buy, OrderMethod::Limit, Some(Price::new(dec!(10.0000)).unwrap()), 10)
        .await
        .unwrap();

    let account = core.get_account(1).await.unwrap();
    assert_eq!(account.cash_avail.inner(), dec!(400.00));
    assert_eq!(account.cash_frozen.inner(), dec!(100.00));

    core.cancel_order(order_id, 1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let account = core.get_account(1).await.unwrap();
    assert_eq!(account.cash_avail.inner(), dec!(500.00));
    assert_eq!(account.cash_frozen.inner(), dec!(0.00));

    let order = core.get_order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);

    let _ = shutdown_tx.send(true);
}

#[tokio::test]
async fn cancelling_someone_elses_order_is_forbidden() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.seed_cash(1, Cash::new(dec!(500.00)).unwrap());
    let (core, workers) = build_core(ledger);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    spawn_workers(&workers, shutdown_rx).await;

    let order_id = core
        .submit_order(1, Side::Buy, OrderMethod::Limit, Some(Price::new(dec!(10.0000)).unwrap()), 10)
        .await
        .unwrap();

    let err = core.cancel_order(order_id, 2).await.unwrap_err();
    assert!(matches!(err, single_exchange_core::error::Error::Forbidden(_)));

    let _ = shutdown_tx.send(true);
}

#[tokio::test]
async fn self_trade_leaves_resting_order_untouched_and_matches_the_next_best() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.seed_shares(1, 10, Price::new(dec!(1.0000)).unwrap());
    ledger.seed_cash(1, Cash::new(dec!(1000.00)).unwrap());
    ledger.seed_cash(2, Cash::new(dec!(1000.00)).unwrap());

    let (core, workers) = build_core(ledger);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    spawn_workers(&workers, shutdown_rx).await;

    // User 1 rests a sell, then submits their own crossing buy: it must
    // not trade against itself.
    let self_sell = core
        .submit_order(1, Side::Sell, OrderMethod::Limit, Some(Price::new(dec!(10.0000)).unwrap()), 5)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let own_buy = core
        .submit_order(1, Side::Buy, OrderMethod::Limit, Some(Price::new(dec!(11.0000)).unwrap()), 5)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let sell_order = core.get_order(self_sell).await.unwrap();
    assert_eq!(sell_order.status, OrderStatus::Open, "self-trade must not fill the resting order");

    // A different user's crossing buy should now match the resting sell.
    let other_buy = core
        .submit_order(2, Side::Buy, OrderMethod::Limit, Some(Price::new(dec!(11.0000)).unwrap()), 5)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let sell_order = core.get_order(self_sell).await.unwrap();
    let other_buy_order = core.get_order(other_buy).await.unwrap();
    assert_eq!(sell_order.status, OrderStatus::Filled);
    assert_eq!(other_buy_order.status, OrderStatus::Filled);

    // User 1's own resting buy (at a worse price than the trade) should
    // still be untouched, open.
    let own_buy_order = core.get_order(own_buy).await.unwrap();
    assert_eq!(own_buy_order.status, OrderStatus::Open);

    let _ = shutdown_tx.send(true);
}

#[tokio::test]
async fn market_order_remainder_is_cancelled_when_liquidity_runs_out() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.seed_shares(1, 5, Price::new(dec!(1.0000)).unwrap());
    ledger.seed_cash(2, Cash::new(dec!(10000.00)).unwrap());

    let (core, workers) = build_core(ledger);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    spawn_workers(&workers, shutdown_rx).await;

    core.submit_order(1, Side::Sell, OrderMethod::Limit, Some(Price::new(dec!(10.0000)).unwrap()), 5)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    // A market buy with a worst-case reservation price above depth.
    let buy_id = core
        .submit_order(2, Side::Buy, OrderMethod::Market, Some(Price::new(dec!(50.0000)).unwrap()), 20)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let buy_order = core.get_order(buy_id).await.unwrap();
    assert_eq!(buy_order.status, OrderStatus::Cancelled);
    assert_eq!(buy_order.filled_qty, 5);

    let account = core.get_account(2).await.unwrap();
    // Reserved 20 * 50.00 = 1000.00; settled 5 * 10.00 = 50.00; the rest
    // of the reservation is released back to available.
    assert_eq!(account.cash_avail.inner(), dec!(9950.00));
    assert_eq!(account.cash_frozen.inner(), dec!(0.00));

    let _ = shutdown_tx.send(true);
}

#[tokio::test]
async fn trade_completed_event_reaches_subscribers() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.seed_shares(1, 5, Price::new(dec!(1.0000)).unwrap());
    ledger.seed_cash(2, Cash::new(dec!(1000.00)).unwrap());

    let (core, workers) = build_core(ledger);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    spawn_workers(&workers, shutdown_rx).await;

    let mut rx = core.subscribe();

    core.submit_order(1, Side::Sell, OrderMethod::Limit, Some(Price::new(dec!(10.0000)).unwrap()), 5)
        .await
        .unwrap();
    core.submit_order(2, Side::Buy, OrderMethod::Limit, Some(Price::new(dec!(10.0000)).unwrap()), 5)
        .await
        .unwrap();

    let saw_volume = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if let Ok(MarketEvent::TradeCompleted { total_volume, .. }) = rx.recv().await {
                return total_volume;
            }
        }
    })
    .await
    .expect("trade event within timeout");
    assert_eq!(saw_volume, 5);

    let _ = shutdown_tx.send(true);
}

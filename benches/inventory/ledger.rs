use criterion::{BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use ticketbook_rs::InventoryLedger;
use ticketbook_rs::prelude::TicketTypeId;

/// Register all benchmarks for the quantity ledger.
pub fn register_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("Inventory - Ledger");

    // Uncontended reserve/release pair
    group.bench_function("reserve_release_single_thread", |b| {
        let ledger = InventoryLedger::new(TicketTypeId::new(), 1_000);
        b.iter(|| {
            black_box(ledger.reserve(1)).ok();
            black_box(ledger.release(1)).ok();
        });
    });

    // Many threads competing for the same counters until sold out
    for &threads in &[2usize, 4, 8] {
        group.bench_with_input(
            BenchmarkId::new("sell_out_contended", threads),
            &threads,
            |b, &threads| {
                b.iter_with_setup(
                    || Arc::new(InventoryLedger::with_max_attempts(TicketTypeId::new(), 10_000, u32::MAX)),
                    |ledger| {
                        let handles: Vec<_> = (0..threads)
                            .map(|_| {
                                let ledger = Arc::clone(&ledger);
                                thread::spawn(move || while ledger.sell(1).is_ok() {})
                            })
                            .collect();
                        for handle in handles {
                            let _ = handle.join();
                        }
                        assert!(ledger.is_sold_out());
                    },
                );
            },
        );
    }

    group.bench_function("snapshot", |b| {
        let ledger = InventoryLedger::new(TicketTypeId::new(), 1_000);
        let _ = ledger.reserve(10);
        b.iter(|| black_box(ledger.snapshot()));
    });

    group.finish();
}

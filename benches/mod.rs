use criterion::{criterion_group, criterion_main};

mod inventory;

use inventory::issuance::register_benchmarks as register_issuance_benchmarks;
use inventory::ledger::register_benchmarks as register_ledger_benchmarks;

// Define the benchmark groups
criterion_group!(
    benches,
    register_ledger_benchmarks,
    register_issuance_benchmarks,
);

criterion_main!(benches);

use criterion::{BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use ticketbook_rs::prelude::*;

fn setup(capacity: u32) -> (InventoryEngine, TicketTypeId, EventId, CustomerId) {
    let events = Arc::new(InMemoryEventDirectory::new());
    let customers = Arc::new(InMemoryCustomerDirectory::new());
    let event_id = EventId::new();
    let now = current_time_millis();
    events.upsert(EventInfo::published(event_id, now + 86_400_000, now + 90_000_000));
    let buyer = customers.register();
    let engine = InventoryEngine::builder(events, customers)
        .build()
        .expect("engine");
    let ticket_type = engine
        .register_ticket_type(TicketType::new(event_id, "Bench", capacity).with_order_limits(1, 100))
        .expect("ticket type");
    (engine, ticket_type.id(), event_id, buyer)
}

/// Register all benchmarks for issuance workflows.
pub fn register_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("Inventory - Issuance");

    for &quantity in &[1u32, 10, 50] {
        group.bench_with_input(
            BenchmarkId::new("issue_sale", quantity),
            &quantity,
            |b, &quantity| {
                b.iter_with_setup(
                    || setup(quantity),
                    |(engine, ticket_type_id, event_id, buyer)| {
                        let issued = engine.issue_sale(
                            SaleRequest::new(ticket_type_id, event_id, buyer).with_quantity(quantity),
                            IssueOptions::default(),
                        );
                        black_box(issued).ok();
                    },
                );
            },
        );
    }

    group.bench_function("reserve_then_sweep_100", |b| {
        b.iter_with_setup(
            || {
                let clock = Arc::new(ManualClock::new(1_000_000));
                let events = Arc::new(InMemoryEventDirectory::new());
                let customers = Arc::new(InMemoryCustomerDirectory::new());
                let event_id = EventId::new();
                events.upsert(EventInfo::published(event_id, 90_000_000, 99_000_000));
                let buyer = customers.register();
                let engine = Arc::new(
                    InventoryEngine::builder(events, customers)
                        .with_clock(clock.clone())
                        .build()
                        .expect("engine"),
                );
                let ticket_type = engine
                    .register_ticket_type(
                        TicketType::new(event_id, "Bench", 100).with_order_limits(1, 100),
                    )
                    .expect("ticket type");
                engine
                    .issue_reservation(
                        ReservationRequest::new(ticket_type.id(), event_id, buyer)
                            .with_quantity(100)
                            .with_ttl_minutes(1),
                        IssueOptions::default(),
                    )
                    .expect("reserve");
                clock.advance(120_000);
                engine
            },
            |engine| {
                let report = ReservationExpiryReaper::new(engine).sweep();
                assert_eq!(report.expired(), 100);
            },
        );
    });

    group.finish();
}

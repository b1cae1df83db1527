//! Oversell protection under parallel demand.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use ticketbook_rs::prelude::*;

fn engine_with_event() -> (Arc<InventoryEngine>, EventId, Arc<InMemoryCustomerDirectory>) {
    let events = Arc::new(InMemoryEventDirectory::new());
    let customers = Arc::new(InMemoryCustomerDirectory::new());
    let event_id = EventId::new();
    let now = current_time_millis();
    events.upsert(EventInfo::published(event_id, now + 86_400_000, now + 90_000_000));
    let engine = InventoryEngine::builder(events, customers.clone())
        .with_config(EngineConfig::default().with_ledger_max_attempts(1_000_000))
        .build()
        .expect("engine");
    (Arc::new(engine), event_id, customers)
}

#[test]
fn parallel_sales_never_exceed_capacity() {
    const CAPACITY: u32 = 20;
    const BUYERS: usize = 32;

    let (engine, event_id, customers) = engine_with_event();
    let general = engine
        .register_ticket_type(TicketType::new(event_id, "General", CAPACITY))
        .expect("ticket type");
    let refused = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..BUYERS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let refused = Arc::clone(&refused);
            let buyer = customers.register();
            let ticket_type_id = general.id();
            thread::spawn(move || {
                match engine.issue_sale(
                    SaleRequest::new(ticket_type_id, event_id, buyer),
                    IssueOptions::default(),
                ) {
                    Ok(issued) => issued,
                    Err(InventoryError::InsufficientInventory { .. }) => {
                        refused.fetch_add(1, Ordering::SeqCst);
                        Vec::new()
                    }
                    Err(other) => panic!("unexpected error: {other}"),
                }
            })
        })
        .collect();

    let issued: Vec<IssuedTicket> = handles
        .into_iter()
        .flat_map(|handle| handle.join().expect("buyer thread"))
        .collect();

    assert_eq!(issued.len(), CAPACITY as usize);
    assert_eq!(refused.load(Ordering::SeqCst), BUYERS as u32 - CAPACITY);

    let codes: HashSet<_> = issued.iter().map(|t| t.ticket.code.clone()).collect();
    assert_eq!(codes.len(), CAPACITY as usize);

    let snapshot = general.snapshot();
    assert_eq!(snapshot.sold, CAPACITY);
    assert_eq!(snapshot.available, 0);
    assert_eq!(engine.tickets_for_type(general.id()).len(), CAPACITY as usize);
}

#[test]
fn reservations_and_sales_share_one_pool() {
    const CAPACITY: u32 = 30;

    let (engine, event_id, customers) = engine_with_event();
    let general = engine
        .register_ticket_type(TicketType::new(event_id, "General", CAPACITY))
        .expect("ticket type");

    thread::scope(|scope| {
        for worker in 0..8 {
            let engine = &engine;
            let buyer = customers.register();
            let ticket_type_id = general.id();
            scope.spawn(move || {
                for _ in 0..10 {
                    let _ = if worker % 2 == 0 {
                        engine.issue_sale(
                            SaleRequest::new(ticket_type_id, event_id, buyer).with_quantity(2),
                            IssueOptions::default(),
                        )
                    } else {
                        engine.issue_reservation(
                            ReservationRequest::new(ticket_type_id, event_id, buyer),
                            IssueOptions::default(),
                        )
                    };
                }
            });
        }
    });

    let snapshot = general.snapshot();
    assert!(snapshot.reserved + snapshot.sold <= CAPACITY);
    let tickets = engine.tickets_for_type(general.id());
    let reserved = tickets
        .iter()
        .filter(|t| t.status == TicketStatus::Reserved)
        .count() as u32;
    let sold = tickets
        .iter()
        .filter(|t| t.status == TicketStatus::Sold)
        .count() as u32;
    assert_eq!(reserved, snapshot.reserved);
    assert_eq!(sold, snapshot.sold);
}

#[test]
fn ticket_types_do_not_interfere() {
    let (engine, event_id, customers) = engine_with_event();
    let floor = engine
        .register_ticket_type(TicketType::new(event_id, "Floor", 5))
        .expect("floor");
    let balcony = engine
        .register_ticket_type(TicketType::new(event_id, "Balcony", 5))
        .expect("balcony");
    let buyer = customers.register();

    engine
        .issue_sale(
            SaleRequest::new(floor.id(), event_id, buyer).with_quantity(5),
            IssueOptions::default(),
        )
        .expect("sell out floor");

    assert!(floor.is_sold_out());
    assert_eq!(balcony.snapshot().available, 5);
    assert!(
        engine
            .issue_sale(
                SaleRequest::new(balcony.id(), event_id, buyer),
                IssueOptions::default()
            )
            .is_ok()
    );
}

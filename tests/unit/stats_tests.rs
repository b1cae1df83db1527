//! Domain events delivered through the bounded stats queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticketbook_rs::prelude::*;

const NOW: u64 = 1_800_000_000_000;

fn engine_with(dispatcher: Arc<EventDispatcher>) -> (InventoryEngine, EventId, CustomerId) {
    let events = Arc::new(InMemoryEventDirectory::new());
    let customers = Arc::new(InMemoryCustomerDirectory::new());
    let event_id = EventId::new();
    events.upsert(EventInfo::published(event_id, NOW + 3_600_000, NOW + 7_200_000));
    let buyer = customers.register();
    let engine = InventoryEngine::builder(events, customers)
        .with_clock(Arc::new(ManualClock::new(NOW)))
        .with_dispatcher(dispatcher)
        .build()
        .expect("engine");
    (engine, event_id, buyer)
}

#[test]
fn lifecycle_changes_are_published_in_order() {
    let dispatcher = Arc::new(EventDispatcher::new(64));
    let (engine, event_id, buyer) = engine_with(Arc::clone(&dispatcher));
    let general = engine
        .register_ticket_type(TicketType::new(event_id, "General", 5))
        .expect("ticket type");

    let issued = engine
        .issue_sale(
            SaleRequest::new(general.id(), event_id, buyer),
            IssueOptions::default(),
        )
        .expect("sale")
        .remove(0);
    engine.cancel(issued.ticket.id, None).expect("cancel");

    let seen = Mutex::new(Vec::new());
    let delivered = dispatcher.drain_into(&|event: &InventoryEvent| {
        seen.lock().expect("lock").push(event.clone());
    });
    assert_eq!(delivered, 2);

    let seen = seen.into_inner().expect("lock");
    assert_eq!(
        seen[0],
        InventoryEvent::TicketsIssued {
            ticket_type_id: general.id(),
            ticket_ids: vec![issued.ticket.id],
            status: TicketStatus::Sold,
            at: NOW,
        }
    );
    assert_eq!(
        seen[1],
        InventoryEvent::TicketTransitioned {
            ticket_id: issued.ticket.id,
            ticket_type_id: general.id(),
            from: TicketStatus::Sold,
            to: TicketStatus::Cancelled,
            at: NOW,
        }
    );
}

#[test]
fn full_queue_never_fails_a_sale() {
    let dispatcher = Arc::new(EventDispatcher::new(1));
    let (engine, event_id, buyer) = engine_with(Arc::clone(&dispatcher));
    let general = engine
        .register_ticket_type(TicketType::new(event_id, "General", 5))
        .expect("ticket type");

    for _ in 0..3 {
        engine
            .issue_sale(
                SaleRequest::new(general.id(), event_id, buyer),
                IssueOptions::default(),
            )
            .expect("sale");
    }
    assert_eq!(dispatcher.dropped(), 2);
    assert_eq!(general.snapshot().sold, 3);
}

#[tokio::test]
async fn processor_task_feeds_the_recorder() {
    let dispatcher = Arc::new(EventDispatcher::new(64));
    let (engine, event_id, buyer) = engine_with(Arc::clone(&dispatcher));
    let general = engine
        .register_ticket_type(TicketType::new(event_id, "General", 5))
        .expect("ticket type");

    let issued_events = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&issued_events);
    let _processor = dispatcher
        .start_processor(Arc::new(move |event: &InventoryEvent| {
            if matches!(event, InventoryEvent::TicketsIssued { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }))
        .expect("processor");

    for _ in 0..2 {
        engine
            .issue_sale(
                SaleRequest::new(general.id(), event_id, buyer),
                IssueOptions::default(),
            )
            .expect("sale");
    }

    for _ in 0..100 {
        if issued_events.load(Ordering::SeqCst) == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(issued_events.load(Ordering::SeqCst), 2);
    assert_eq!(dispatcher.drain_into(&|_: &InventoryEvent| {}), 0);
}

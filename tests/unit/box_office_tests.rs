//! End-to-end flows through the public API.

use std::sync::Arc;
use ticketbook_rs::prelude::*;
use ticketbook_rs::{HOUR_MS, MINUTE_MS};

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

const NOW: u64 = 1_750_000_000_000;
const STARTS_AT: u64 = NOW + 48 * HOUR_MS;
const ENDS_AT: u64 = STARTS_AT + 4 * HOUR_MS;

struct BoxOffice {
    engine: Arc<InventoryEngine>,
    clock: Arc<ManualClock>,
    customers: Arc<InMemoryCustomerDirectory>,
    event_id: EventId,
}

fn box_office() -> BoxOffice {
    let clock = Arc::new(ManualClock::new(NOW));
    let events = Arc::new(InMemoryEventDirectory::new());
    let customers = Arc::new(InMemoryCustomerDirectory::new());
    let event_id = EventId::new();
    events.upsert(EventInfo::published(event_id, STARTS_AT, ENDS_AT));

    let engine = InventoryEngine::builder(events, customers.clone())
        .with_clock(clock.clone())
        .build()
        .expect("engine");
    BoxOffice {
        engine: Arc::new(engine),
        clock,
        customers,
        event_id,
    }
}

// ---------------------------------------------------------------------------
// Flows
// ---------------------------------------------------------------------------

#[test]
fn reserve_pay_transfer_and_admit() {
    let office = box_office();
    let vip = office
        .engine
        .register_ticket_type(
            TicketType::new(office.event_id, "VIP", 4)
                .with_pricing(Pricing::new(25_000, "EUR").with_fees(FeePolicy::new(250, 100))),
        )
        .expect("ticket type");
    let alice = office.customers.register();
    let bob = office.customers.register();

    let held = office
        .engine
        .issue_reservation(
            ReservationRequest::new(vip.id(), office.event_id, alice).with_quantity(2),
            IssueOptions::default(),
        )
        .expect("reserve");
    assert_eq!(held.len(), 2);
    assert_eq!(vip.snapshot().reserved, 2);

    office.clock.advance(5 * MINUTE_MS);
    for issued in &held {
        office
            .engine
            .complete_reservation(issued.ticket.id, alice, None)
            .expect("pay");
    }
    let snapshot = vip.snapshot();
    assert_eq!((snapshot.reserved, snapshot.sold, snapshot.available), (0, 2, 2));

    let gift = &held[1];
    let receipt = office
        .engine
        .transfer(gift.ticket.id, alice, TransferTarget::Customer(bob))
        .expect("transfer");

    office.clock.set(STARTS_AT - 30 * MINUTE_MS);
    let gate = CheckInRequest::new("gate-3").at("North");
    office
        .engine
        .check_in_by_code(&held[0].ticket.code, &held[0].secret, &gate)
        .expect("alice admitted");
    assert!(matches!(
        office
            .engine
            .check_in_by_code(&gift.ticket.code, &gift.secret, &gate),
        Err(InventoryError::SecretMismatch { .. })
    ));
    let admitted = office
        .engine
        .check_in_by_code(&gift.ticket.code, &receipt.secret, &gate)
        .expect("bob admitted");
    assert_eq!(admitted.customer_id, Some(bob));
    assert_eq!(admitted.status, TicketStatus::CheckedIn);

    let statuses: Vec<_> = office
        .engine
        .tickets_for_type(vip.id())
        .into_iter()
        .map(|ticket| ticket.status)
        .collect();
    assert_eq!(statuses, vec![TicketStatus::CheckedIn; 2]);
}

#[test]
fn abandoned_reservations_return_to_the_pool() {
    let office = box_office();
    let general = office
        .engine
        .register_ticket_type(TicketType::new(office.event_id, "General", 3))
        .expect("ticket type");
    let shopper = office.customers.register();
    let late_buyer = office.customers.register();

    let held = office
        .engine
        .issue_reservation(
            ReservationRequest::new(general.id(), office.event_id, shopper)
                .with_quantity(3)
                .with_ttl_minutes(10),
            IssueOptions::default(),
        )
        .expect("reserve all");
    assert!(general.is_sold_out());
    assert!(matches!(
        office.engine.issue_sale(
            SaleRequest::new(general.id(), office.event_id, late_buyer),
            IssueOptions::default()
        ),
        Err(InventoryError::InsufficientInventory { .. })
    ));

    office.clock.advance(10 * MINUTE_MS + 1);
    let report = ReservationExpiryReaper::new(office.engine.clone()).sweep();
    assert_eq!(report.expired(), 3);
    for issued in &held {
        assert_eq!(
            office.engine.ticket(issued.ticket.id).expect("ticket").status,
            TicketStatus::Expired
        );
    }

    let sold = office
        .engine
        .issue_sale(
            SaleRequest::new(general.id(), office.event_id, late_buyer).with_quantity(3),
            IssueOptions::default(),
        )
        .expect("capacity is back");
    assert_eq!(sold.len(), 3);
    assert!(general.is_sold_out());
}

#[test]
fn cancelled_event_stops_sales_but_not_refunds() {
    let events = Arc::new(InMemoryEventDirectory::new());
    let customers = Arc::new(InMemoryCustomerDirectory::new());
    let event_id = EventId::new();
    events.upsert(EventInfo::published(event_id, STARTS_AT, ENDS_AT));
    let engine = InventoryEngine::builder(events.clone(), customers.clone())
        .with_clock(Arc::new(ManualClock::new(NOW)))
        .build()
        .expect("engine");
    let general = engine
        .register_ticket_type(TicketType::new(event_id, "General", 10))
        .expect("ticket type");
    let buyer = customers.register();

    let sold = engine
        .issue_sale(
            SaleRequest::new(general.id(), event_id, buyer).with_quantity(2),
            IssueOptions::default(),
        )
        .expect("sale");

    assert!(events.set_status(event_id, EventStatus::Cancelled));
    assert!(matches!(
        engine.issue_sale(
            SaleRequest::new(general.id(), event_id, buyer),
            IssueOptions::default()
        ),
        Err(InventoryError::NotOnSale { .. })
    ));

    for issued in &sold {
        let refunded = engine
            .refund(issued.ticket.id, Some("event cancelled".into()))
            .expect("refund");
        assert_eq!(refunded.status, TicketStatus::Refunded);
    }
    assert_eq!(general.snapshot().available, 10);
}

#[test]
fn lookup_by_code_and_unknown_ids() {
    let office = box_office();
    let general = office
        .engine
        .register_ticket_type(TicketType::new(office.event_id, "General", 1))
        .expect("ticket type");
    let buyer = office.customers.register();
    let issued = office
        .engine
        .issue_sale(
            SaleRequest::new(general.id(), office.event_id, buyer),
            IssueOptions::default(),
        )
        .expect("sale")
        .remove(0);

    assert!(issued.ticket.code.starts_with("TKT-"));
    let found = office.engine.ticket_by_code(&issued.ticket.code).expect("by code");
    assert_eq!(found.id, issued.ticket.id);

    assert!(matches!(
        office.engine.ticket(TicketId::new()),
        Err(InventoryError::NotFound { entity: "ticket", .. })
    ));
    assert!(matches!(
        office.engine.ledger_snapshot(TicketTypeId::new()),
        Err(InventoryError::NotFound { .. })
    ));
    assert_eq!(office.engine.ticket_types_for_event(office.event_id).len(), 1);
}

//! Example walking a ticket type through a full sales day
//!
//! This example shows how to:
//! 1. Build an engine with a stats queue and start its processor task
//! 2. Sell and reserve tickets, and let the reaper reclaim an abandoned reservation
//! 3. Transfer a ticket and admit both holders at the gate

use std::sync::Arc;
use std::time::Duration;
use ticketbook_rs::prelude::*;
use ticketbook_rs::{HOUR_MS, MINUTE_MS};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), InventoryError> {
    tracing_subscriber::fmt().with_target(false).init();

    let clock = Arc::new(ManualClock::new(current_time_millis()));
    let events = Arc::new(InMemoryEventDirectory::new());
    let customers = Arc::new(InMemoryCustomerDirectory::new());
    let dispatcher = Arc::new(EventDispatcher::new(256));

    let concert = EventId::new();
    let starts_at = clock.now_millis() + 6 * HOUR_MS;
    events.upsert(EventInfo {
        reservation_duration_minutes: Some(10),
        ..EventInfo::published(concert, starts_at, starts_at + 3 * HOUR_MS)
    });

    let engine = Arc::new(
        InventoryEngine::builder(events, customers.clone())
            .with_clock(clock.clone())
            .with_dispatcher(Arc::clone(&dispatcher))
            .build()?,
    );
    let processor = dispatcher.start_processor(Arc::new(|event: &InventoryEvent| {
        if let Ok(json) = serde_json::to_string(event) {
            info!("stats: {}", json);
        }
    }));

    let floor = engine.register_ticket_type(
        TicketType::new(concert, "Floor", 4)
            .with_order_limits(1, 4)
            .with_pricing(
                Pricing::new(6_000, "EUR")
                    .with_tax_rate_bps(2_100)
                    .with_fees(FeePolicy::new(500, 75)),
            ),
    )?;

    let ana = customers.register();
    let ben = customers.register();
    let cleo = customers.register();

    // Ana buys two tickets outright
    let ana_tickets = engine.issue_sale(
        SaleRequest::new(floor.id(), concert, ana).with_quantity(2),
        IssueOptions::default(),
    )?;
    if let Some(price) = ana_tickets[0].ticket.sale.as_ref().map(|sale| &sale.price) {
        info!("Ana paid {} {} per ticket", price.total, price.currency);
    }

    // Ben holds two and walks away
    let ben_holds = engine.issue_reservation(
        ReservationRequest::new(floor.id(), concert, ben).with_quantity(2),
        IssueOptions::default(),
    )?;
    info!(
        "Ben holds {} tickets until {:?}",
        ben_holds.len(),
        ben_holds[0].ticket.reservation_expires_at()
    );

    match engine.issue_sale(
        SaleRequest::new(floor.id(), concert, cleo),
        IssueOptions::default(),
    ) {
        Err(InventoryError::InsufficientInventory { available, .. }) => {
            warn!("Cleo is turned away, {} available", available)
        }
        other => warn!("Unexpected outcome for Cleo: {:?}", other.map(|t| t.len())),
    }

    // The hold lapses; the reaper returns the units
    clock.advance(11 * MINUTE_MS);
    let reaper = ReservationExpiryReaper::new(engine.clone())
        .with_interval(Duration::from_millis(50))
        .spawn();
    tokio::time::sleep(Duration::from_millis(200)).await;
    info!("After the sweep: {:?}", floor.snapshot());

    let cleo_tickets = engine.issue_sale(
        SaleRequest::new(floor.id(), concert, cleo),
        IssueOptions::default(),
    )?;

    // Ana gives her second ticket to a friend without an account
    let receipt = engine.transfer(
        ana_tickets[1].ticket.id,
        ana,
        TransferTarget::Guest(GuestDetails {
            email: "dana@example.com".into(),
            name: Some("Dana".into()),
        }),
    )?;

    // Doors open
    clock.set(starts_at - 30 * MINUTE_MS);
    let gate = CheckInRequest::new("scanner-7").at("Main entrance");
    engine.check_in_by_code(&ana_tickets[0].ticket.code, &ana_tickets[0].secret, &gate)?;
    engine.check_in_by_code(&receipt.ticket.code, &receipt.secret, &gate)?;
    engine.check_in_by_code(&cleo_tickets[0].ticket.code, &cleo_tickets[0].secret, &gate)?;

    if let Err(err) =
        engine.check_in_by_code(&ana_tickets[1].ticket.code, &ana_tickets[1].secret, &gate)
    {
        warn!("Old secret after transfer rejected: {}", err);
    }

    for ticket in engine.tickets_for_type(floor.id()) {
        info!("{} {} holder={:?}", ticket.code, ticket.status, ticket.customer_id);
    }
    info!("Final counters: {:?}", floor.snapshot());

    if reaper.shutdown().await.is_err() {
        warn!("Reaper task panicked");
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(engine);
    if let Some(processor) = processor {
        processor.abort();
    }
    info!("Dropped stats events: {}", dispatcher.dropped());
    Ok(())
}

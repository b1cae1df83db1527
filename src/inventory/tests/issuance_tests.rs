use super::test_helpers::{ConstantCode, EVENT_END, EVENT_START, Fixture, T0};
use crate::inventory::codes::{CodeGenerator, RandomCodeGenerator, secret_matches};
use crate::inventory::collaborators::{
    EventInfo, EventStatus, InMemoryCustomerDirectory, InMemoryEventDirectory,
};
use crate::inventory::config::EngineConfig;
use crate::inventory::engine::InventoryEngine;
use crate::inventory::error::InventoryError;
use crate::inventory::events::{EventDispatcher, InventoryEvent};
use crate::inventory::fees::{FeePolicy, Pricing};
use crate::inventory::ledger::LedgerCounters;
use crate::inventory::orchestrator::{IssueOptions, ReservationRequest, SaleRequest};
use crate::inventory::ticket::{AttendeeInfo, TicketStatus};
use crate::inventory::ticket_type::TicketType;
use crate::inventory::store::TicketStore;
use crate::inventory::types::{CustomerId, EventId, OrderId, TicketId, TicketTypeId};
use crate::utils::{MINUTE_MS, ManualClock};
use std::sync::{Arc, Mutex, OnceLock};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Direct sale
// ---------------------------------------------------------------------------

#[test]
fn test_issue_sale_creates_sold_ticket() {
    let fx = Fixture::new(5);
    let order = OrderId::new();
    let issued = fx
        .engine
        .issue_sale(
            fx.sale()
                .with_order(order)
                .with_attendee(AttendeeInfo {
                    name: Some("Ada".into()),
                    email: Some("ada@example.com".into()),
                }),
            IssueOptions::default(),
        )
        .expect("sale");

    assert_eq!(issued.len(), 1);
    let ticket = &issued[0].ticket;
    assert_eq!(ticket.status, TicketStatus::Sold);
    assert_eq!(ticket.customer_id, Some(fx.buyer));
    assert_eq!(ticket.order_id, Some(order));
    assert!(ticket.code.starts_with("TKT-"));
    assert!(secret_matches(&ticket.secret_hash, &issued[0].secret));
    assert_eq!(
        ticket.attendee.as_ref().and_then(|a| a.name.as_deref()),
        Some("Ada")
    );

    let snapshot = fx.engine.ledger_snapshot(fx.ticket_type.id()).expect("snapshot");
    assert_eq!(snapshot.sold, 1);
    assert_eq!(snapshot.available, 4);
    assert_eq!(fx.engine.ticket(ticket.id).expect("stored"), *ticket);
}

#[test]
fn test_issue_sale_stamps_price() {
    let fx = Fixture::new(5);
    let vip = fx
        .engine
        .register_ticket_type(
            TicketType::new(fx.event_id, "VIP", 2).with_pricing(
                Pricing::new(10_000, "EUR")
                    .with_tax_rate_bps(2_100)
                    .with_fees(FeePolicy::new(500, 50)),
            ),
        )
        .expect("register");

    let issued = fx
        .engine
        .issue_sale(
            SaleRequest::new(vip.id(), fx.event_id, fx.buyer),
            IssueOptions::default(),
        )
        .expect("sale");
    let price = &issued[0].ticket.sale.as_ref().expect("sale record").price;
    assert_eq!(price.base_price, 10_000);
    assert_eq!(price.tax, 2_100);
    assert_eq!(price.fee, 550);
    assert_eq!(price.total, 12_650);
    assert_eq!(price.currency, "EUR");
}

#[test]
fn test_multi_ticket_sale_debits_once() {
    let fx = Fixture::new(10);
    let issued = fx
        .engine
        .issue_sale(fx.sale().with_quantity(4), IssueOptions::default())
        .expect("sale");

    assert_eq!(issued.len(), 4);
    let mut codes: Vec<_> = issued.iter().map(|i| i.ticket.code.clone()).collect();
    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), 4);

    let snapshot = fx.ticket_type.snapshot();
    assert_eq!(snapshot.sold, 4);
    assert_eq!(snapshot.version, 1);
}

#[test]
fn test_ten_concurrent_sales_then_sold_out() {
    let fx = Fixture::new(10);

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..10)
            .map(|_| {
                scope.spawn(|| fx.engine.issue_sale(fx.sale(), IssueOptions::default()))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().expect("thread").is_ok());
        }
    });

    let snapshot = fx.ticket_type.snapshot();
    assert_eq!(snapshot.sold, 10);
    assert_eq!(snapshot.available, 0);
    assert!(snapshot.is_sold_out);
    assert_eq!(fx.engine.tickets_for_type(fx.ticket_type.id()).len(), 10);

    let err = fx
        .engine
        .issue_sale(fx.sale(), IssueOptions::default())
        .expect_err("eleventh");
    assert!(matches!(
        err,
        InventoryError::InsufficientInventory {
            requested: 1,
            available: 0,
            ..
        }
    ));
    assert_eq!(fx.engine.store().len(), 10);
}

// ---------------------------------------------------------------------------
// Validation before the debit
// ---------------------------------------------------------------------------

#[test]
fn test_rejected_requests_leave_ledger_untouched() {
    let fx = Fixture::new(3);
    let before = fx.ticket_type.snapshot();

    let zero = fx.engine.issue_sale(fx.sale().with_quantity(0), IssueOptions::default());
    assert_eq!(zero, Err(InventoryError::InvalidQuantity { quantity: 0 }));

    let too_many = fx.engine.issue_sale(fx.sale().with_quantity(21), IssueOptions::default());
    assert!(matches!(too_many, Err(InventoryError::OrderLimit { quantity: 21, .. })));

    let stranger = SaleRequest::new(fx.ticket_type.id(), fx.event_id, CustomerId::new());
    let unknown = fx.engine.issue_sale(stranger, IssueOptions::default());
    assert!(matches!(
        unknown,
        Err(InventoryError::NotFound {
            entity: "customer",
            ..
        })
    ));

    let other_event = SaleRequest::new(fx.ticket_type.id(), EventId::new(), fx.buyer);
    assert!(matches!(
        fx.engine.issue_sale(other_event, IssueOptions::default()),
        Err(InventoryError::NotFound { entity: "event", .. })
    ));

    assert_eq!(fx.ticket_type.snapshot(), before);
    assert!(fx.engine.store().is_empty());
}

#[test]
fn test_inactive_event_or_type_is_not_on_sale() {
    let fx = Fixture::new(3);
    fx.events.set_status(fx.event_id, EventStatus::Draft);
    assert!(matches!(
        fx.engine.issue_sale(fx.sale(), IssueOptions::default()),
        Err(InventoryError::NotOnSale { .. })
    ));

    fx.events.set_status(fx.event_id, EventStatus::Live);
    fx.engine
        .set_ticket_type_active(fx.ticket_type.id(), false)
        .expect("deactivate");
    assert!(matches!(
        fx.engine.issue_sale(fx.sale(), IssueOptions::default()),
        Err(InventoryError::NotOnSale { .. })
    ));

    fx.engine
        .set_ticket_type_active(fx.ticket_type.id(), true)
        .expect("activate");
    assert!(fx.engine.issue_sale(fx.sale(), IssueOptions::default()).is_ok());
}

#[test]
fn test_register_requires_known_event_and_unique_id() {
    let fx = Fixture::new(1);
    let orphan = TicketType::new(EventId::new(), "Orphan", 5);
    assert!(matches!(
        fx.engine.register_ticket_type(orphan),
        Err(InventoryError::NotFound { entity: "event", .. })
    ));

    let twin = TicketType::new(fx.event_id, "Twin", 5).with_id(fx.ticket_type.id());
    assert!(matches!(
        fx.engine.register_ticket_type(twin),
        Err(InventoryError::Duplicate { .. })
    ));
}

#[test]
fn test_register_keeps_counters_committed_before_registration() {
    let fx = Fixture::new(1);
    let late = TicketType::new(fx.event_id, "Late", 5);
    late.ledger().sell(3).expect("sold offline");
    let before = late.ledger().counters();

    let registered = fx.engine.register_ticket_type(late).expect("register");
    assert_eq!(registered.ledger().counters(), before);
    let snapshot = fx
        .engine
        .ledger_snapshot(registered.id())
        .expect("snapshot");
    assert_eq!((snapshot.sold, snapshot.available), (3, 2));

    let oversell = SaleRequest::new(registered.id(), fx.event_id, fx.buyer).with_quantity(3);
    assert!(matches!(
        fx.engine.issue_sale(oversell, IssueOptions::default()),
        Err(InventoryError::InsufficientInventory {
            requested: 3,
            available: 2,
            ..
        })
    ));
}

#[test]
fn test_register_restored_ticket_type() {
    let fx = Fixture::new(1);
    let counters = LedgerCounters {
        total: 8,
        reserved: 2,
        sold: 5,
        version: 17,
    };
    let restored = TicketType::from_counters(TicketTypeId::new(), fx.event_id, "Restored", counters)
        .expect("restore");
    let registered = fx.engine.register_ticket_type(restored).expect("register");

    assert_eq!(registered.ledger().counters(), counters);
    assert_eq!(registered.ledger().max_attempts(), fx.engine.config().ledger_max_attempts);
    let sale = || SaleRequest::new(registered.id(), fx.event_id, fx.buyer);
    assert_eq!(
        fx.engine
            .issue_sale(sale(), IssueOptions::default())
            .map(|t| t.len()),
        Ok(1)
    );
    assert!(matches!(
        fx.engine.issue_sale(sale(), IssueOptions::default()),
        Err(InventoryError::InsufficientInventory { .. })
    ));
}

#[test]
fn test_set_total_quantity() {
    let fx = Fixture::new(2);
    fx.sell_one();
    let snapshot = fx
        .engine
        .set_total_quantity(fx.ticket_type.id(), 5)
        .expect("grow");
    assert_eq!(snapshot.available, 4);

    assert_eq!(
        fx.engine.set_total_quantity(fx.ticket_type.id(), 0),
        Err(InventoryError::CapacityBelowCommitted {
            requested: 0,
            committed: 1
        })
    );
}

// ---------------------------------------------------------------------------
// Reservations
// ---------------------------------------------------------------------------

#[test]
fn test_reservation_ttl_fallback_chain() {
    let fx = Fixture::new(10);

    let explicit = fx.reserve_one(5);
    assert_eq!(
        explicit.ticket.reservation_expires_at(),
        Some(T0 + 5 * MINUTE_MS)
    );

    let fallback = fx
        .engine
        .issue_reservation(fx.reservation(), IssueOptions::default())
        .expect("reservation")
        .remove(0);
    assert_eq!(
        fallback.ticket.reservation_expires_at(),
        Some(T0 + 15 * MINUTE_MS)
    );

    let mut event = EventInfo::published(fx.event_id, EVENT_START, EVENT_END);
    event.reservation_duration_minutes = Some(30);
    fx.events.upsert(event);
    let event_default = fx
        .engine
        .issue_reservation(fx.reservation(), IssueOptions::default())
        .expect("reservation")
        .remove(0);
    assert_eq!(
        event_default.ticket.reservation_expires_at(),
        Some(T0 + 30 * MINUTE_MS)
    );

    let hold = event_default.ticket.reservation.expect("hold");
    assert_eq!(hold.reserved_by, Some(fx.buyer));
    assert_eq!(hold.reserved_at, T0);
    assert_eq!(fx.ticket_type.snapshot().reserved, 3);
}

#[test]
fn test_reservations_disabled() {
    let fx = Fixture::new(10);
    let mut event = EventInfo::published(fx.event_id, EVENT_START, EVENT_END);
    event.allow_reservations = false;
    fx.events.upsert(event);

    let err = fx
        .engine
        .issue_reservation(fx.reservation(), IssueOptions::default())
        .expect_err("disabled");
    assert!(matches!(err, InventoryError::ReservationsDisabled { .. }));
    assert_eq!(fx.ticket_type.snapshot().reserved, 0);
}

#[test]
fn test_reservation_quantity_reserves_each_ticket() {
    let fx = Fixture::new(10);
    let issued = fx
        .engine
        .issue_reservation(
            ReservationRequest::new(fx.ticket_type.id(), fx.event_id, fx.buyer).with_quantity(3),
            IssueOptions::default(),
        )
        .expect("reservation");
    assert_eq!(issued.len(), 3);
    assert!(issued.iter().all(|i| i.ticket.status == TicketStatus::Reserved));
    assert_eq!(fx.ticket_type.snapshot().reserved, 3);
    assert_eq!(fx.engine.store().due_reservations(u64::MAX, 10).len(), 3);
}

// ---------------------------------------------------------------------------
// Compensation
// ---------------------------------------------------------------------------

#[test]
fn test_code_minting_failure_releases_reservation() {
    let fx = Fixture::with_generator(10, Arc::new(ConstantCode("TKT-DUP")));
    fx.sell_one();
    let before = fx.ticket_type.snapshot();

    let err = fx
        .engine
        .issue_reservation(fx.reservation(), IssueOptions::default())
        .expect_err("code taken");
    assert_eq!(err, InventoryError::CodeSpaceExhausted { attempts: 16 });

    let after = fx.ticket_type.snapshot();
    assert_eq!(after.reserved, before.reserved);
    assert_eq!(after.available, before.available);
    assert_eq!(fx.engine.store().len(), 1);
}

#[test]
fn test_partial_multi_ticket_failure_removes_everything() {
    let fx = Fixture::with_generator(10, Arc::new(ConstantCode("TKT-ONLY")));

    let err = fx
        .engine
        .issue_reservation(fx.reservation().with_quantity(3), IssueOptions::default())
        .expect_err("second code collides");
    assert!(matches!(err, InventoryError::CodeSpaceExhausted { .. }));

    assert_eq!(fx.ticket_type.snapshot().reserved, 0);
    assert!(fx.engine.store().is_empty());
    // The code claimed for the first ticket was released again.
    assert!(fx.engine.store().claim_code("TKT-ONLY", TicketId::new()));
}

struct CancelOnMint {
    token: CancellationToken,
    inner: RandomCodeGenerator,
}

impl CodeGenerator for CancelOnMint {
    fn next_code(&self) -> String {
        self.token.cancel();
        self.inner.next_code()
    }
}

#[test]
fn test_cancellation_after_debit_compensates() {
    let token = CancellationToken::new();
    let fx = Fixture::with_generator(
        5,
        Arc::new(CancelOnMint {
            token: token.clone(),
            inner: RandomCodeGenerator::default(),
        }),
    );

    let err = fx
        .engine
        .issue_sale(
            fx.sale().with_quantity(2),
            IssueOptions::default().with_cancellation(token),
        )
        .expect_err("cancelled mid-flight");
    assert_eq!(err, InventoryError::Cancelled);
    assert_eq!(fx.ticket_type.snapshot().sold, 0);
    assert!(fx.engine.store().is_empty());
}

#[test]
fn test_cancelled_before_start_never_debits() {
    let fx = Fixture::new(5);
    let token = CancellationToken::new();
    token.cancel();
    let err = fx
        .engine
        .issue_sale(fx.sale(), IssueOptions::default().with_cancellation(token))
        .expect_err("cancelled");
    assert_eq!(err, InventoryError::Cancelled);
    assert_eq!(fx.ticket_type.snapshot().version, 0);
}

struct SlowMint {
    clock: Arc<ManualClock>,
}

impl CodeGenerator for SlowMint {
    fn next_code(&self) -> String {
        self.clock.advance(10_000);
        RandomCodeGenerator::default().next_code()
    }
}

#[test]
fn test_deadline_after_debit_compensates() {
    let clock = Arc::new(ManualClock::new(T0));
    let events = Arc::new(InMemoryEventDirectory::new());
    let customers = Arc::new(InMemoryCustomerDirectory::new());
    let event_id = EventId::new();
    events.upsert(EventInfo::published(event_id, EVENT_START, EVENT_END));
    let buyer = customers.register();
    let engine = InventoryEngine::builder(events, customers)
        .with_clock(clock.clone())
        .with_code_generator(Arc::new(SlowMint {
            clock: clock.clone(),
        }))
        .build()
        .expect("engine");
    let general = engine
        .register_ticket_type(TicketType::new(event_id, "General", 5))
        .expect("register");

    let err = engine
        .issue_reservation(
            ReservationRequest::new(general.id(), event_id, buyer),
            IssueOptions::default(),
        )
        .expect_err("too slow");
    assert_eq!(
        err,
        InventoryError::DeadlineExceeded {
            now: T0 + 10_000,
            deadline: T0 + 5_000,
        }
    );
    assert_eq!(general.snapshot().reserved, 0);
    assert!(engine.store().is_empty());
}

/// Drains the sold counter while minting, so undoing the debit underflows.
struct SabotagedMint {
    ticket_type: OnceLock<Arc<TicketType>>,
}

impl CodeGenerator for SabotagedMint {
    fn next_code(&self) -> String {
        if let Some(ticket_type) = self.ticket_type.get() {
            let _ = ticket_type.ledger().refund_sold(1);
        }
        "TKT-TAKEN".to_string()
    }
}

#[test]
fn test_failed_compensation_is_escalated() {
    let generator = Arc::new(SabotagedMint {
        ticket_type: OnceLock::new(),
    });
    let fx = Fixture::with_generator(5, generator.clone());
    let _ = generator.ticket_type.set(Arc::clone(&fx.ticket_type));
    assert!(fx.engine.store().claim_code("TKT-TAKEN", TicketId::new()));

    let err = fx
        .engine
        .issue_sale(fx.sale(), IssueOptions::default())
        .expect_err("sabotaged");
    assert!(err.requires_operator());
    let InventoryError::CompensationFailed { cause, details } = err else {
        panic!("expected CompensationFailed");
    };
    assert!(cause.contains("could not mint"));
    assert!(details.contains("CancelSold"));
}

// ---------------------------------------------------------------------------
// Stats events
// ---------------------------------------------------------------------------

#[test]
fn test_issuance_events_are_published() {
    let dispatcher = Arc::new(EventDispatcher::new(16));
    let events = Arc::new(InMemoryEventDirectory::new());
    let customers = Arc::new(InMemoryCustomerDirectory::new());
    let event_id = EventId::new();
    events.upsert(EventInfo::published(event_id, EVENT_START, EVENT_END));
    let buyer = customers.register();
    let engine = InventoryEngine::builder(events, customers)
        .with_config(EngineConfig::default().with_code_max_attempts(2))
        .with_clock(Arc::new(ManualClock::new(T0)))
        .with_code_generator(Arc::new(ConstantCode("TKT-ONE")))
        .with_dispatcher(dispatcher.clone())
        .build()
        .expect("engine");
    let general = engine
        .register_ticket_type(TicketType::new(event_id, "General", 5))
        .expect("register");

    engine
        .issue_sale(SaleRequest::new(general.id(), event_id, buyer), IssueOptions::default())
        .expect("first sale");
    let _ = engine.issue_sale(SaleRequest::new(general.id(), event_id, buyer), IssueOptions::default());

    let seen = Mutex::new(Vec::new());
    dispatcher.drain_into(&|event: &InventoryEvent| {
        seen.lock().expect("lock").push(event.clone());
    });
    let seen = seen.into_inner().expect("lock");
    assert_eq!(seen.len(), 2);
    assert!(matches!(
        seen[0],
        InventoryEvent::TicketsIssued {
            status: TicketStatus::Sold,
            ..
        }
    ));
    assert!(matches!(
        seen[1],
        InventoryEvent::IssuanceCompensated { quantity: 1, .. }
    ));
}

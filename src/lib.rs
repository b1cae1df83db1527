//! # Concurrent Ticket Inventory and Lifecycle Engine
//!
//! A thread-safe inventory engine for event tickets. It tracks a finite
//! capacity per ticket type and guarantees that concurrent reservations and
//! sales never issue more tickets than that capacity, while supporting timed
//! reservations, direct sales, check-in, transfer, cancellation and refund.
//!
//! ## Key Features
//!
//! - **No-Oversell Ledger**: The `total`, `reserved` and `sold` counters of a
//!   ticket type live in one atomic cell. Every operation is a single
//!   compare-and-swap of the whole block, retried with backoff up to a bound,
//!   so `reserved + sold <= total` holds after every mutation. `available` is
//!   always derived, never stored.
//!
//! - **Closed Ticket State Machine**: `available`, `reserved`, `sold`,
//!   `checked_in`, `cancelled`, `refunded` and `expired`, with the legal
//!   transitions expressed as an exhaustive match. Transitions that move
//!   capacity call the ledger before the ticket's own status flips.
//!
//! - **Timed Reservations**: Reservations carry a deadline; the
//!   `ReservationExpiryReaper` sweeps due reservations in deadline order,
//!   one ticket lock at a time, and returns their units to the pool.
//!
//! - **Issuance with Compensation**: Direct sale and reservation workflows
//!   debit the ledger once, mint collision-checked public codes and hashed gate
//!   secrets, and undo every completed step if a later one fails, is
//!   cancelled or runs past its deadline.
//!
//! - **Gate Validation**: Tickets are validated by public code plus secret;
//!   check-in happens once inside the event's admission window, later
//!   re-validations only bump a counter.
//!
//! - **Bounded Stats Queue**: Domain events are published to a bounded Tokio
//!   channel without ever blocking or failing the inventory path.
//!
//! ## Concurrency Model
//!
//! | Shared state | Mechanism |
//! |---|---|
//! | Ticket-type counters | `crossbeam::atomic::AtomicCell` + bounded CAS retry |
//! | Ticket rows | `DashMap` entry lock per row |
//! | Public codes | atomic vacant-entry claim |
//! | Reservation deadlines | `crossbeam_skiplist::SkipSet` ordered by `(expires_at, id)` |
//!
//! Operations on one ticket type are linearizable; operations on different
//! ticket types do not coordinate at all.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ticketbook_rs::prelude::*;
//!
//! let events = Arc::new(InMemoryEventDirectory::new());
//! let customers = Arc::new(InMemoryCustomerDirectory::new());
//! let clock = Arc::new(ManualClock::new(1_000_000));
//!
//! let event_id = EventId::new();
//! events.upsert(EventInfo::published(event_id, 10_000_000, 20_000_000));
//! let buyer = customers.register();
//!
//! let engine = InventoryEngine::builder(events, customers)
//!     .with_clock(clock)
//!     .build()
//!     .unwrap();
//! let general = engine
//!     .register_ticket_type(TicketType::new(event_id, "General", 2))
//!     .unwrap();
//!
//! let issued = engine
//!     .issue_sale(
//!         SaleRequest::new(general.id(), event_id, buyer).with_quantity(2),
//!         IssueOptions::default(),
//!     )
//!     .unwrap();
//! assert_eq!(issued.len(), 2);
//! assert!(general.is_sold_out());
//!
//! let again = engine.issue_sale(
//!     SaleRequest::new(general.id(), event_id, buyer),
//!     IssueOptions::default(),
//! );
//! assert!(matches!(again, Err(InventoryError::InsufficientInventory { .. })));
//! ```
//!
//! ## Feature Flags
//!
//! - `metrics`: counters for issued tickets, failed issuances,
//!   compensations, expired reservations and ledger contention through the
//!   `metrics` facade.
//!
//! ## Status
//! This project is currently in active development and is not yet suitable for production use.

pub mod inventory;

pub mod prelude;
mod utils;

pub use inventory::{
    CheckInRequest, CustomerDirectory, EngineConfig, EventDirectory, EventDispatcher, EventInfo,
    EventStatus, FeePolicy, InMemoryCustomerDirectory, InMemoryEventDirectory,
    InMemoryTicketStore, InventoryEngine, InventoryError, InventoryEvent, InventoryLedger,
    IssueOptions, IssuedTicket, LedgerSnapshot, Pricing, ReservationExpiryReaper,
    ReservationRequest, SaleRequest, StatsRecorder, SweepReport, Ticket, TicketCodeIssuer,
    TicketStateMachine, TicketStatus, TicketStore, TicketType,
};
pub use utils::{Clock, HOUR_MS, MINUTE_MS, ManualClock, SystemClock, current_time_millis};

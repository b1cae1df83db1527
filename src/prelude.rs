/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Prelude module that re-exports commonly used types and traits.
//!
//! ```rust
//! use ticketbook_rs::prelude::*;
//! ```
//!
//! This imports the engine, its requests and the collaborator traits with
//! their in-memory implementations.

// Engine and configuration
pub use crate::inventory::{EngineConfig, InventoryEngine, InventoryEngineBuilder, InventoryError};

// Issuance
pub use crate::inventory::{IssueOptions, IssuedTicket, ReservationRequest, SaleRequest};

// Ticket lifecycle
pub use crate::inventory::{
    AttendeeInfo, CheckInMethod, CheckInRequest, ExpiryOutcome, Ticket, TicketStatus,
    TransferReceipt, TransferTarget,
};

// Ticket types and the ledger
pub use crate::inventory::{
    FeePolicy, InventoryLedger, LedgerSnapshot, OrderLimits, Pricing, SaleWindow, TicketType,
};

// Identifiers
pub use crate::inventory::{CustomerId, EventId, OrderId, TicketId, TicketTypeId};

// Collaborators and storage
pub use crate::inventory::{
    CustomerDirectory, EventDirectory, EventInfo, EventStatus, GuestDetails,
    InMemoryCustomerDirectory, InMemoryEventDirectory, InMemoryTicketStore, TicketStore,
};

// Background work and stats
pub use crate::inventory::{
    EventDispatcher, InventoryEvent, ReaperHandle, ReservationExpiryReaper, StatsRecorder,
    SweepReport,
};

// Time
pub use crate::utils::{Clock, ManualClock, SystemClock, current_time_millis};

pub use tokio_util::sync::CancellationToken;

//! Ticket inventory: quantity ledger, ticket lifecycle, issuance and expiry.

/// Public codes, gate secrets and transfer tokens.
pub mod codes;
/// Event and customer lookups consumed by the engine.
pub mod collaborators;
pub mod config;
/// Registry of ticket types and the engine facade.
pub mod engine;
pub mod error;
/// Inventory domain events and the bounded stats queue.
pub mod events;
/// Fee policy and price stamping.
pub mod fees;
pub mod ledger;
/// Ticket operations after issuance: check-in, transfer, cancel, refund.
pub mod lifecycle;
/// Direct sale and reservation workflows with compensation.
pub mod orchestrator;
pub mod reaper;
pub mod state_machine;
pub mod store;
pub mod ticket;
pub mod ticket_type;
pub mod types;

mod tests;

pub use codes::{CodeGenerator, MintedCredentials, RandomCodeGenerator, TicketCodeIssuer};
pub use collaborators::{
    CustomerDirectory, EventDirectory, EventInfo, EventStatus, GuestDetails,
    InMemoryCustomerDirectory, InMemoryEventDirectory,
};
pub use config::EngineConfig;
pub use engine::{InventoryEngine, InventoryEngineBuilder};
pub use error::InventoryError;
pub use events::{EventDispatcher, InventoryEvent, StatsRecorder};
pub use fees::{FeePolicy, PriceStamp, Pricing};
pub use ledger::{InventoryLedger, LedgerCounters, LedgerOp, LedgerSnapshot};
pub use lifecycle::{ExpiryOutcome, TransferReceipt, TransferTarget};
pub use orchestrator::{IssueOptions, IssuedTicket, ReservationRequest, SaleRequest};
pub use reaper::{ReaperHandle, ReservationExpiryReaper, SweepReport};
pub use state_machine::{CheckInRequest, CheckInWindow, NewTicket, TicketStateMachine};
pub use store::{InMemoryTicketStore, TicketStore};
pub use ticket::{
    AttendeeInfo, CheckInMethod, CheckInRecord, ReservationHold, SaleRecord, StatusChange, Ticket,
    TicketStatus, TransferRecord,
};
pub use ticket_type::{OrderLimits, SaleWindow, TicketType};
pub use types::{CustomerId, EventId, OrderId, TicketId, TicketTypeId};

//! Inventory error types

use super::ticket::TicketStatus;
use thiserror::Error;

/// Errors that can occur within the inventory engine.
///
/// `InsufficientInventory` and `InvalidTransition` are ordinary, expected
/// outcomes under concurrent demand. `CompensationFailed` is the only variant
/// that leaves the system in a state needing operator attention.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum InventoryError {
    /// Ticket, ticket type, event or customer missing
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Reserve/sell request exceeds the available quantity
    #[error(
        "not enough tickets available for ticket type {ticket_type}: requested {requested}, available {available}"
    )]
    InsufficientInventory {
        /// Ticket type the request was made against
        ticket_type: String,
        /// Quantity requested
        requested: u32,
        /// Quantity available when the request was evaluated
        available: u32,
    },

    /// Release/cancel/refund request exceeds the committed counter it draws from
    #[error(
        "ledger underflow on ticket type {ticket_type}: cannot remove {requested} from {counter} = {current}"
    )]
    LedgerUnderflow {
        /// Ticket type the request was made against
        ticket_type: String,
        /// Counter name (`reserved` or `sold`)
        counter: &'static str,
        /// Quantity requested
        requested: u32,
        /// Current counter value
        current: u32,
    },

    /// Illegal status change attempted
    #[error("invalid transition for ticket {ticket}: {from} -> {to}")]
    InvalidTransition {
        /// Ticket identifier
        ticket: String,
        /// Current status
        from: TicketStatus,
        /// Requested status
        to: TicketStatus,
    },

    /// Second check-in attempt on an admitted ticket
    #[error("ticket {ticket} already checked in at {checked_in_at}")]
    AlreadyCheckedIn {
        /// Ticket identifier
        ticket: String,
        /// Time of the first successful check-in
        checked_in_at: u64,
    },

    /// The reservation deadline passed before the operation
    #[error("reservation for ticket {ticket} expired at {expired_at}")]
    ReservationExpired {
        /// Ticket identifier
        ticket: String,
        /// Reservation deadline
        expired_at: u64,
    },

    /// Check-in attempted outside the event admission window
    #[error("check-in at {now} is outside the admission window [{opens_at}, {closes_at}]")]
    OutsideCheckInWindow {
        /// Attempt time
        now: u64,
        /// Window opening time
        opens_at: u64,
        /// Window closing time
        closes_at: u64,
    },

    /// Transfer sender does not hold the ticket
    #[error("ticket {ticket} is not held by customer {customer}")]
    OwnershipMismatch {
        /// Ticket identifier
        ticket: String,
        /// Customer that claimed ownership
        customer: String,
    },

    /// Presented secret does not match the ticket
    #[error("secret mismatch for ticket code {code}")]
    SecretMismatch {
        /// Public ticket code
        code: String,
    },

    /// Bounded retry exhausted on the ledger
    #[error("ledger contention on ticket type {ticket_type} after {attempts} attempts")]
    Contention {
        /// Ticket type the operation was made against
        ticket_type: String,
        /// Attempts made before giving up
        attempts: u32,
    },

    /// Rollback after a partial failure did not succeed
    #[error("compensation failed after `{cause}`: {details}")]
    CompensationFailed {
        /// Error that triggered the compensation
        cause: String,
        /// Description of the compensating actions that failed
        details: String,
    },

    /// Quantity must be strictly positive
    #[error("invalid quantity: {quantity}")]
    InvalidQuantity {
        /// Quantity received
        quantity: u32,
    },

    /// Quantity outside the per-order bounds of the ticket type
    #[error("order quantity {quantity} outside allowed range [{min}, {max}]")]
    OrderLimit {
        /// Quantity received
        quantity: u32,
        /// Minimum tickets per order
        min: u32,
        /// Maximum tickets per order
        max: u32,
    },

    /// Ticket type or event is not selling right now
    #[error("not on sale: {reason}")]
    NotOnSale {
        /// Why the sale was refused
        reason: String,
    },

    /// The event does not accept reservations
    #[error("event {event} does not allow reservations")]
    ReservationsDisabled {
        /// Event identifier
        event: String,
    },

    /// Capacity change would drop total below what is already committed
    #[error("total quantity {requested} is below committed quantity {committed}")]
    CapacityBelowCommitted {
        /// Requested new total
        requested: u32,
        /// `reserved + sold` at the time of the request
        committed: u32,
    },

    /// Could not find an unused ticket code within the attempt budget
    #[error("could not mint a unique ticket code after {attempts} attempts")]
    CodeSpaceExhausted {
        /// Attempts made
        attempts: u32,
    },

    /// The caller cancelled the workflow
    #[error("operation cancelled")]
    Cancelled,

    /// The workflow ran past its deadline
    #[error("deadline exceeded at {now} (deadline {deadline})")]
    DeadlineExceeded {
        /// Time the deadline was detected
        now: u64,
        /// The deadline
        deadline: u64,
    },

    /// An entity with the same identifier is already stored
    #[error("duplicate {entity}: {id}")]
    Duplicate {
        /// Kind of entity
        entity: &'static str,
        /// Identifier
        id: String,
    },

    /// Invalid request arguments
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description of the problem
        message: String,
    },

    /// Configuration could not be loaded
    #[error("configuration error: {message}")]
    Config {
        /// Underlying error message
        message: String,
    },
}

impl InventoryError {
    /// Shorthand for [`InventoryError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        InventoryError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns `true` if retrying the same request later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, InventoryError::Contention { .. })
    }

    /// Returns `true` for the failures that must be escalated to an operator.
    #[must_use]
    pub fn requires_operator(&self) -> bool {
        matches!(self, InventoryError::CompensationFailed { .. })
    }
}

impl From<serde_json::Error> for InventoryError {
    #[cold]
    fn from(err: serde_json::Error) -> Self {
        InventoryError::Config {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for InventoryError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        InventoryError::Config {
            message: err.to_string(),
        }
    }
}

//! Narrow, read-mostly interfaces to the systems that own events and customers.
//!
//! The engine never writes through these during an inventory transaction;
//! they are consulted before the ledger is touched (event status, customer
//! existence) or, for guest creation, before a transfer takes the row lock.

use super::error::InventoryError;
use super::types::{CustomerId, EventId};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Publication status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Being prepared, not visible to buyers
    Draft,
    /// Visible and selling
    Published,
    /// Doors open, still selling
    Live,
    /// Called off
    Cancelled,
    /// Over
    Completed,
}

impl EventStatus {
    /// `true` when tickets may be sold or reserved.
    #[must_use]
    pub fn is_active_for_sales(self) -> bool {
        matches!(self, EventStatus::Published | EventStatus::Live)
    }
}

/// The slice of an event the inventory engine reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    /// Identifier
    pub id: EventId,
    /// Publication status
    pub status: EventStatus,
    /// Whether timed reservations are offered
    pub allow_reservations: bool,
    /// Event-level default reservation TTL, in minutes
    pub reservation_duration_minutes: Option<u32>,
    /// Start of the event
    pub starts_at: u64,
    /// End of the event
    pub ends_at: u64,
}

impl EventInfo {
    /// A published event accepting reservations with no default TTL.
    pub fn published(id: EventId, starts_at: u64, ends_at: u64) -> Self {
        Self {
            id,
            status: EventStatus::Published,
            allow_reservations: true,
            reservation_duration_minutes: None,
            starts_at,
            ends_at,
        }
    }
}

/// Lookup of events by id.
pub trait EventDirectory: Send + Sync {
    /// Find an event.
    fn find_event(&self, event_id: EventId) -> Option<EventInfo>;
}

/// Details for a customer record created on the fly for a transfer recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestDetails {
    /// Guest e-mail
    pub email: String,
    /// Guest name
    pub name: Option<String>,
}

/// Existence checks and guest creation for customers.
pub trait CustomerDirectory: Send + Sync {
    /// `true` if the customer exists.
    fn customer_exists(&self, customer_id: CustomerId) -> bool;

    /// Create (or find) a guest customer for a transfer recipient.
    ///
    /// # Errors
    /// Implementation-defined; surfaced to the transfer caller unchanged.
    fn create_guest(&self, guest: &GuestDetails) -> Result<CustomerId, InventoryError>;
}

/// In-process [`EventDirectory`].
#[derive(Debug, Default)]
pub struct InMemoryEventDirectory {
    events: DashMap<EventId, EventInfo>,
}

impl InMemoryEventDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an event.
    pub fn upsert(&self, event: EventInfo) {
        self.events.insert(event.id, event);
    }

    /// Change the status of a stored event. Returns `false` if unknown.
    pub fn set_status(&self, event_id: EventId, status: EventStatus) -> bool {
        match self.events.get_mut(&event_id) {
            Some(mut event) => {
                event.status = status;
                true
            }
            None => false,
        }
    }
}

impl EventDirectory for InMemoryEventDirectory {
    fn find_event(&self, event_id: EventId) -> Option<EventInfo> {
        self.events.get(&event_id).map(|e| e.value().clone())
    }
}

/// In-process [`CustomerDirectory`]; guests are keyed by e-mail.
#[derive(Debug, Default)]
pub struct InMemoryCustomerDirectory {
    customers: DashSet<CustomerId>,
    guests: DashMap<String, CustomerId>,
}

impl InMemoryCustomerDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account and return its id.
    pub fn register(&self) -> CustomerId {
        let id = CustomerId::new();
        self.customers.insert(id);
        id
    }

    /// Register an existing id.
    pub fn insert(&self, customer_id: CustomerId) {
        self.customers.insert(customer_id);
    }

    /// Guest account created for `email`, if any.
    pub fn find_guest(&self, email: &str) -> Option<CustomerId> {
        self.guests
            .get(&email.trim().to_lowercase())
            .map(|entry| *entry.value())
    }
}

impl CustomerDirectory for InMemoryCustomerDirectory {
    fn customer_exists(&self, customer_id: CustomerId) -> bool {
        self.customers.contains(&customer_id)
    }

    fn create_guest(&self, guest: &GuestDetails) -> Result<CustomerId, InventoryError> {
        let email = guest.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(InventoryError::InvalidRequest {
                message: format!("invalid guest e-mail: {:?}", guest.email),
            });
        }
        let id = *self.guests.entry(email).or_insert_with(|| {
            let id = CustomerId::new();
            info!("Created guest customer {}", id);
            id
        });
        self.customers.insert(id);
        Ok(id)
    }
}

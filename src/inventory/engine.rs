//! The inventory engine: ticket-type registry, ticket store and collaborators
//! behind one facade.
//!
//! Issuance lives in [`orchestrator`](super::orchestrator), per-ticket
//! operations in [`lifecycle`](super::lifecycle); both are further `impl`
//! blocks on [`InventoryEngine`].

use super::codes::{CodeGenerator, RandomCodeGenerator, TicketCodeIssuer};
use super::collaborators::{CustomerDirectory, EventDirectory, EventInfo};
use super::config::EngineConfig;
use super::error::InventoryError;
use super::events::{EventDispatcher, InventoryEvent};
use super::ledger::LedgerSnapshot;
use super::state_machine::CheckInWindow;
use super::store::{InMemoryTicketStore, TicketStore};
use super::ticket::Ticket;
use super::ticket_type::TicketType;
use super::types::{EventId, TicketId, TicketTypeId};
use crate::utils::{Clock, SystemClock};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tracing::{info, trace};

/// Concurrent ticket inventory and lifecycle engine.
///
/// All methods take `&self`; share the engine behind an `Arc` between
/// request handlers and the [`ReservationExpiryReaper`](super::reaper::ReservationExpiryReaper).
pub struct InventoryEngine {
    pub(super) config: EngineConfig,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) ticket_types: DashMap<TicketTypeId, Arc<TicketType>>,
    pub(super) store: Arc<dyn TicketStore>,
    pub(super) events: Arc<dyn EventDirectory>,
    pub(super) customers: Arc<dyn CustomerDirectory>,
    pub(super) issuer: TicketCodeIssuer,
    pub(super) dispatcher: Option<Arc<EventDispatcher>>,
}

impl std::fmt::Debug for InventoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryEngine")
            .field("config", &self.config)
            .field("ticket_types", &self.ticket_types.len())
            .field("tickets", &self.store.len())
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

/// Builder for [`InventoryEngine`].
pub struct InventoryEngineBuilder {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    store: Arc<dyn TicketStore>,
    events: Arc<dyn EventDirectory>,
    customers: Arc<dyn CustomerDirectory>,
    generator: Option<Arc<dyn CodeGenerator>>,
    dispatcher: Option<Arc<EventDispatcher>>,
}

impl InventoryEngineBuilder {
    /// Replace the default configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a different clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a different ticket store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn TicketStore>) -> Self {
        self.store = store;
        self
    }

    /// Use a different source of candidate ticket codes.
    #[must_use]
    pub fn with_code_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Publish inventory events to `dispatcher`.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Arc<EventDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Create the engine.
    ///
    /// # Errors
    /// [`InventoryError::Config`] if the configuration is invalid.
    pub fn build(self) -> Result<InventoryEngine, InventoryError> {
        self.config.validate()?;
        let generator = self.generator.unwrap_or_else(|| {
            Arc::new(RandomCodeGenerator::new(
                self.config.code_prefix.clone(),
                self.config.code_length,
            ))
        });
        let issuer = TicketCodeIssuer::new(generator, self.config.code_max_attempts);
        info!(
            "Inventory engine ready (ledger attempts {}, code attempts {})",
            self.config.ledger_max_attempts, self.config.code_max_attempts
        );
        Ok(InventoryEngine {
            config: self.config,
            clock: self.clock,
            ticket_types: DashMap::new(),
            store: self.store,
            events: self.events,
            customers: self.customers,
            issuer,
            dispatcher: self.dispatcher,
        })
    }
}

impl InventoryEngine {
    /// Start building an engine over the given collaborators, with the
    /// default configuration, the system clock and an in-memory store.
    pub fn builder(
        events: Arc<dyn EventDirectory>,
        customers: Arc<dyn CustomerDirectory>,
    ) -> InventoryEngineBuilder {
        InventoryEngineBuilder {
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            store: Arc::new(InMemoryTicketStore::new()),
            events,
            customers,
            generator: None,
            dispatcher: None,
        }
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current time according to the engine clock.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    /// The ticket store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TicketStore> {
        &self.store
    }

    /// The stats dispatcher, if one was configured.
    #[must_use]
    pub fn dispatcher(&self) -> Option<&Arc<EventDispatcher>> {
        self.dispatcher.as_ref()
    }

    /// Register a ticket type. Its ledger uses the configured retry bound.
    ///
    /// # Errors
    /// - [`InventoryError::NotFound`] if the owning event is unknown
    /// - [`InventoryError::Duplicate`] if the id is already registered
    pub fn register_ticket_type(
        &self,
        ticket_type: TicketType,
    ) -> Result<Arc<TicketType>, InventoryError> {
        if self.events.find_event(ticket_type.event_id()).is_none() {
            return Err(InventoryError::not_found("event", ticket_type.event_id()));
        }
        let ticket_type = Arc::new(
            ticket_type.with_ledger_max_attempts(self.config.ledger_max_attempts),
        );
        match self.ticket_types.entry(ticket_type.id()) {
            Entry::Occupied(_) => Err(InventoryError::Duplicate {
                entity: "ticket type",
                id: ticket_type.id().to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&ticket_type));
                info!(
                    "Registered ticket type {} ({}) for event {} with {} tickets",
                    ticket_type.id(),
                    ticket_type.name(),
                    ticket_type.event_id(),
                    ticket_type.snapshot().total
                );
                Ok(ticket_type)
            }
        }
    }

    /// Look up a ticket type.
    ///
    /// # Errors
    /// [`InventoryError::NotFound`] if unknown.
    pub fn ticket_type(&self, ticket_type_id: TicketTypeId) -> Result<Arc<TicketType>, InventoryError> {
        self.ticket_types
            .get(&ticket_type_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| InventoryError::not_found("ticket type", ticket_type_id))
    }

    /// Ticket types of an event.
    #[must_use]
    pub fn ticket_types_for_event(&self, event_id: EventId) -> Vec<Arc<TicketType>> {
        self.ticket_types
            .iter()
            .filter(|entry| entry.value().event_id() == event_id)
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Current counters of a ticket type.
    ///
    /// # Errors
    /// [`InventoryError::NotFound`] if unknown.
    pub fn ledger_snapshot(&self, ticket_type_id: TicketTypeId) -> Result<LedgerSnapshot, InventoryError> {
        Ok(self.ticket_type(ticket_type_id)?.snapshot())
    }

    /// Change the capacity of a ticket type.
    ///
    /// # Errors
    /// - [`InventoryError::NotFound`] if unknown
    /// - [`InventoryError::CapacityBelowCommitted`] if `total < reserved + sold`
    pub fn set_total_quantity(
        &self,
        ticket_type_id: TicketTypeId,
        total: u32,
    ) -> Result<LedgerSnapshot, InventoryError> {
        let ticket_type = self.ticket_type(ticket_type_id)?;
        ticket_type.ledger().set_total(total)?;
        info!("Ticket type {}: total quantity set to {}", ticket_type_id, total);
        Ok(ticket_type.snapshot())
    }

    /// Switch a ticket type on or off for sale.
    ///
    /// # Errors
    /// [`InventoryError::NotFound`] if unknown.
    pub fn set_ticket_type_active(
        &self,
        ticket_type_id: TicketTypeId,
        active: bool,
    ) -> Result<(), InventoryError> {
        self.ticket_type(ticket_type_id)?.set_active(active);
        info!("Ticket type {}: active = {}", ticket_type_id, active);
        Ok(())
    }

    /// Current state of a ticket, history included.
    ///
    /// # Errors
    /// [`InventoryError::NotFound`] if unknown.
    pub fn ticket(&self, ticket_id: TicketId) -> Result<Ticket, InventoryError> {
        self.store
            .get(ticket_id)
            .ok_or_else(|| InventoryError::not_found("ticket", ticket_id))
    }

    /// Look up a ticket by its public code.
    ///
    /// # Errors
    /// [`InventoryError::NotFound`] if no ticket has that code.
    pub fn ticket_by_code(&self, code: &str) -> Result<Ticket, InventoryError> {
        self.store
            .find_by_code(code)
            .ok_or_else(|| InventoryError::not_found("ticket code", code))
    }

    /// All tickets of a ticket type.
    #[must_use]
    pub fn tickets_for_type(&self, ticket_type_id: TicketTypeId) -> Vec<Ticket> {
        self.store.tickets_for_type(ticket_type_id)
    }

    pub(super) fn event(&self, event_id: EventId) -> Result<EventInfo, InventoryError> {
        self.events
            .find_event(event_id)
            .ok_or_else(|| InventoryError::not_found("event", event_id))
    }

    pub(super) fn check_in_window(&self, event: &EventInfo) -> CheckInWindow {
        CheckInWindow::for_event(
            event.starts_at,
            event.ends_at,
            self.config.check_in_opens_before_ms,
            self.config.check_in_closes_after_ms,
        )
    }

    pub(super) fn publish(&self, event: InventoryEvent) {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.dispatch(event);
        }
    }

    /// Apply one transition to one ticket under its row lock.
    ///
    /// `apply` receives the ticket, its ticket type and the transition time.
    /// A status change is published as [`InventoryEvent::TicketTransitioned`].
    pub(super) fn transition<F>(&self, ticket_id: TicketId, mut apply: F) -> Result<Ticket, InventoryError>
    where
        F: FnMut(&mut Ticket, &TicketType, u64) -> Result<(), InventoryError>,
    {
        let current = self.ticket(ticket_id)?;
        let ticket_type = self.ticket_type(current.ticket_type_id)?;
        let now = self.now();

        let mut from = current.status;
        let updated = self.store.update(ticket_id, &mut |ticket: &mut Ticket| {
            from = ticket.status;
            apply(ticket, &ticket_type, now)
        })?;

        if updated.status != from {
            trace!("Ticket {}: {} -> {}", ticket_id, from, updated.status);
            self.publish(InventoryEvent::TicketTransitioned {
                ticket_id,
                ticket_type_id: updated.ticket_type_id,
                from,
                to: updated.status,
                at: now,
            });
        }
        Ok(updated)
    }
}

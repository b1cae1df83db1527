//! Ticket persistence.
//!
//! [`TicketStore`] is the seam between the engine and the storage that holds
//! ticket rows. Implementations must provide:
//! - an atomic code claim, so two tickets can never share a public code;
//! - a row-level exclusive update ([`TicketStore::update`]) held only for the
//!   duration of one transition;
//! - a scan of reserved tickets whose deadline passed.
//!
//! [`InMemoryTicketStore`] keeps rows in a `DashMap` and indexes live
//! reservations by `(expires_at, ticket_id)` in a skip list, so expiry scans
//! only visit due reservations.

use super::error::InventoryError;
use super::ticket::{Ticket, TicketStatus};
use super::types::{TicketId, TicketTypeId};
use crossbeam_skiplist::SkipSet;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::ops::Bound;

/// Mutation applied under a row lock. Returning an error leaves the row as it was.
pub type TicketUpdate<'a> = &'a mut dyn FnMut(&mut Ticket) -> Result<(), InventoryError>;

/// Storage for ticket rows.
pub trait TicketStore: Send + Sync {
    /// Atomically reserve `code` for `ticket_id`. Returns `false` if taken.
    fn claim_code(&self, code: &str, ticket_id: TicketId) -> bool;

    /// Drop a code claim, e.g. while compensating a failed issuance.
    fn release_code(&self, code: &str);

    /// Insert a new row.
    ///
    /// # Errors
    /// [`InventoryError::Duplicate`] if the id is already stored.
    fn insert(&self, ticket: Ticket) -> Result<(), InventoryError>;

    /// Remove a row. Only used to compensate an issuance that never completed.
    fn remove(&self, ticket_id: TicketId) -> Option<Ticket>;

    /// Read a row.
    fn get(&self, ticket_id: TicketId) -> Option<Ticket>;

    /// Read a row by public code.
    fn find_by_code(&self, code: &str) -> Option<Ticket>;

    /// Run `update` with exclusive access to one row and return the row as written.
    ///
    /// # Errors
    /// [`InventoryError::NotFound`] if the row is missing, or whatever `update` returns.
    fn update(&self, ticket_id: TicketId, update: TicketUpdate<'_>)
    -> Result<Ticket, InventoryError>;

    /// Ids of reserved tickets with `expires_at < now`, earliest deadline first.
    fn due_reservations(&self, now: u64, limit: usize) -> Vec<TicketId> {
        self.due_reservations_after(now, None, limit)
            .into_iter()
            .map(|(_, ticket_id)| ticket_id)
            .collect()
    }

    /// Due `(expires_at, ticket_id)` keys ordered after `after`, earliest first.
    /// Lets a caller page past entries it has decided to leave for later.
    fn due_reservations_after(
        &self,
        now: u64,
        after: Option<(u64, TicketId)>,
        limit: usize,
    ) -> Vec<(u64, TicketId)>;

    /// All tickets of a ticket type.
    fn tickets_for_type(&self, ticket_type_id: TicketTypeId) -> Vec<Ticket>;

    /// Number of stored rows.
    fn len(&self) -> usize;

    /// `true` when no rows are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process [`TicketStore`].
#[derive(Debug, Default)]
pub struct InMemoryTicketStore {
    tickets: DashMap<TicketId, Ticket>,
    codes: DashMap<String, TicketId>,
    expiry_index: SkipSet<(u64, TicketId)>,
}

impl InMemoryTicketStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn index_key(ticket: &Ticket) -> Option<(u64, TicketId)> {
        if ticket.status == TicketStatus::Reserved {
            ticket
                .reservation_expires_at()
                .map(|expires_at| (expires_at, ticket.id))
        } else {
            None
        }
    }

    fn reindex(&self, before: Option<(u64, TicketId)>, after: Option<(u64, TicketId)>) {
        if before == after {
            return;
        }
        if let Some(key) = before {
            self.expiry_index.remove(&key);
        }
        if let Some(key) = after {
            self.expiry_index.insert(key);
        }
    }
}

impl TicketStore for InMemoryTicketStore {
    fn claim_code(&self, code: &str, ticket_id: TicketId) -> bool {
        match self.codes.entry(code.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(ticket_id);
                true
            }
        }
    }

    fn release_code(&self, code: &str) {
        self.codes.remove(code);
    }

    fn insert(&self, ticket: Ticket) -> Result<(), InventoryError> {
        let key = Self::index_key(&ticket);
        match self.tickets.entry(ticket.id) {
            Entry::Occupied(_) => Err(InventoryError::Duplicate {
                entity: "ticket",
                id: ticket.id.to_string(),
            }),
            Entry::Vacant(slot) => {
                let _row = slot.insert(ticket);
                self.reindex(None, key);
                Ok(())
            }
        }
    }

    fn remove(&self, ticket_id: TicketId) -> Option<Ticket> {
        let (_, ticket) = self.tickets.remove(&ticket_id)?;
        self.reindex(Self::index_key(&ticket), None);
        Some(ticket)
    }

    fn get(&self, ticket_id: TicketId) -> Option<Ticket> {
        self.tickets.get(&ticket_id).map(|row| row.value().clone())
    }

    fn find_by_code(&self, code: &str) -> Option<Ticket> {
        let ticket_id = *self.codes.get(code)?.value();
        self.get(ticket_id)
    }

    fn update(
        &self,
        ticket_id: TicketId,
        update: TicketUpdate<'_>,
    ) -> Result<Ticket, InventoryError> {
        let mut row = self
            .tickets
            .get_mut(&ticket_id)
            .ok_or_else(|| InventoryError::not_found("ticket", ticket_id))?;
        let before = Self::index_key(row.value());
        let mut draft = row.value().clone();
        update(&mut draft)?;
        let after = Self::index_key(&draft);
        *row.value_mut() = draft;
        self.reindex(before, after);
        Ok(row.value().clone())
    }

    fn due_reservations_after(
        &self,
        now: u64,
        after: Option<(u64, TicketId)>,
        limit: usize,
    ) -> Vec<(u64, TicketId)> {
        let end = (now, TicketId::nil());
        let start = match after {
            Some(key) if key >= end => return Vec::new(),
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        self.expiry_index
            .range((start, Bound::Excluded(end)))
            .take(limit)
            .map(|entry| *entry.value())
            .collect()
    }

    fn tickets_for_type(&self, ticket_type_id: TicketTypeId) -> Vec<Ticket> {
        self.tickets
            .iter()
            .filter(|row| row.value().ticket_type_id == ticket_type_id)
            .map(|row| row.value().clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.tickets.len()
    }
}

//! Per-ticket operations after issuance.
//!
//! Each operation takes the ticket's row lock only for its own
//! check-ledger-write step (see [`InventoryEngine::transition`]).
//! Collaborator lookups (event window, recipient resolution) happen before
//! the lock is taken.

use super::codes::{TicketCodeIssuer, secret_matches};
use super::collaborators::GuestDetails;
use super::engine::InventoryEngine;
use super::error::InventoryError;
use super::events::InventoryEvent;
use super::state_machine::{CheckInRequest, TicketStateMachine};
use super::ticket::{Ticket, TicketStatus};
use super::types::{CustomerId, OrderId, TicketId};
use crate::utils::MINUTE_MS;
use tracing::{debug, info};

/// Recipient of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferTarget {
    /// An existing customer account
    Customer(CustomerId),
    /// Someone without an account; a guest customer is created for them
    Guest(GuestDetails),
}

/// Result of a transfer. The secret and token are not retrievable later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    /// The ticket after the transfer
    pub ticket: Ticket,
    /// New holder
    pub recipient: CustomerId,
    /// Token minted for this transfer
    pub transfer_token: String,
    /// New gate secret in clear
    pub secret: String,
}

/// What an expiry attempt did to one reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryOutcome {
    /// The reservation was expired and its unit returned
    Expired,
    /// Nothing to do: already terminal, converted, released or not yet due
    Skipped,
}

impl InventoryEngine {
    /// Admit a sold ticket once, inside the event's admission window.
    ///
    /// # Errors
    /// [`InventoryError::AlreadyCheckedIn`] on a second attempt,
    /// [`InventoryError::OutsideCheckInWindow`], or
    /// [`InventoryError::InvalidTransition`] when the ticket is not sold.
    pub fn check_in(
        &self,
        ticket_id: TicketId,
        request: &CheckInRequest,
    ) -> Result<Ticket, InventoryError> {
        let event_id = self.ticket(ticket_id)?.event_id;
        let window = self.check_in_window(&self.event(event_id)?);
        let ticket = self.transition(ticket_id, |ticket, _, now| {
            TicketStateMachine::check_in(ticket, window, request, now)
        })?;
        info!(
            "Ticket {} checked in by {} at {:?}",
            ticket.id, request.validator, request.location
        );
        Ok(ticket)
    }

    /// Validate the presented code and secret, then check the ticket in.
    ///
    /// # Errors
    /// As [`Self::validate_by_code`] and [`Self::check_in`].
    pub fn check_in_by_code(
        &self,
        code: &str,
        secret: &str,
        request: &CheckInRequest,
    ) -> Result<Ticket, InventoryError> {
        let ticket = self.validate_by_code(code, secret)?;
        self.check_in(ticket.id, request)
    }

    /// Resolve a ticket from its public code and gate secret.
    ///
    /// # Errors
    /// [`InventoryError::NotFound`] for an unknown code,
    /// [`InventoryError::SecretMismatch`] for a wrong secret.
    pub fn validate_by_code(&self, code: &str, secret: &str) -> Result<Ticket, InventoryError> {
        let ticket = self.ticket_by_code(code)?;
        if !secret_matches(&ticket.secret_hash, secret) {
            debug!("Secret mismatch for ticket code {}", code);
            return Err(InventoryError::SecretMismatch {
                code: code.to_string(),
            });
        }
        Ok(ticket)
    }

    /// Validate an admitted ticket again, e.g. on re-entry.
    ///
    /// Increments the validation counter and stamps the validation time
    /// without changing the status.
    ///
    /// # Errors
    /// As [`Self::validate_by_code`], plus [`InventoryError::InvalidTransition`]
    /// when the ticket was never checked in.
    pub fn revalidate(&self, code: &str, secret: &str) -> Result<Ticket, InventoryError> {
        let ticket_id = self.validate_by_code(code, secret)?.id;
        let now = self.now();
        let ticket = self.store.update(ticket_id, &mut |ticket: &mut Ticket| {
            let Some(record) = ticket.check_in.as_mut() else {
                return Err(InventoryError::InvalidTransition {
                    ticket: ticket.id.to_string(),
                    from: ticket.status,
                    to: TicketStatus::CheckedIn,
                });
            };
            record.validation_count = record.validation_count.saturating_add(1);
            record.last_validated_at = now;
            ticket.updated_at = now;
            Ok(())
        })?;
        self.publish(InventoryEvent::TicketRevalidated {
            ticket_id,
            validation_count: ticket.validation_count(),
            at: now,
        });
        Ok(ticket)
    }

    /// Hand a sold, not yet admitted ticket from `from` to another holder.
    ///
    /// The gate secret is rotated; the new one is returned in the receipt.
    ///
    /// # Errors
    /// [`InventoryError::InvalidTransition`] when not sold or already
    /// admitted, [`InventoryError::OwnershipMismatch`] when `from` is not the
    /// holder, [`InventoryError::NotFound`] for an unknown recipient account.
    pub fn transfer(
        &self,
        ticket_id: TicketId,
        from: CustomerId,
        target: TransferTarget,
    ) -> Result<TransferReceipt, InventoryError> {
        let transfer_token = TicketCodeIssuer::mint_transfer_token();
        let (secret, secret_hash) = TicketCodeIssuer::mint_secret();
        let now = self.now();
        let mut resolved = None;
        // The recipient is resolved under the row lock, so a guest account is
        // only created for a ticket that is transferable at that moment.
        let ticket = self.store.update(ticket_id, &mut |ticket: &mut Ticket| {
            TicketStateMachine::ensure_transferable(ticket, from)?;
            let recipient = match &target {
                TransferTarget::Customer(customer_id) => {
                    if !self.customers.customer_exists(*customer_id) {
                        return Err(InventoryError::not_found("customer", customer_id));
                    }
                    *customer_id
                }
                TransferTarget::Guest(guest) => self.customers.create_guest(guest)?,
            };
            TicketStateMachine::transfer(
                ticket,
                from,
                recipient,
                transfer_token.clone(),
                secret_hash.clone(),
                now,
            )?;
            resolved = Some(recipient);
            Ok(())
        })?;
        let recipient = resolved.ok_or_else(|| InventoryError::InvalidRequest {
            message: format!("transfer of ticket {ticket_id} resolved no recipient"),
        })?;

        info!("Ticket {} transferred {} -> {}", ticket_id, from, recipient);
        self.publish(InventoryEvent::TicketTransferred {
            ticket_id,
            from,
            to: recipient,
            at: now,
        });
        Ok(TransferReceipt {
            ticket,
            recipient,
            transfer_token,
            secret,
        })
    }

    /// Cancel a ticket, returning any capacity it holds.
    ///
    /// # Errors
    /// [`InventoryError::InvalidTransition`] from a terminal status.
    pub fn cancel(&self, ticket_id: TicketId, reason: Option<String>) -> Result<Ticket, InventoryError> {
        self.transition(ticket_id, |ticket, ticket_type, now| {
            TicketStateMachine::cancel(ticket, ticket_type.ledger(), reason.clone(), now)
        })
    }

    /// Refund a sold ticket, returning its unit.
    ///
    /// # Errors
    /// [`InventoryError::InvalidTransition`] unless the ticket is sold.
    pub fn refund(&self, ticket_id: TicketId, reason: Option<String>) -> Result<Ticket, InventoryError> {
        self.transition(ticket_id, |ticket, ticket_type, now| {
            TicketStateMachine::refund(ticket, ticket_type.ledger(), reason.clone(), now)
        })
    }

    /// Convert a paid reservation into a sale.
    ///
    /// # Errors
    /// [`InventoryError::InvalidTransition`] unless reserved,
    /// [`InventoryError::ReservationExpired`] past the deadline,
    /// [`InventoryError::OwnershipMismatch`] when another customer holds it.
    pub fn complete_reservation(
        &self,
        ticket_id: TicketId,
        customer_id: CustomerId,
        order_id: Option<OrderId>,
    ) -> Result<Ticket, InventoryError> {
        self.sell_from(ticket_id, TicketStatus::Reserved, customer_id, order_id)
    }

    /// Sell an `available` ticket.
    ///
    /// # Errors
    /// [`InventoryError::InvalidTransition`] unless available,
    /// [`InventoryError::InsufficientInventory`] from the ledger.
    pub fn sell_ticket(
        &self,
        ticket_id: TicketId,
        customer_id: CustomerId,
        order_id: Option<OrderId>,
    ) -> Result<Ticket, InventoryError> {
        self.sell_from(ticket_id, TicketStatus::Available, customer_id, order_id)
    }

    /// Give a reservation up before its deadline (`reserved -> available`).
    ///
    /// # Errors
    /// [`InventoryError::InvalidTransition`] unless reserved.
    pub fn release_reservation(&self, ticket_id: TicketId) -> Result<Ticket, InventoryError> {
        self.transition(ticket_id, |ticket, ticket_type, now| {
            TicketStateMachine::release(ticket, ticket_type.ledger(), now)
        })
    }

    /// Hold an `available` ticket for `holder`.
    ///
    /// # Errors
    /// [`InventoryError::InvalidTransition`] unless available,
    /// [`InventoryError::ReservationsDisabled`] if the event does not allow it,
    /// [`InventoryError::InsufficientInventory`] from the ledger.
    pub fn reserve_ticket(
        &self,
        ticket_id: TicketId,
        holder: Option<CustomerId>,
        ttl_minutes: Option<u32>,
    ) -> Result<Ticket, InventoryError> {
        let event = self.event(self.ticket(ticket_id)?.event_id)?;
        if !event.allow_reservations {
            return Err(InventoryError::ReservationsDisabled {
                event: event.id.to_string(),
            });
        }
        let ttl_ms = ttl_minutes
            .or(event.reservation_duration_minutes)
            .filter(|minutes| *minutes > 0)
            .map_or(self.config.default_reservation_ttl_ms, |minutes| {
                u64::from(minutes) * MINUTE_MS
            });
        self.transition(ticket_id, |ticket, ticket_type, now| {
            TicketStateMachine::reserve(ticket, ticket_type.ledger(), holder, ttl_ms, now)
        })
    }

    /// Expire one reservation if it is still reserved and past its deadline.
    ///
    /// A ticket that was converted, released or already expired in the
    /// meantime is reported as [`ExpiryOutcome::Skipped`], not as an error.
    ///
    /// # Errors
    /// [`InventoryError::NotFound`] for an unknown ticket or ticket type,
    /// or a ledger error while returning the unit.
    pub fn expire_reservation(&self, ticket_id: TicketId) -> Result<ExpiryOutcome, InventoryError> {
        let mut outcome = ExpiryOutcome::Skipped;
        self.transition(ticket_id, |ticket, ticket_type, now| {
            outcome = ExpiryOutcome::Skipped;
            if !ticket.is_reservation_due(now) {
                return Ok(());
            }
            TicketStateMachine::expire(ticket, ticket_type.ledger(), now)?;
            outcome = ExpiryOutcome::Expired;
            Ok(())
        })?;
        Ok(outcome)
    }

    fn sell_from(
        &self,
        ticket_id: TicketId,
        expected: TicketStatus,
        customer_id: CustomerId,
        order_id: Option<OrderId>,
    ) -> Result<Ticket, InventoryError> {
        self.transition(ticket_id, |ticket, ticket_type, now| {
            if ticket.status != expected {
                return Err(InventoryError::InvalidTransition {
                    ticket: ticket.id.to_string(),
                    from: ticket.status,
                    to: TicketStatus::Sold,
                });
            }
            TicketStateMachine::sell(
                ticket,
                ticket_type.ledger(),
                Some(customer_id),
                order_id,
                ticket_type.pricing().stamp(),
                now,
            )
        })
    }
}

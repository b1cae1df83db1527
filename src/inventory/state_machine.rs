//! Ticket status transitions.
//!
//! Every transition validates the current status against
//! [`TicketStatus::can_transition_to`] before touching anything. Transitions
//! that move capacity call the ticket type's ledger first and only flip the
//! ticket's own fields once the ledger committed, so a ledger failure leaves
//! both the counters and the ticket unchanged.
//!
//! | From      | To        | Ledger call                     |
//! |-----------|-----------|---------------------------------|
//! | available | reserved  | `reserve(1)`                    |
//! | available | sold      | `sell(1)`                       |
//! | available | cancelled, expired | none                   |
//! | reserved  | sold      | `convert_reserved_to_sold(1)`   |
//! | reserved  | available, cancelled, expired | `release(1)` |
//! | sold      | cancelled | `cancel_sold(1)`                |
//! | sold      | refunded  | `refund_sold(1)`                |
//! | sold      | checked_in | none                           |

use super::error::InventoryError;
use super::fees::PriceStamp;
use super::ledger::InventoryLedger;
use super::ticket::{
    AttendeeInfo, CheckInMethod, CheckInRecord, ReservationHold, SaleRecord, StatusChange, Ticket,
    TicketStatus, TransferRecord,
};
use super::types::{CustomerId, EventId, OrderId, TicketId, TicketTypeId};
use tracing::trace;

/// Admission window of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckInWindow {
    /// First admissible millisecond
    pub opens_at: u64,
    /// Last admissible millisecond
    pub closes_at: u64,
}

impl CheckInWindow {
    /// Window from `starts_at - opens_before` to `ends_at + closes_after`.
    pub fn for_event(starts_at: u64, ends_at: u64, opens_before: u64, closes_after: u64) -> Self {
        Self {
            opens_at: starts_at.saturating_sub(opens_before),
            closes_at: ends_at.saturating_add(closes_after),
        }
    }

    /// `true` when `now` falls inside the window.
    #[must_use]
    pub fn contains(&self, now: u64) -> bool {
        now >= self.opens_at && now <= self.closes_at
    }
}

/// Who admitted the ticket, and how.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckInRequest {
    /// Staff member or device identifier
    pub validator: String,
    /// Presentation method
    pub method: CheckInMethod,
    /// Gate or entrance
    pub location: Option<String>,
}

impl CheckInRequest {
    /// QR scan by `validator` with no location.
    pub fn new(validator: impl Into<String>) -> Self {
        Self {
            validator: validator.into(),
            ..Self::default()
        }
    }

    /// Set the presentation method.
    #[must_use]
    pub fn with_method(mut self, method: CheckInMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the gate.
    #[must_use]
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Identity and ownership of a ticket about to be minted.
#[derive(Debug, Clone)]
pub struct NewTicket {
    /// Identifier
    pub id: TicketId,
    /// Owning ticket type
    pub ticket_type_id: TicketTypeId,
    /// Owning event
    pub event_id: EventId,
    /// Holder
    pub customer_id: Option<CustomerId>,
    /// Order
    pub order_id: Option<OrderId>,
    /// Public code
    pub code: String,
    /// Hash of the gate secret
    pub secret_hash: String,
    /// Attendee details
    pub attendee: Option<AttendeeInfo>,
}

/// Stateless guard over ticket status changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TicketStateMachine;

impl TicketStateMachine {
    /// Fail with [`InventoryError::InvalidTransition`] unless `ticket.status -> to` is legal.
    pub fn ensure_transition(ticket: &Ticket, to: TicketStatus) -> Result<(), InventoryError> {
        if ticket.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(InventoryError::InvalidTransition {
                ticket: ticket.id.to_string(),
                from: ticket.status,
                to,
            })
        }
    }

    /// Build a ticket in `reserved`. The caller has already applied `reserve` on the ledger.
    pub fn initialize_reserved(new: NewTicket, hold: ReservationHold, now: u64) -> Ticket {
        let mut ticket = Self::blank(new, TicketStatus::Reserved, now);
        ticket.reservation = Some(hold);
        ticket
    }

    /// Build a ticket in `sold`. The caller has already applied `sell` on the ledger.
    pub fn initialize_sold(new: NewTicket, price: PriceStamp, now: u64) -> Ticket {
        let mut ticket = Self::blank(new, TicketStatus::Sold, now);
        ticket.sale = Some(SaleRecord {
            sold_at: now,
            price,
        });
        ticket
    }

    /// `available -> reserved`, holding one unit until `now + ttl_ms`.
    pub fn reserve(
        ticket: &mut Ticket,
        ledger: &InventoryLedger,
        holder: Option<CustomerId>,
        ttl_ms: u64,
        now: u64,
    ) -> Result<(), InventoryError> {
        Self::ensure_transition(ticket, TicketStatus::Reserved)?;
        Self::ensure_ledger(ticket, ledger)?;
        ledger.reserve(1)?;

        ticket.reservation = Some(ReservationHold {
            reserved_at: now,
            reserved_by: holder,
            expires_at: now.saturating_add(ttl_ms),
        });
        if holder.is_some() {
            ticket.customer_id = holder;
        }
        ticket.record_status(TicketStatus::Reserved, now, None);
        trace!("Ticket {}: reserved until {}", ticket.id, now.saturating_add(ttl_ms));
        Ok(())
    }

    /// `available | reserved -> sold`.
    ///
    /// From `reserved` the unit is converted (`reserved -= 1; sold += 1`),
    /// never sold a second time. A reservation past its deadline fails with
    /// [`InventoryError::ReservationExpired`] and is left for the reaper.
    pub fn sell(
        ticket: &mut Ticket,
        ledger: &InventoryLedger,
        customer: Option<CustomerId>,
        order: Option<OrderId>,
        price: PriceStamp,
        now: u64,
    ) -> Result<(), InventoryError> {
        Self::ensure_transition(ticket, TicketStatus::Sold)?;
        Self::ensure_ledger(ticket, ledger)?;

        match ticket.status {
            TicketStatus::Reserved => {
                if let Some(hold) = &ticket.reservation {
                    if hold.expires_at < now {
                        return Err(InventoryError::ReservationExpired {
                            ticket: ticket.id.to_string(),
                            expired_at: hold.expires_at,
                        });
                    }
                    if let (Some(holder), Some(buyer)) = (hold.reserved_by, customer) {
                        if holder != buyer {
                            return Err(InventoryError::OwnershipMismatch {
                                ticket: ticket.id.to_string(),
                                customer: buyer.to_string(),
                            });
                        }
                    }
                }
                ledger.convert_reserved_to_sold(1)?;
            }
            _ => {
                ledger.sell(1)?;
            }
        }

        ticket.reservation = None;
        if customer.is_some() {
            ticket.customer_id = customer;
        }
        if order.is_some() {
            ticket.order_id = order;
        }
        ticket.sale = Some(SaleRecord {
            sold_at: now,
            price,
        });
        ticket.record_status(TicketStatus::Sold, now, None);
        trace!("Ticket {}: sold", ticket.id);
        Ok(())
    }

    /// `reserved -> available`, returning the held unit.
    pub fn release(
        ticket: &mut Ticket,
        ledger: &InventoryLedger,
        now: u64,
    ) -> Result<(), InventoryError> {
        Self::ensure_transition(ticket, TicketStatus::Available)?;
        Self::ensure_ledger(ticket, ledger)?;
        ledger.release(1)?;

        ticket.reservation = None;
        ticket.record_status(TicketStatus::Available, now, Some("released".to_string()));
        trace!("Ticket {}: reservation released", ticket.id);
        Ok(())
    }

    /// `available | reserved -> expired`.
    pub fn expire(
        ticket: &mut Ticket,
        ledger: &InventoryLedger,
        now: u64,
    ) -> Result<(), InventoryError> {
        Self::ensure_transition(ticket, TicketStatus::Expired)?;
        Self::ensure_ledger(ticket, ledger)?;
        if ticket.status == TicketStatus::Reserved {
            ledger.release(1)?;
        }

        ticket.reservation = None;
        ticket.record_status(TicketStatus::Expired, now, None);
        trace!("Ticket {}: expired", ticket.id);
        Ok(())
    }

    /// `available | reserved | sold -> cancelled`, returning any held unit.
    pub fn cancel(
        ticket: &mut Ticket,
        ledger: &InventoryLedger,
        reason: Option<String>,
        now: u64,
    ) -> Result<(), InventoryError> {
        Self::ensure_transition(ticket, TicketStatus::Cancelled)?;
        Self::ensure_ledger(ticket, ledger)?;
        match ticket.status {
            TicketStatus::Reserved => {
                ledger.release(1)?;
            }
            TicketStatus::Sold => {
                ledger.cancel_sold(1)?;
            }
            _ => {}
        }

        ticket.reservation = None;
        ticket.record_status(TicketStatus::Cancelled, now, reason);
        trace!("Ticket {}: cancelled", ticket.id);
        Ok(())
    }

    /// `sold -> refunded`, returning the sold unit.
    pub fn refund(
        ticket: &mut Ticket,
        ledger: &InventoryLedger,
        reason: Option<String>,
        now: u64,
    ) -> Result<(), InventoryError> {
        Self::ensure_transition(ticket, TicketStatus::Refunded)?;
        Self::ensure_ledger(ticket, ledger)?;
        ledger.refund_sold(1)?;

        ticket.record_status(TicketStatus::Refunded, now, reason);
        trace!("Ticket {}: refunded", ticket.id);
        Ok(())
    }

    /// `sold -> checked_in`, once, inside the event's admission window.
    pub fn check_in(
        ticket: &mut Ticket,
        window: CheckInWindow,
        request: &CheckInRequest,
        now: u64,
    ) -> Result<(), InventoryError> {
        if let Some(checked_in_at) = ticket.checked_in_at() {
            return Err(InventoryError::AlreadyCheckedIn {
                ticket: ticket.id.to_string(),
                checked_in_at,
            });
        }
        Self::ensure_transition(ticket, TicketStatus::CheckedIn)?;
        if !window.contains(now) {
            return Err(InventoryError::OutsideCheckInWindow {
                now,
                opens_at: window.opens_at,
                closes_at: window.closes_at,
            });
        }

        ticket.check_in = Some(CheckInRecord {
            checked_in_at: now,
            checked_in_by: request.validator.clone(),
            method: request.method,
            location: request.location.clone(),
            validation_count: 1,
            last_validated_at: now,
        });
        ticket.record_status(TicketStatus::CheckedIn, now, None);
        trace!("Ticket {}: checked in by {}", ticket.id, request.validator);
        Ok(())
    }

    /// Reassign a sold, not yet admitted ticket from `from` to `to`.
    ///
    /// Capacity is untouched; the ticket stays `sold`. The gate secret is
    /// replaced so the previous holder's copy stops validating.
    pub fn transfer(
        ticket: &mut Ticket,
        from: CustomerId,
        to: CustomerId,
        transfer_token: String,
        new_secret_hash: String,
        now: u64,
    ) -> Result<(), InventoryError> {
        Self::ensure_transferable(ticket, from)?;
        if from == to {
            return Err(InventoryError::InvalidRequest {
                message: format!("ticket {} already held by {}", ticket.id, to),
            });
        }

        ticket.customer_id = Some(to);
        ticket.secret_hash = new_secret_hash;
        ticket.transfer = Some(TransferRecord {
            transferred_from: from,
            transfer_token,
            transferred_at: now,
        });
        ticket.updated_at = now;
        ticket.history.push(StatusChange {
            from: Some(TicketStatus::Sold),
            to: TicketStatus::Sold,
            at: now,
            note: Some(format!("transferred from {from} to {to}")),
        });
        trace!("Ticket {}: transferred {} -> {}", ticket.id, from, to);
        Ok(())
    }

    /// Preconditions of [`Self::transfer`], usable before resolving the recipient.
    pub fn ensure_transferable(ticket: &Ticket, from: CustomerId) -> Result<(), InventoryError> {
        if ticket.status != TicketStatus::Sold || ticket.check_in.is_some() {
            return Err(InventoryError::InvalidTransition {
                ticket: ticket.id.to_string(),
                from: ticket.status,
                to: TicketStatus::Sold,
            });
        }
        if ticket.customer_id != Some(from) {
            return Err(InventoryError::OwnershipMismatch {
                ticket: ticket.id.to_string(),
                customer: from.to_string(),
            });
        }
        Ok(())
    }

    fn ensure_ledger(ticket: &Ticket, ledger: &InventoryLedger) -> Result<(), InventoryError> {
        if ledger.ticket_type_id() != ticket.ticket_type_id {
            return Err(InventoryError::InvalidRequest {
                message: format!(
                    "ticket {} belongs to ticket type {}, not {}",
                    ticket.id,
                    ticket.ticket_type_id,
                    ledger.ticket_type_id()
                ),
            });
        }
        Ok(())
    }

    fn blank(new: NewTicket, status: TicketStatus, now: u64) -> Ticket {
        Ticket {
            id: new.id,
            ticket_type_id: new.ticket_type_id,
            event_id: new.event_id,
            customer_id: new.customer_id,
            order_id: new.order_id,
            code: new.code,
            secret_hash: new.secret_hash,
            status,
            attendee: new.attendee,
            reservation: None,
            sale: None,
            check_in: None,
            transfer: None,
            created_at: now,
            updated_at: now,
            history: vec![StatusChange {
                from: None,
                to: status,
                at: now,
                note: None,
            }],
        }
    }
}

//! Issuance workflows: direct sale and timed reservation.
//!
//! Each workflow debits the ledger once for the whole quantity, mints a code
//! and secret per ticket, builds the tickets in their initial status and
//! stores them. Every forward step after the debit records the action that
//! undoes it; on any later failure (including cancellation or a passed
//! deadline) the recorded actions run in reverse before the error is
//! returned. A rollback that cannot complete surfaces as
//! [`InventoryError::CompensationFailed`].

use super::engine::InventoryEngine;
use super::error::InventoryError;
use super::events::InventoryEvent;
use super::state_machine::{NewTicket, TicketStateMachine};
use super::ticket::{AttendeeInfo, ReservationHold, Ticket, TicketStatus};
use super::ticket_type::TicketType;
use super::types::{CustomerId, EventId, OrderId, TicketId, TicketTypeId};
use crate::utils::MINUTE_MS;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Direct purchase of `quantity` tickets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleRequest {
    /// Ticket type to sell from
    pub ticket_type_id: TicketTypeId,
    /// Event the ticket type belongs to
    pub event_id: EventId,
    /// Buyer
    pub customer_id: CustomerId,
    /// Order the tickets are sold under
    pub order_id: Option<OrderId>,
    /// Number of tickets
    pub quantity: u32,
    /// Attendee details copied onto every ticket
    pub attendee: Option<AttendeeInfo>,
}

impl SaleRequest {
    /// One ticket for `customer_id`.
    pub fn new(ticket_type_id: TicketTypeId, event_id: EventId, customer_id: CustomerId) -> Self {
        Self {
            ticket_type_id,
            event_id,
            customer_id,
            order_id: None,
            quantity: 1,
            attendee: None,
        }
    }

    /// Set the quantity.
    #[must_use]
    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// Attach an order.
    #[must_use]
    pub fn with_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    /// Attach attendee details.
    #[must_use]
    pub fn with_attendee(mut self, attendee: AttendeeInfo) -> Self {
        self.attendee = Some(attendee);
        self
    }
}

/// Timed hold on `quantity` tickets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    /// Ticket type to reserve from
    pub ticket_type_id: TicketTypeId,
    /// Event the ticket type belongs to
    pub event_id: EventId,
    /// Customer holding the reservation
    pub customer_id: CustomerId,
    /// Number of tickets
    pub quantity: u32,
    /// Hold duration; falls back to the event default, then the engine default
    pub ttl_minutes: Option<u32>,
}

impl ReservationRequest {
    /// One ticket held for `customer_id` with the default TTL.
    pub fn new(ticket_type_id: TicketTypeId, event_id: EventId, customer_id: CustomerId) -> Self {
        Self {
            ticket_type_id,
            event_id,
            customer_id,
            quantity: 1,
            ttl_minutes: None,
        }
    }

    /// Set the quantity.
    #[must_use]
    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// Set an explicit hold duration.
    #[must_use]
    pub fn with_ttl_minutes(mut self, ttl_minutes: u32) -> Self {
        self.ttl_minutes = Some(ttl_minutes);
        self
    }
}

/// Cancellation and deadline for one issuance call.
#[derive(Debug, Clone, Default)]
pub struct IssueOptions {
    /// Absolute deadline in epoch milliseconds; defaults to now + `issuance_timeout_ms`
    pub deadline: Option<u64>,
    /// Cooperative cancellation signal
    pub cancel: Option<CancellationToken>,
}

impl IssueOptions {
    /// Set an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: u64) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Observe `token` between workflow steps.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// A ticket handed to its buyer, with the gate secret shown only this once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedTicket {
    /// The stored ticket
    pub ticket: Ticket,
    /// Gate secret in clear
    pub secret: String,
}

/// Undo step recorded after a successful forward step.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Compensation {
    ReleaseReserved(u32),
    CancelSold(u32),
    ReleaseCode(String),
    RemoveTicket(TicketId),
}

struct Workflow<'a> {
    ticket_type: &'a TicketType,
    options: &'a IssueOptions,
    deadline: u64,
    undo: Vec<Compensation>,
}

impl InventoryEngine {
    /// Sell `request.quantity` tickets directly.
    ///
    /// # Errors
    /// - [`InventoryError::InvalidQuantity`] / [`InventoryError::OrderLimit`] for a bad quantity
    /// - [`InventoryError::NotFound`] for an unknown event, ticket type or customer
    /// - [`InventoryError::NotOnSale`] when the event or ticket type is not selling
    /// - [`InventoryError::InsufficientInventory`] / [`InventoryError::Contention`] from the ledger
    /// - [`InventoryError::Cancelled`] / [`InventoryError::DeadlineExceeded`], after compensation
    /// - [`InventoryError::CompensationFailed`] when a rollback could not complete
    pub fn issue_sale(
        &self,
        request: SaleRequest,
        options: IssueOptions,
    ) -> Result<Vec<IssuedTicket>, InventoryError> {
        let now = self.now();
        let ticket_type = self.validate_issuance(
            request.ticket_type_id,
            request.event_id,
            request.customer_id,
            request.quantity,
            now,
        )?;
        let mut workflow = self.start_workflow(&ticket_type, &options, now)?;
        let price = ticket_type.pricing().stamp();

        ticket_type.ledger().sell(request.quantity)?;
        workflow.undo.push(Compensation::CancelSold(request.quantity));
        debug!(
            "Ticket type {}: sold {} for customer {}",
            ticket_type.id(),
            request.quantity,
            request.customer_id
        );

        let result = self.mint_and_store(&mut workflow, request.quantity, |new| {
            TicketStateMachine::initialize_sold(
                NewTicket {
                    customer_id: Some(request.customer_id),
                    order_id: request.order_id,
                    attendee: request.attendee.clone(),
                    ..new
                },
                price.clone(),
                now,
            )
        });
        self.finish_workflow(workflow, result, TicketStatus::Sold, now)
    }

    /// Hold `request.quantity` tickets until the reservation deadline.
    ///
    /// The TTL is the request's, else the event default, else
    /// `default_reservation_ttl_ms`.
    ///
    /// # Errors
    /// As [`Self::issue_sale`], plus [`InventoryError::ReservationsDisabled`].
    pub fn issue_reservation(
        &self,
        request: ReservationRequest,
        options: IssueOptions,
    ) -> Result<Vec<IssuedTicket>, InventoryError> {
        let now = self.now();
        let event = self.event(request.event_id)?;
        if !event.allow_reservations {
            return Err(InventoryError::ReservationsDisabled {
                event: event.id.to_string(),
            });
        }
        let ticket_type = self.validate_issuance(
            request.ticket_type_id,
            request.event_id,
            request.customer_id,
            request.quantity,
            now,
        )?;
        let ttl_ms = request
            .ttl_minutes
            .or(event.reservation_duration_minutes)
            .filter(|minutes| *minutes > 0)
            .map_or(self.config.default_reservation_ttl_ms, |minutes| {
                u64::from(minutes) * MINUTE_MS
            });
        let mut workflow = self.start_workflow(&ticket_type, &options, now)?;

        ticket_type.ledger().reserve(request.quantity)?;
        workflow.undo.push(Compensation::ReleaseReserved(request.quantity));
        debug!(
            "Ticket type {}: reserved {} for customer {} ({} ms)",
            ticket_type.id(),
            request.quantity,
            request.customer_id,
            ttl_ms
        );

        let hold = ReservationHold {
            reserved_at: now,
            reserved_by: Some(request.customer_id),
            expires_at: now.saturating_add(ttl_ms),
        };
        let result = self.mint_and_store(&mut workflow, request.quantity, |new| {
            TicketStateMachine::initialize_reserved(
                NewTicket {
                    customer_id: Some(request.customer_id),
                    ..new
                },
                hold.clone(),
                now,
            )
        });
        self.finish_workflow(workflow, result, TicketStatus::Reserved, now)
    }

    fn validate_issuance(
        &self,
        ticket_type_id: TicketTypeId,
        event_id: EventId,
        customer_id: CustomerId,
        quantity: u32,
        now: u64,
    ) -> Result<Arc<TicketType>, InventoryError> {
        if quantity == 0 {
            return Err(InventoryError::InvalidQuantity { quantity });
        }
        let event = self.event(event_id)?;
        if !event.status.is_active_for_sales() {
            return Err(InventoryError::NotOnSale {
                reason: format!("event {} is {:?}", event.id, event.status),
            });
        }
        let ticket_type = self.ticket_type(ticket_type_id)?;
        if ticket_type.event_id() != event_id {
            return Err(InventoryError::InvalidRequest {
                message: format!(
                    "ticket type {} does not belong to event {}",
                    ticket_type_id, event_id
                ),
            });
        }
        ticket_type.ensure_on_sale(now)?;
        if !self.customers.customer_exists(customer_id) {
            return Err(InventoryError::not_found("customer", customer_id));
        }
        ticket_type.order_limits().check(quantity)?;
        Ok(ticket_type)
    }

    fn start_workflow<'a>(
        &self,
        ticket_type: &'a TicketType,
        options: &'a IssueOptions,
        now: u64,
    ) -> Result<Workflow<'a>, InventoryError> {
        let workflow = Workflow {
            ticket_type,
            options,
            deadline: options
                .deadline
                .unwrap_or_else(|| now.saturating_add(self.config.issuance_timeout_ms)),
            undo: Vec::new(),
        };
        self.ensure_running(&workflow)?;
        Ok(workflow)
    }

    fn ensure_running(&self, workflow: &Workflow<'_>) -> Result<(), InventoryError> {
        if workflow
            .options
            .cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Err(InventoryError::Cancelled);
        }
        let now = self.now();
        if now > workflow.deadline {
            return Err(InventoryError::DeadlineExceeded {
                now,
                deadline: workflow.deadline,
            });
        }
        Ok(())
    }

    /// Mint credentials and build every ticket, then store them all.
    ///
    /// Rows are only written once every ticket was built, so a failure while
    /// minting leaves nothing to remove but the claimed codes.
    fn mint_and_store<F>(
        &self,
        workflow: &mut Workflow<'_>,
        quantity: u32,
        mut build: F,
    ) -> Result<Vec<IssuedTicket>, InventoryError>
    where
        F: FnMut(NewTicket) -> Ticket,
    {
        let mut pending = Vec::with_capacity(quantity as usize);
        for _ in 0..quantity {
            self.ensure_running(workflow)?;
            let ticket_id = TicketId::new();
            let credentials = self
                .issuer
                .mint(|code| self.store.claim_code(code, ticket_id))?;
            workflow
                .undo
                .push(Compensation::ReleaseCode(credentials.code.clone()));

            let ticket = build(NewTicket {
                id: ticket_id,
                ticket_type_id: workflow.ticket_type.id(),
                event_id: workflow.ticket_type.event_id(),
                customer_id: None,
                order_id: None,
                code: credentials.code,
                secret_hash: credentials.secret_hash,
                attendee: None,
            });
            pending.push(IssuedTicket {
                ticket,
                secret: credentials.secret,
            });
        }

        self.ensure_running(workflow)?;
        for issued in &pending {
            self.store.insert(issued.ticket.clone())?;
            workflow
                .undo
                .push(Compensation::RemoveTicket(issued.ticket.id));
        }
        Ok(pending)
    }

    fn finish_workflow(
        &self,
        workflow: Workflow<'_>,
        result: Result<Vec<IssuedTicket>, InventoryError>,
        status: TicketStatus,
        now: u64,
    ) -> Result<Vec<IssuedTicket>, InventoryError> {
        let ticket_type = workflow.ticket_type;
        match result {
            Ok(issued) => {
                info!(
                    "Ticket type {}: issued {} {} ticket(s)",
                    ticket_type.id(),
                    issued.len(),
                    status
                );
                #[cfg(feature = "metrics")]
                metrics::counter!("ticketbook_tickets_issued_total", "status" => status.as_str())
                    .increment(issued.len() as u64);

                self.publish(InventoryEvent::TicketsIssued {
                    ticket_type_id: ticket_type.id(),
                    ticket_ids: issued.iter().map(|i| i.ticket.id).collect(),
                    status,
                    at: now,
                });
                Ok(issued)
            }
            Err(cause) => {
                #[cfg(feature = "metrics")]
                metrics::counter!("ticketbook_issuance_failed_total").increment(1);

                Err(self.compensate(ticket_type, workflow.undo, cause))
            }
        }
    }

    /// Run recorded undo steps newest first. Returns the error to surface.
    fn compensate(
        &self,
        ticket_type: &TicketType,
        undo: Vec<Compensation>,
        cause: InventoryError,
    ) -> InventoryError {
        let mut quantity = 0;
        let mut failures = Vec::new();

        for step in undo.into_iter().rev() {
            let outcome = match &step {
                Compensation::ReleaseReserved(qty) => {
                    quantity = *qty;
                    ticket_type.ledger().release(*qty).map(|_| ())
                }
                Compensation::CancelSold(qty) => {
                    quantity = *qty;
                    ticket_type.ledger().cancel_sold(*qty).map(|_| ())
                }
                Compensation::ReleaseCode(code) => {
                    self.store.release_code(code);
                    Ok(())
                }
                Compensation::RemoveTicket(ticket_id) => {
                    self.store.remove(*ticket_id);
                    Ok(())
                }
            };
            if let Err(err) = outcome {
                failures.push(format!("{step:?}: {err}"));
            }
        }

        let at = self.now();
        if failures.is_empty() {
            warn!(
                "Ticket type {}: issuance of {} rolled back after: {}",
                ticket_type.id(),
                quantity,
                cause
            );
            #[cfg(feature = "metrics")]
            metrics::counter!("ticketbook_compensations_total").increment(1);

            self.publish(InventoryEvent::IssuanceCompensated {
                ticket_type_id: ticket_type.id(),
                quantity,
                cause: cause.to_string(),
                at,
            });
            return cause;
        }

        let details = failures.join("; ");
        error!(
            "Ticket type {}: COMPENSATION FAILED after `{}`: {}",
            ticket_type.id(),
            cause,
            details
        );
        #[cfg(feature = "metrics")]
        metrics::counter!("ticketbook_compensation_failed_total").increment(1);

        self.publish(InventoryEvent::CompensationFailed {
            ticket_type_id: ticket_type.id(),
            cause: cause.to_string(),
            details: details.clone(),
            at,
        });
        InventoryError::CompensationFailed {
            cause: cause.to_string(),
            details,
        }
    }
}

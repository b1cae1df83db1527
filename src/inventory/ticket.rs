//! Ticket records and the closed set of ticket statuses.

use super::fees::PriceStamp;
use super::types::{CustomerId, EventId, OrderId, TicketId, TicketTypeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a ticket.
///
/// The legal edges between statuses are defined by [`TicketStatus::can_transition_to`];
/// adding a variant forces that match to be extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Minted but holding no capacity
    Available,
    /// Holding one reserved unit until the reservation deadline
    Reserved,
    /// Holding one sold unit
    Sold,
    /// Admitted at the gate (terminal)
    CheckedIn,
    /// Cancelled, capacity returned (terminal)
    Cancelled,
    /// Refunded, capacity returned (terminal)
    Refunded,
    /// Reservation lapsed, capacity returned (terminal)
    Expired,
}

impl TicketStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [TicketStatus; 7] = [
        TicketStatus::Available,
        TicketStatus::Reserved,
        TicketStatus::Sold,
        TicketStatus::CheckedIn,
        TicketStatus::Cancelled,
        TicketStatus::Refunded,
        TicketStatus::Expired,
    ];

    /// Statuses reachable from `self` in one step.
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [TicketStatus] {
        use TicketStatus::*;
        match self {
            Available => &[Reserved, Sold, Cancelled, Expired],
            Reserved => &[Sold, Available, Cancelled, Expired],
            Sold => &[CheckedIn, Cancelled, Refunded],
            CheckedIn | Cancelled | Refunded | Expired => &[],
        }
    }

    /// `true` when `self -> to` is a legal edge.
    #[must_use]
    pub fn can_transition_to(self, to: TicketStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// `true` for statuses with no outgoing edges.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// `true` when a ticket in this status holds a unit of capacity.
    #[must_use]
    pub fn holds_capacity(self) -> bool {
        matches!(
            self,
            TicketStatus::Reserved | TicketStatus::Sold | TicketStatus::CheckedIn
        )
    }

    /// Wire name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Available => "available",
            TicketStatus::Reserved => "reserved",
            TicketStatus::Sold => "sold",
            TicketStatus::CheckedIn => "checked_in",
            TicketStatus::Cancelled => "cancelled",
            TicketStatus::Refunded => "refunded",
            TicketStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live reservation hold. Present iff the ticket is `reserved`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationHold {
    /// When the hold was taken
    pub reserved_at: u64,
    /// Customer holding the reservation, if known
    pub reserved_by: Option<CustomerId>,
    /// Deadline after which the reaper reclaims the unit
    pub expires_at: u64,
}

/// How the ticket was presented at the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInMethod {
    /// Scanned QR/barcode
    #[default]
    QrScan,
    /// NFC tap
    Nfc,
    /// Looked up and admitted by staff
    Manual,
}

/// Admission details, written on the first check-in and read-only afterwards
/// except for the validation counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInRecord {
    /// Time of admission
    pub checked_in_at: u64,
    /// Staff member or device that admitted the ticket
    pub checked_in_by: String,
    /// Presentation method
    pub method: CheckInMethod,
    /// Gate or entrance, if reported
    pub location: Option<String>,
    /// Successful validations, the check-in included
    pub validation_count: u32,
    /// Time of the latest successful validation
    pub last_validated_at: u64,
}

/// Latest ownership change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Previous holder
    pub transferred_from: CustomerId,
    /// Token minted for the transfer
    pub transfer_token: String,
    /// Time of the transfer
    pub transferred_at: u64,
}

/// Sale details copied onto the ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecord {
    /// Time of sale
    pub sold_at: u64,
    /// Amounts charged
    pub price: PriceStamp,
}

/// One entry of the ticket's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Status before the change, `None` for creation
    pub from: Option<TicketStatus>,
    /// Status after the change
    pub to: TicketStatus,
    /// Time of the change
    pub at: u64,
    /// Optional free-form reason
    pub note: Option<String>,
}

/// Attendee details supplied at purchase.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttendeeInfo {
    /// Attendee name
    pub name: Option<String>,
    /// Attendee e-mail
    pub email: Option<String>,
}

/// A single admission, owned by one unit of its ticket type's capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Identifier
    pub id: TicketId,
    /// Owning ticket type
    pub ticket_type_id: TicketTypeId,
    /// Owning event
    pub event_id: EventId,
    /// Current holder
    pub customer_id: Option<CustomerId>,
    /// Order the ticket was sold under
    pub order_id: Option<OrderId>,
    /// Public, human-presentable code
    pub code: String,
    /// Hash of the gate secret; never serialized outward
    #[serde(skip_serializing, default)]
    pub secret_hash: String,
    /// Current status
    pub status: TicketStatus,
    /// Attendee details
    pub attendee: Option<AttendeeInfo>,
    /// Present iff `status == Reserved`
    pub reservation: Option<ReservationHold>,
    /// Present once sold
    pub sale: Option<SaleRecord>,
    /// Present once checked in
    pub check_in: Option<CheckInRecord>,
    /// Present after the latest transfer
    pub transfer: Option<TransferRecord>,
    /// Creation time
    pub created_at: u64,
    /// Last mutation time
    pub updated_at: u64,
    /// Every status change, oldest first
    pub history: Vec<StatusChange>,
}

impl Ticket {
    /// Reservation deadline, when reserved.
    #[must_use]
    pub fn reservation_expires_at(&self) -> Option<u64> {
        self.reservation.as_ref().map(|hold| hold.expires_at)
    }

    /// Time of admission, when checked in.
    #[must_use]
    pub fn checked_in_at(&self) -> Option<u64> {
        self.check_in.as_ref().map(|record| record.checked_in_at)
    }

    /// Number of successful validations.
    #[must_use]
    pub fn validation_count(&self) -> u32 {
        self.check_in
            .as_ref()
            .map_or(0, |record| record.validation_count)
    }

    /// `true` when reserved and the deadline is strictly before `now`.
    #[must_use]
    pub fn is_reservation_due(&self, now: u64) -> bool {
        self.status == TicketStatus::Reserved
            && self
                .reservation_expires_at()
                .is_some_and(|expires_at| expires_at < now)
    }

    pub(crate) fn record_status(&mut self, to: TicketStatus, at: u64, note: Option<String>) {
        let from = self.status;
        self.status = to;
        self.updated_at = at;
        self.history.push(StatusChange {
            from: Some(from),
            to,
            at,
            note,
        });
    }
}

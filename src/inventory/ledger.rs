//! Atomic per-ticket-type quantity ledger.
//!
//! The ledger owns the committed counters of one ticket type: `total`,
//! `reserved` and `sold`. `available` is never stored, it is always derived as
//! `total - reserved - sold` from a single consistent read.
//!
//! Every mutation is one compare-and-swap over the whole counter block:
//! the current value is loaded, the delta is validated against the invariant
//! `reserved + sold <= total`, and the new block is committed only if nobody
//! else committed in between. A lost race retries with exponential backoff up
//! to a bounded number of attempts and then fails with
//! [`InventoryError::Contention`]. A validation failure returns immediately
//! with no partial effect.
//!
//! The counter block also carries a `version` that increments on every
//! commit, so two snapshots with the same version observed the same state.

use super::error::InventoryError;
use super::types::TicketTypeId;
use crossbeam::atomic::AtomicCell;
use crossbeam::utils::Backoff;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// Default bound on compare-and-swap attempts per ledger operation.
pub const DEFAULT_LEDGER_MAX_ATTEMPTS: u32 = 128;

/// The committed counters of one ticket type, read and written as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerCounters {
    /// Fixed capacity of the ticket type
    pub total: u32,
    /// Quantity held by live reservations
    pub reserved: u32,
    /// Quantity sold
    pub sold: u32,
    /// Commit counter, incremented by every successful mutation
    pub version: u32,
}

impl LedgerCounters {
    /// `total - reserved - sold`, saturating at zero.
    #[must_use]
    #[inline]
    pub fn available(&self) -> u32 {
        self.total
            .saturating_sub(self.reserved)
            .saturating_sub(self.sold)
    }

    /// `reserved + sold`.
    #[must_use]
    #[inline]
    pub fn committed(&self) -> u32 {
        self.reserved.saturating_add(self.sold)
    }

    /// `true` when no capacity is left.
    #[must_use]
    #[inline]
    pub fn is_sold_out(&self) -> bool {
        self.available() == 0
    }

    /// `true` when `reserved + sold <= total` without overflow.
    #[must_use]
    #[inline]
    pub fn holds_invariant(&self) -> bool {
        self.reserved
            .checked_add(self.sold)
            .is_some_and(|committed| committed <= self.total)
    }
}

/// Kinds of ledger mutation, used in logs and contention reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerOp {
    /// `reserved += qty`
    Reserve,
    /// `reserved -= qty`
    Release,
    /// `sold += qty`
    Sell,
    /// `reserved -= qty; sold += qty`
    ConvertReservedToSold,
    /// `sold -= qty` (cancellation)
    CancelSold,
    /// `sold -= qty` (refund)
    RefundSold,
    /// `total = qty`
    SetTotal,
}

impl fmt::Display for LedgerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LedgerOp::Reserve => "reserve",
            LedgerOp::Release => "release",
            LedgerOp::Sell => "sell",
            LedgerOp::ConvertReservedToSold => "convert_reserved_to_sold",
            LedgerOp::CancelSold => "cancel_sold",
            LedgerOp::RefundSold => "refund_sold",
            LedgerOp::SetTotal => "set_total",
        };
        write!(f, "{name}")
    }
}

/// A point-in-time view of a ledger, as exposed to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Ticket type this snapshot belongs to
    pub ticket_type_id: TicketTypeId,
    /// Fixed capacity
    pub total: u32,
    /// Reserved quantity
    pub reserved: u32,
    /// Sold quantity
    pub sold: u32,
    /// Derived `total - reserved - sold`
    pub available: u32,
    /// Derived `available == 0`
    pub is_sold_out: bool,
    /// Commit counter at the time of the read
    pub version: u32,
}

/// Atomic quantity ledger for a single ticket type.
pub struct InventoryLedger {
    ticket_type_id: TicketTypeId,
    counters: AtomicCell<LedgerCounters>,
    max_attempts: u32,
}

impl fmt::Debug for InventoryLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InventoryLedger")
            .field("ticket_type_id", &self.ticket_type_id)
            .field("counters", &self.counters.load())
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl InventoryLedger {
    /// Create an empty ledger with `total` capacity.
    pub fn new(ticket_type_id: TicketTypeId, total: u32) -> Self {
        Self::with_max_attempts(ticket_type_id, total, DEFAULT_LEDGER_MAX_ATTEMPTS)
    }

    /// Create an empty ledger with an explicit retry bound.
    pub fn with_max_attempts(ticket_type_id: TicketTypeId, total: u32, max_attempts: u32) -> Self {
        Self {
            ticket_type_id,
            counters: AtomicCell::new(LedgerCounters {
                total,
                ..LedgerCounters::default()
            }),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Restore a ledger from persisted counters.
    ///
    /// # Errors
    /// Returns [`InventoryError::CapacityBelowCommitted`] when the counters
    /// violate `reserved + sold <= total`.
    pub fn from_counters(
        ticket_type_id: TicketTypeId,
        counters: LedgerCounters,
        max_attempts: u32,
    ) -> Result<Self, InventoryError> {
        if !counters.holds_invariant() {
            return Err(InventoryError::CapacityBelowCommitted {
                requested: counters.total,
                committed: counters.reserved.saturating_add(counters.sold),
            });
        }
        Ok(Self {
            ticket_type_id,
            counters: AtomicCell::new(counters),
            max_attempts: max_attempts.max(1),
        })
    }

    /// Copy of this ledger under another id and retry bound, counters and
    /// version included. Requires exclusive ownership of the source, so no
    /// commit can land between the read and the copy.
    pub(crate) fn rebound(&mut self, ticket_type_id: TicketTypeId, max_attempts: u32) -> Self {
        Self {
            ticket_type_id,
            counters: AtomicCell::new(self.counters.load()),
            max_attempts: max_attempts.max(1),
        }
    }

    /// The ticket type this ledger belongs to.
    #[must_use]
    pub fn ticket_type_id(&self) -> TicketTypeId {
        self.ticket_type_id
    }

    /// Bound on compare-and-swap attempts per operation.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// A consistent read of all counters.
    #[must_use]
    #[inline]
    pub fn counters(&self) -> LedgerCounters {
        self.counters.load()
    }

    /// A consistent read packaged for collaborators.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        let c = self.counters.load();
        LedgerSnapshot {
            ticket_type_id: self.ticket_type_id,
            total: c.total,
            reserved: c.reserved,
            sold: c.sold,
            available: c.available(),
            is_sold_out: c.is_sold_out(),
            version: c.version,
        }
    }

    /// Derived available quantity.
    #[must_use]
    pub fn available(&self) -> u32 {
        self.counters.load().available()
    }

    /// Derived sold-out flag.
    #[must_use]
    pub fn is_sold_out(&self) -> bool {
        self.counters.load().is_sold_out()
    }

    /// Hold `qty` units for a reservation.
    ///
    /// # Errors
    /// [`InventoryError::InvalidQuantity`] for zero,
    /// [`InventoryError::InsufficientInventory`] when `available < qty`,
    /// [`InventoryError::Contention`] when the retry bound is exhausted.
    pub fn reserve(&self, qty: u32) -> Result<LedgerCounters, InventoryError> {
        self.commit(LedgerOp::Reserve, qty, |c| {
            self.ensure_available(&c, qty)?;
            Ok(LedgerCounters {
                reserved: c.reserved + qty,
                ..c
            })
        })
    }

    /// Return `qty` reserved units to the pool.
    ///
    /// # Errors
    /// [`InventoryError::LedgerUnderflow`] when `reserved < qty`.
    pub fn release(&self, qty: u32) -> Result<LedgerCounters, InventoryError> {
        self.commit(LedgerOp::Release, qty, |c| {
            let reserved = self.checked_remove("reserved", c.reserved, qty)?;
            Ok(LedgerCounters { reserved, ..c })
        })
    }

    /// Sell `qty` units directly, without a prior reservation.
    ///
    /// # Errors
    /// [`InventoryError::InsufficientInventory`] when `available < qty`.
    pub fn sell(&self, qty: u32) -> Result<LedgerCounters, InventoryError> {
        self.commit(LedgerOp::Sell, qty, |c| {
            self.ensure_available(&c, qty)?;
            Ok(LedgerCounters {
                sold: c.sold + qty,
                ..c
            })
        })
    }

    /// Move `qty` units from reserved to sold in one step.
    ///
    /// # Errors
    /// [`InventoryError::LedgerUnderflow`] when `reserved < qty`.
    pub fn convert_reserved_to_sold(&self, qty: u32) -> Result<LedgerCounters, InventoryError> {
        self.commit(LedgerOp::ConvertReservedToSold, qty, |c| {
            let reserved = self.checked_remove("reserved", c.reserved, qty)?;
            Ok(LedgerCounters {
                reserved,
                sold: c.sold + qty,
                ..c
            })
        })
    }

    /// Return `qty` cancelled sold units to the pool.
    ///
    /// # Errors
    /// [`InventoryError::LedgerUnderflow`] when `sold < qty`.
    pub fn cancel_sold(&self, qty: u32) -> Result<LedgerCounters, InventoryError> {
        self.remove_sold(LedgerOp::CancelSold, qty)
    }

    /// Return `qty` refunded sold units to the pool.
    ///
    /// # Errors
    /// [`InventoryError::LedgerUnderflow`] when `sold < qty`.
    pub fn refund_sold(&self, qty: u32) -> Result<LedgerCounters, InventoryError> {
        self.remove_sold(LedgerOp::RefundSold, qty)
    }

    /// Change the capacity. The new total may not drop below `reserved + sold`.
    ///
    /// # Errors
    /// [`InventoryError::CapacityBelowCommitted`] when it would.
    pub fn set_total(&self, total: u32) -> Result<LedgerCounters, InventoryError> {
        self.try_commit(LedgerOp::SetTotal, total, |c| {
            if total < c.committed() {
                return Err(InventoryError::CapacityBelowCommitted {
                    requested: total,
                    committed: c.committed(),
                });
            }
            Ok(LedgerCounters { total, ..c })
        })
    }

    fn remove_sold(&self, op: LedgerOp, qty: u32) -> Result<LedgerCounters, InventoryError> {
        self.commit(op, qty, |c| {
            let sold = self.checked_remove("sold", c.sold, qty)?;
            Ok(LedgerCounters { sold, ..c })
        })
    }

    fn ensure_available(&self, c: &LedgerCounters, qty: u32) -> Result<(), InventoryError> {
        let available = c.available();
        if available < qty {
            return Err(InventoryError::InsufficientInventory {
                ticket_type: self.ticket_type_id.to_string(),
                requested: qty,
                available,
            });
        }
        Ok(())
    }

    fn checked_remove(
        &self,
        counter: &'static str,
        current: u32,
        qty: u32,
    ) -> Result<u32, InventoryError> {
        current
            .checked_sub(qty)
            .ok_or_else(|| InventoryError::LedgerUnderflow {
                ticket_type: self.ticket_type_id.to_string(),
                counter,
                requested: qty,
                current,
            })
    }

    /// Quantity-carrying mutation: rejects zero before touching the counters.
    fn commit<F>(&self, op: LedgerOp, qty: u32, apply: F) -> Result<LedgerCounters, InventoryError>
    where
        F: Fn(LedgerCounters) -> Result<LedgerCounters, InventoryError>,
    {
        if qty == 0 {
            return Err(InventoryError::InvalidQuantity { quantity: qty });
        }
        self.try_commit(op, qty, apply)
    }

    /// Load, validate, compare-and-swap; retry only when another writer won.
    fn try_commit<F>(
        &self,
        op: LedgerOp,
        qty: u32,
        apply: F,
    ) -> Result<LedgerCounters, InventoryError>
    where
        F: Fn(LedgerCounters) -> Result<LedgerCounters, InventoryError>,
    {
        let backoff = Backoff::new();
        for attempt in 1..=self.max_attempts {
            let current = self.counters.load();
            let mut next = apply(current)?;
            next.version = current.version.wrapping_add(1);
            debug_assert!(next.holds_invariant());

            if self.counters.compare_exchange(current, next).is_ok() {
                trace!(
                    "Ledger {}: {} {} committed (attempt {}): total={} reserved={} sold={} available={}",
                    self.ticket_type_id,
                    op,
                    qty,
                    attempt,
                    next.total,
                    next.reserved,
                    next.sold,
                    next.available()
                );
                return Ok(next);
            }
            backoff.snooze();
        }

        #[cfg(feature = "metrics")]
        metrics::counter!("ticketbook_ledger_contention_total").increment(1);

        Err(InventoryError::Contention {
            ticket_type: self.ticket_type_id.to_string(),
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(total: u32) -> InventoryLedger {
        InventoryLedger::new(TicketTypeId::new(), total)
    }

    #[test]
    fn test_available_is_derived() {
        let c = LedgerCounters {
            total: 10,
            reserved: 3,
            sold: 4,
            version: 0,
        };
        assert_eq!(c.available(), 3);
        assert!(!c.is_sold_out());
        assert!(c.holds_invariant());
    }

    #[test]
    fn test_version_increments_on_commit_only() {
        let l = ledger(2);
        assert_eq!(l.counters().version, 0);
        l.reserve(1).expect("reserve");
        assert_eq!(l.counters().version, 1);
        assert!(l.reserve(5).is_err());
        assert_eq!(l.counters().version, 1);
    }

    #[test]
    fn test_from_counters_rejects_broken_invariant() {
        let broken = LedgerCounters {
            total: 1,
            reserved: 1,
            sold: 1,
            version: 0,
        };
        let result = InventoryLedger::from_counters(TicketTypeId::new(), broken, 4);
        assert!(matches!(
            result,
            Err(InventoryError::CapacityBelowCommitted { .. })
        ));
    }

    #[test]
    fn test_ledger_op_display() {
        assert_eq!(
            LedgerOp::ConvertReservedToSold.to_string(),
            "convert_reserved_to_sold"
        );
    }
}

//! Ticket types: finite, priced capacity pools owned by an event.

use super::error::InventoryError;
use super::fees::Pricing;
use super::ledger::{DEFAULT_LEDGER_MAX_ATTEMPTS, InventoryLedger, LedgerCounters, LedgerSnapshot};
use super::types::{EventId, TicketTypeId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Time range in which a ticket type can be sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SaleWindow {
    /// First millisecond of the sale
    pub starts_at: u64,
    /// Last millisecond of the sale, open-ended when `None`
    pub ends_at: Option<u64>,
}

impl SaleWindow {
    /// Window open from `starts_at` with no end.
    pub fn open_from(starts_at: u64) -> Self {
        Self {
            starts_at,
            ends_at: None,
        }
    }

    /// `true` when `now` falls inside the window.
    #[must_use]
    pub fn contains(&self, now: u64) -> bool {
        now >= self.starts_at && self.ends_at.is_none_or(|end| now <= end)
    }
}

/// Per-order quantity bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLimits {
    /// Minimum tickets per order
    pub min_per_order: u32,
    /// Maximum tickets per order
    pub max_per_order: u32,
}

impl Default for OrderLimits {
    fn default() -> Self {
        Self {
            min_per_order: 1,
            max_per_order: 10,
        }
    }
}

impl OrderLimits {
    /// Validate an order quantity against the bounds.
    ///
    /// # Errors
    /// [`InventoryError::InvalidQuantity`] for zero,
    /// [`InventoryError::OrderLimit`] outside `min..=max`.
    pub fn check(&self, quantity: u32) -> Result<(), InventoryError> {
        if quantity == 0 {
            return Err(InventoryError::InvalidQuantity { quantity });
        }
        if quantity < self.min_per_order || quantity > self.max_per_order {
            return Err(InventoryError::OrderLimit {
                quantity,
                min: self.min_per_order,
                max: self.max_per_order,
            });
        }
        Ok(())
    }
}

/// A class of admission with its own finite capacity.
///
/// Descriptive terms (window, limits, pricing) are fixed once the type is
/// registered; only the embedded ledger and the `active` flag change after
/// that, both atomically.
#[derive(Debug)]
pub struct TicketType {
    id: TicketTypeId,
    event_id: EventId,
    name: String,
    sale_window: SaleWindow,
    order_limits: OrderLimits,
    pricing: Pricing,
    active: AtomicBool,
    ledger: InventoryLedger,
}

impl TicketType {
    /// Create an active ticket type with `total_quantity` capacity, open for
    /// sale from the epoch, default order limits and free pricing.
    pub fn new(event_id: EventId, name: impl Into<String>, total_quantity: u32) -> Self {
        let id = TicketTypeId::new();
        Self {
            id,
            event_id,
            name: name.into(),
            sale_window: SaleWindow::default(),
            order_limits: OrderLimits::default(),
            pricing: Pricing::default(),
            active: AtomicBool::new(true),
            ledger: InventoryLedger::new(id, total_quantity),
        }
    }

    /// Restore a ticket type from persisted counters.
    ///
    /// # Errors
    /// [`InventoryError::CapacityBelowCommitted`] when the counters violate
    /// `reserved + sold <= total`.
    pub fn from_counters(
        id: TicketTypeId,
        event_id: EventId,
        name: impl Into<String>,
        counters: LedgerCounters,
    ) -> Result<Self, InventoryError> {
        let ledger = InventoryLedger::from_counters(id, counters, DEFAULT_LEDGER_MAX_ATTEMPTS)?;
        Ok(Self {
            ledger,
            ..Self::new(event_id, name, 0).with_id(id)
        })
    }

    /// Use a fixed identifier instead of a random one. Counters are kept.
    #[must_use]
    pub fn with_id(mut self, id: TicketTypeId) -> Self {
        let max_attempts = self.ledger.max_attempts();
        self.id = id;
        self.ledger = self.ledger.rebound(id, max_attempts);
        self
    }

    /// Set the sale window.
    #[must_use]
    pub fn with_sale_window(mut self, sale_window: SaleWindow) -> Self {
        self.sale_window = sale_window;
        self
    }

    /// Set the per-order bounds.
    #[must_use]
    pub fn with_order_limits(mut self, min_per_order: u32, max_per_order: u32) -> Self {
        self.order_limits = OrderLimits {
            min_per_order,
            max_per_order,
        };
        self
    }

    /// Set the pricing terms.
    #[must_use]
    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Replace the ledger retry bound, keeping the current counters.
    #[must_use]
    pub(crate) fn with_ledger_max_attempts(mut self, max_attempts: u32) -> Self {
        self.ledger = self.ledger.rebound(self.id, max_attempts);
        self
    }

    /// Identifier.
    #[must_use]
    pub fn id(&self) -> TicketTypeId {
        self.id
    }

    /// Owning event.
    #[must_use]
    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sale window.
    #[must_use]
    pub fn sale_window(&self) -> SaleWindow {
        self.sale_window
    }

    /// Per-order bounds.
    #[must_use]
    pub fn order_limits(&self) -> OrderLimits {
        self.order_limits
    }

    /// Pricing terms.
    #[must_use]
    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    /// The quantity ledger.
    #[must_use]
    pub fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    /// Current counters.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }

    /// Whether the organizer has the ticket type switched on.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Switch the ticket type on or off.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Derived sold-out flag.
    #[must_use]
    pub fn is_sold_out(&self) -> bool {
        self.ledger.is_sold_out()
    }

    /// Check that the type can be sold at `now`.
    ///
    /// # Errors
    /// [`InventoryError::NotOnSale`] when inactive or outside the sale window.
    pub fn ensure_on_sale(&self, now: u64) -> Result<(), InventoryError> {
        if !self.is_active() {
            return Err(InventoryError::NotOnSale {
                reason: format!("ticket type {} is inactive", self.id),
            });
        }
        if !self.sale_window.contains(now) {
            return Err(InventoryError::NotOnSale {
                reason: format!(
                    "ticket type {} sale window [{}, {:?}] does not contain {}",
                    self.id, self.sale_window.starts_at, self.sale_window.ends_at, now
                ),
            });
        }
        Ok(())
    }
}

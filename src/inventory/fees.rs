//! Pricing terms stamped onto tickets at issuance.

use serde::{Deserialize, Serialize};

const BASIS_POINTS: u64 = 10_000;

/// Service fee policy of a ticket type.
///
/// Fees are expressed in basis points (bps), where 1 bps = 0.01%, plus an
/// optional fixed part in minor currency units. When `absorbed_by_organizer`
/// is set the fee is still computed (for settlement reporting) but is not
/// added to what the buyer pays.
///
/// # Examples
///
/// ```
/// use ticketbook_rs::FeePolicy;
///
/// // 5% + 0.99 per ticket, paid by the buyer
/// let policy = FeePolicy::new(500, 99);
/// assert_eq!(policy.calculate_fee(10_000), 599);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeePolicy {
    /// Percentage part of the fee, in basis points
    pub service_fee_bps: u32,
    /// Fixed part of the fee, in minor currency units
    pub fixed_fee: u64,
    /// Organizer pays the fee instead of the buyer
    pub absorbed_by_organizer: bool,
}

impl FeePolicy {
    /// Create a buyer-paid fee policy.
    #[must_use = "FeePolicy does nothing unless used"]
    pub fn new(service_fee_bps: u32, fixed_fee: u64) -> Self {
        Self {
            service_fee_bps,
            fixed_fee,
            absorbed_by_organizer: false,
        }
    }

    /// A policy that charges nothing.
    #[must_use]
    pub fn no_fee() -> Self {
        Self::default()
    }

    /// Mark the fee as absorbed by the organizer.
    #[must_use]
    pub fn absorbed(mut self) -> Self {
        self.absorbed_by_organizer = true;
        self
    }

    /// Fee for one ticket with the given base price.
    #[must_use]
    #[inline]
    pub fn calculate_fee(&self, base_price: u64) -> u64 {
        (base_price.saturating_mul(self.service_fee_bps as u64) / BASIS_POINTS)
            .saturating_add(self.fixed_fee)
    }

    /// `true` when the policy never charges anything.
    #[must_use]
    pub fn is_zero_fee(&self) -> bool {
        self.service_fee_bps == 0 && self.fixed_fee == 0
    }
}

/// Monetary terms of a ticket type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    /// Base price in minor currency units
    pub base_price: u64,
    /// ISO 4217 currency code
    pub currency: String,
    /// Tax rate in basis points, applied to the base price
    pub tax_rate_bps: u32,
    /// Service fee policy
    pub fees: FeePolicy,
}

impl Pricing {
    /// Pricing with no tax and no fees.
    pub fn new(base_price: u64, currency: impl Into<String>) -> Self {
        Self {
            base_price,
            currency: currency.into(),
            tax_rate_bps: 0,
            fees: FeePolicy::no_fee(),
        }
    }

    /// Set the tax rate.
    #[must_use]
    pub fn with_tax_rate_bps(mut self, tax_rate_bps: u32) -> Self {
        self.tax_rate_bps = tax_rate_bps;
        self
    }

    /// Set the fee policy.
    #[must_use]
    pub fn with_fees(mut self, fees: FeePolicy) -> Self {
        self.fees = fees;
        self
    }

    /// Compute the amounts recorded on one issued ticket.
    #[must_use]
    pub fn stamp(&self) -> PriceStamp {
        let tax = self
            .base_price
            .saturating_mul(self.tax_rate_bps as u64)
            / BASIS_POINTS;
        let fee = self.fees.calculate_fee(self.base_price);
        let buyer_fee = if self.fees.absorbed_by_organizer {
            0
        } else {
            fee
        };
        PriceStamp {
            base_price: self.base_price,
            tax,
            fee,
            total: self
                .base_price
                .saturating_add(tax)
                .saturating_add(buyer_fee),
            currency: self.currency.clone(),
        }
    }
}

impl Default for Pricing {
    fn default() -> Self {
        Self::new(0, "USD")
    }
}

/// Amounts copied onto a ticket when it is sold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceStamp {
    /// Base price in minor units
    pub base_price: u64,
    /// Tax amount in minor units
    pub tax: u64,
    /// Service fee in minor units (reported even when absorbed)
    pub fee: u64,
    /// What the buyer pays
    pub total: u64,
    /// ISO 4217 currency code
    pub currency: String,
}

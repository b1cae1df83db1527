//! Engine configuration.

use super::error::InventoryError;
use super::ledger::DEFAULT_LEDGER_MAX_ATTEMPTS;
use crate::utils::{HOUR_MS, MINUTE_MS};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables of an [`InventoryEngine`](super::engine::InventoryEngine).
///
/// Every field has a default, so a JSON document only needs to name the
/// values it overrides:
///
/// ```
/// use ticketbook_rs::EngineConfig;
///
/// let config = EngineConfig::from_json_str(r#"{ "code_prefix": "GIG" }"#).unwrap();
/// assert_eq!(config.code_prefix, "GIG");
/// assert_eq!(config.default_reservation_ttl_ms, 15 * 60_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reservation TTL used when neither the request nor the event sets one
    pub default_reservation_ttl_ms: u64,
    /// How long before the event start the gate opens
    pub check_in_opens_before_ms: u64,
    /// How long after the event end the gate stays open
    pub check_in_closes_after_ms: u64,
    /// Compare-and-swap attempts per ledger operation before `Contention`
    pub ledger_max_attempts: u32,
    /// Candidate codes drawn per ticket before `CodeSpaceExhausted`
    pub code_max_attempts: u32,
    /// Prefix of public ticket codes
    pub code_prefix: String,
    /// Random symbols per public ticket code
    pub code_length: usize,
    /// Wall-clock budget of one issuance workflow
    pub issuance_timeout_ms: u64,
    /// Period of the reservation expiry sweep
    pub reaper_interval_ms: u64,
    /// Maximum reservations expired per sweep
    pub reaper_batch_size: usize,
    /// Capacity of the bounded stats queue
    pub stats_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_reservation_ttl_ms: 15 * MINUTE_MS,
            check_in_opens_before_ms: HOUR_MS,
            check_in_closes_after_ms: 2 * HOUR_MS,
            ledger_max_attempts: DEFAULT_LEDGER_MAX_ATTEMPTS,
            code_max_attempts: 16,
            code_prefix: "TKT".to_string(),
            code_length: 10,
            issuance_timeout_ms: 5_000,
            reaper_interval_ms: 30_000,
            reaper_batch_size: 500,
            stats_queue_capacity: 1_024,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document, filling missing fields with defaults.
    ///
    /// # Errors
    /// [`InventoryError::Config`] on malformed JSON or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self, InventoryError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    ///
    /// # Errors
    /// [`InventoryError::Config`] when the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, InventoryError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    /// [`InventoryError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), InventoryError> {
        let invalid = |field: &str| -> Result<(), InventoryError> {
            Err(InventoryError::Config {
                message: format!("{field} must be greater than zero"),
            })
        };
        if self.default_reservation_ttl_ms == 0 {
            return invalid("default_reservation_ttl_ms");
        }
        if self.ledger_max_attempts == 0 {
            return invalid("ledger_max_attempts");
        }
        if self.code_max_attempts == 0 {
            return invalid("code_max_attempts");
        }
        if self.code_length == 0 {
            return invalid("code_length");
        }
        if self.reaper_interval_ms == 0 {
            return invalid("reaper_interval_ms");
        }
        if self.reaper_batch_size == 0 {
            return invalid("reaper_batch_size");
        }
        if self.stats_queue_capacity == 0 {
            return invalid("stats_queue_capacity");
        }
        Ok(())
    }

    /// Set the fallback reservation TTL.
    #[must_use]
    pub fn with_default_reservation_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.default_reservation_ttl_ms = ttl_ms;
        self
    }

    /// Set the check-in window margins.
    #[must_use]
    pub fn with_check_in_margins(mut self, opens_before_ms: u64, closes_after_ms: u64) -> Self {
        self.check_in_opens_before_ms = opens_before_ms;
        self.check_in_closes_after_ms = closes_after_ms;
        self
    }

    /// Set the ledger retry bound.
    #[must_use]
    pub fn with_ledger_max_attempts(mut self, attempts: u32) -> Self {
        self.ledger_max_attempts = attempts;
        self
    }

    /// Set the code collision retry bound.
    #[must_use]
    pub fn with_code_max_attempts(mut self, attempts: u32) -> Self {
        self.code_max_attempts = attempts;
        self
    }

    /// Set the issuance time budget.
    #[must_use]
    pub fn with_issuance_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.issuance_timeout_ms = timeout_ms;
        self
    }

    /// Set the reaper period and batch size.
    #[must_use]
    pub fn with_reaper(mut self, interval_ms: u64, batch_size: usize) -> Self {
        self.reaper_interval_ms = interval_ms;
        self.reaper_batch_size = batch_size;
        self
    }
}

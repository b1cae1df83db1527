//! Background reclamation of reservations past their deadline.

use super::engine::InventoryEngine;
use super::events::InventoryEvent;
use super::lifecycle::ExpiryOutcome;
use super::ticket::TicketStatus;
use super::types::TicketId;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    scanned: usize,
    expired: usize,
    skipped: usize,
    failed: usize,
    deferred: usize,
}

impl SweepReport {
    /// Due reservations examined.
    #[must_use]
    pub fn scanned(&self) -> usize {
        self.scanned
    }

    /// Reservations moved to `expired`.
    #[must_use]
    pub fn expired(&self) -> usize {
        self.expired
    }

    /// Reservations already handled elsewhere.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Reservations that could not be expired; retried after a backoff.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Due reservations passed over because an earlier failure is still backing off.
    #[must_use]
    pub fn deferred(&self) -> usize {
        self.deferred
    }

    /// `true` if nothing was due.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scanned == 0 && self.deferred == 0
    }
}

/// Largest doubling applied to the retry delay of a failing reservation.
const MAX_BACKOFF_SHIFT: u32 = 6;

#[derive(Debug, Clone, Copy)]
struct RetryState {
    attempts: u32,
    next_attempt_at: u64,
}

/// Periodically expires due reservations and returns their units to the ledger.
///
/// Each ticket is locked, expired and unlocked on its own; no lock is held
/// across the sweep, and a failure on one ticket is logged and the sweep
/// moves on. A ticket that failed is not retried until its backoff has
/// elapsed, so it cannot hold the head of the deadline order and starve the
/// reservations behind it. The delay starts at one interval and doubles per
/// failed attempt.
///
/// Clones share their retry state.
#[derive(Debug, Clone)]
pub struct ReservationExpiryReaper {
    engine: Arc<InventoryEngine>,
    interval: Duration,
    batch_size: usize,
    retries: Arc<DashMap<TicketId, RetryState>>,
}

impl ReservationExpiryReaper {
    /// Reaper using the engine's configured interval and batch size.
    pub fn new(engine: Arc<InventoryEngine>) -> Self {
        let interval = Duration::from_millis(engine.config().reaper_interval_ms);
        let batch_size = engine.config().reaper_batch_size;
        Self {
            engine,
            interval,
            batch_size,
            retries: Arc::new(DashMap::new()),
        }
    }

    /// Override the sweep period.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override the maximum reservations handled per sweep.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sweep period.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tickets waiting out a backoff after a failed expiry.
    #[must_use]
    pub fn pending_retries(&self) -> usize {
        self.retries.len()
    }

    /// Expire every reservation due at the engine's current time, up to the batch size.
    ///
    /// Due tickets still backing off are counted as deferred and do not use
    /// up the batch.
    pub fn sweep(&self) -> SweepReport {
        let now = self.engine.now();
        let store = self.engine.store();
        let mut report = SweepReport::default();
        let mut cursor = None;

        'pages: loop {
            let page = store.due_reservations_after(now, cursor, self.batch_size);
            let Some(&last) = page.last() else {
                break;
            };
            cursor = Some(last);

            for (_, ticket_id) in page {
                if report.scanned >= self.batch_size {
                    break 'pages;
                }
                if self.backing_off(ticket_id, now) {
                    report.deferred += 1;
                    continue;
                }
                report.scanned += 1;
                self.expire_one(ticket_id, now, &mut report);
            }
        }

        if !self.retries.is_empty() {
            self.retries.retain(|ticket_id, _| {
                store
                    .get(*ticket_id)
                    .is_some_and(|ticket| ticket.status == TicketStatus::Reserved)
            });
        }

        if !report.is_empty() {
            info!(
                "Reaper sweep: {} scanned, {} expired, {} skipped, {} failed, {} deferred",
                report.scanned, report.expired, report.skipped, report.failed, report.deferred
            );
            #[cfg(feature = "metrics")]
            metrics::counter!("ticketbook_reservations_expired_total")
                .increment(report.expired as u64);

            self.engine.publish(InventoryEvent::SweepCompleted {
                scanned: report.scanned,
                expired: report.expired,
                failed: report.failed,
                at: now,
            });
        }
        report
    }

    fn expire_one(&self, ticket_id: TicketId, now: u64, report: &mut SweepReport) {
        match self.engine.expire_reservation(ticket_id) {
            Ok(ExpiryOutcome::Expired) => {
                self.retries.remove(&ticket_id);
                report.expired += 1;
            }
            Ok(ExpiryOutcome::Skipped) => {
                self.retries.remove(&ticket_id);
                debug!("Reaper: ticket {} no longer due, skipped", ticket_id);
                report.skipped += 1;
            }
            Err(err) => {
                let attempts = self
                    .retries
                    .get(&ticket_id)
                    .map_or(0, |state| state.attempts)
                    .saturating_add(1);
                let delay = self.backoff_ms(attempts);
                self.retries.insert(
                    ticket_id,
                    RetryState {
                        attempts,
                        next_attempt_at: now.saturating_add(delay),
                    },
                );
                warn!(
                    "Reaper: failed to expire ticket {} (attempt {}, next in {} ms): {}",
                    ticket_id, attempts, delay, err
                );
                report.failed += 1;
            }
        }
    }

    fn backing_off(&self, ticket_id: TicketId, now: u64) -> bool {
        self.retries
            .get(&ticket_id)
            .is_some_and(|state| state.next_attempt_at > now)
    }

    fn backoff_ms(&self, attempts: u32) -> u64 {
        let base = u64::try_from(self.interval.as_millis())
            .unwrap_or(u64::MAX)
            .max(1);
        let shift = attempts.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        base.saturating_mul(1 << shift)
    }

    /// Run [`Self::sweep`] every interval on the current Tokio runtime.
    ///
    /// Each sweep runs on the blocking pool, off the async workers.
    pub fn spawn(self) -> ReaperHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Reservation reaper started (interval={:?})", self.interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Reservation reaper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let worker = self.clone();
                        if let Err(err) = tokio::task::spawn_blocking(move || worker.sweep()).await {
                            warn!("Reaper: sweep task failed: {}", err);
                        }
                    }
                }
            }
        });

        ReaperHandle { cancel, handle }
    }
}

/// Running reaper task.
#[derive(Debug)]
pub struct ReaperHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ReaperHandle {
    /// `true` once the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop after the sweep in progress, if any, and wait for the task.
    ///
    /// # Errors
    /// The task's [`JoinError`] if it panicked.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        self.cancel.cancel();
        self.handle.await
    }
}

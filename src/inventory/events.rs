/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Inventory domain events and their bounded delivery to a stats recorder.
//!
//! The engine publishes an [`InventoryEvent`] after each committed change.
//! Publishing never blocks and never fails the inventory operation: events go
//! into a bounded Tokio channel with `try_send`, and a full queue drops the
//! event, counts it and logs a warning. A single processor task drains the
//! queue into a [`StatsRecorder`].

use super::ticket::TicketStatus;
use super::types::{CustomerId, TicketId, TicketTypeId};
use serde::Serialize;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Something that happened to the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InventoryEvent {
    /// An issuance workflow committed
    TicketsIssued {
        /// Ticket type debited
        ticket_type_id: TicketTypeId,
        /// Tickets created
        ticket_ids: Vec<TicketId>,
        /// Initial status (`sold` or `reserved`)
        status: TicketStatus,
        /// Commit time
        at: u64,
    },
    /// An issuance workflow failed and was rolled back
    IssuanceCompensated {
        /// Ticket type credited back
        ticket_type_id: TicketTypeId,
        /// Quantity returned
        quantity: u32,
        /// Error that triggered the rollback
        cause: String,
        /// Rollback time
        at: u64,
    },
    /// A rollback did not complete; needs an operator
    CompensationFailed {
        /// Ticket type involved
        ticket_type_id: TicketTypeId,
        /// Error that triggered the rollback
        cause: String,
        /// What could not be undone
        details: String,
        /// Detection time
        at: u64,
    },
    /// A ticket changed status
    TicketTransitioned {
        /// Ticket
        ticket_id: TicketId,
        /// Ticket type
        ticket_type_id: TicketTypeId,
        /// Previous status
        from: TicketStatus,
        /// New status
        to: TicketStatus,
        /// Transition time
        at: u64,
    },
    /// A ticket changed holder
    TicketTransferred {
        /// Ticket
        ticket_id: TicketId,
        /// Previous holder
        from: CustomerId,
        /// New holder
        to: CustomerId,
        /// Transfer time
        at: u64,
    },
    /// An admitted ticket was validated again
    TicketRevalidated {
        /// Ticket
        ticket_id: TicketId,
        /// Validation count after this validation
        validation_count: u32,
        /// Validation time
        at: u64,
    },
    /// A reservation sweep finished
    SweepCompleted {
        /// Reservations examined
        scanned: usize,
        /// Reservations expired
        expired: usize,
        /// Reservations that failed to expire
        failed: usize,
        /// Sweep time
        at: u64,
    },
}

/// Consumer of inventory events (counters, dashboards, audit feeds).
pub trait StatsRecorder: Send + Sync {
    /// Record one event.
    fn record(&self, event: &InventoryEvent);
}

impl<F> StatsRecorder for F
where
    F: Fn(&InventoryEvent) + Send + Sync,
{
    fn record(&self, event: &InventoryEvent) {
        self(event)
    }
}

/// Bounded, non-blocking event queue.
#[derive(Debug)]
pub struct EventDispatcher {
    sender: mpsc::Sender<InventoryEvent>,
    receiver: Mutex<Option<mpsc::Receiver<InventoryEvent>>>,
    dropped: AtomicU64,
}

impl EventDispatcher {
    /// Create a dispatcher holding at most `capacity` undelivered events.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue an event without waiting. Drops it when the queue is full.
    pub fn dispatch(&self, event: InventoryEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Stats queue full, dropping event ({} dropped so far): {:?}",
                    dropped, event
                );
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Stats queue closed, event discarded");
            }
        }
    }

    /// Events dropped because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Start the processor task on the current Tokio runtime.
    ///
    /// Returns `None` if the processor was already started (or the queue
    /// was drained synchronously and handed off).
    pub fn start_processor(
        &self,
        recorder: Arc<dyn StatsRecorder>,
    ) -> Option<tokio::task::JoinHandle<()>> {
        let mut receiver = self.take_receiver()?;

        Some(tokio::spawn(async move {
            info!("Stats processor started");

            while let Some(event) = receiver.recv().await {
                recorder.record(&event);
            }

            info!("Stats processor stopped");
        }))
    }

    /// Deliver every queued event to `recorder` on the calling thread.
    ///
    /// Returns the number of events delivered; zero if the processor task owns the queue.
    pub fn drain_into(&self, recorder: &dyn StatsRecorder) -> usize {
        let Ok(mut guard) = self.receiver.lock() else {
            return 0;
        };
        let Some(receiver) = guard.as_mut() else {
            return 0;
        };
        let mut delivered = 0;
        while let Ok(event) = receiver.try_recv() {
            recorder.record(&event);
            delivered += 1;
        }
        delivered
    }

    fn take_receiver(&self) -> Option<mpsc::Receiver<InventoryEvent>> {
        self.receiver.lock().ok()?.take()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(1_024)
    }
}

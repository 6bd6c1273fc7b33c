//! Callback slot pool.
//!
//! A slot is a one-shot result cell. The pool hands out at most `capacity`
//! slots at a time, which is the ceiling on simultaneously in-flight probes.
//! Dropping a [`Slot`] checks it back in.

use super::table::{ProbeRecord, ResultSender};
use std::sync::Arc;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};

/// Fixed-cardinality pool of result slots.
#[derive(Debug, Clone)]
pub struct SlotPool {
    permits: Arc<Semaphore>,
}

/// A checked-out slot: the caller's half of one probe's result cell.
#[derive(Debug)]
pub struct Slot {
    receiver: oneshot::Receiver<ProbeRecord>,
    _permit: OwnedSemaphorePermit,
}

impl SlotPool {
    /// Create a pool with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Check out a slot, waiting while all slots are in use.
    ///
    /// Returns the slot together with the sender that the correlation table
    /// uses to deliver the result. `None` once the pool has been closed.
    pub async fn checkout(&self) -> Option<(Slot, ResultSender)> {
        let permit = Arc::clone(&self.permits).acquire_owned().await.ok()?;
        let (sender, receiver) = oneshot::channel();
        Some((
            Slot {
                receiver,
                _permit: permit,
            },
            sender,
        ))
    }

    /// Refuse all further checkouts and wake every waiter.
    pub fn close(&self) {
        self.permits.close();
    }

    /// Number of slots currently checked in.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Slot {
    /// Wait for the probe's record.
    ///
    /// `None` means the sending half was dropped without a delivery, which
    /// only happens when the engine discards the request during shutdown.
    /// The slot is checked back in when this returns.
    pub async fn wait(self) -> Option<ProbeRecord> {
        self.receiver.await.ok()
    }
}

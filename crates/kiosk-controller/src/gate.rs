//! Exclusive access to the card reader.
//!
//! The poller and the writer both need the reader, and the writer must win.
//! [`ReaderGate`] owns the transport behind an async mutex and keeps a count
//! of pending writes:
//!
//! - the writer calls [`ReaderGate::pause`] first, then [`ReaderGate::acquire`]
//! - the poller uses [`ReaderGate::try_acquire`], which fails while any pause
//!   is raised or the transport is locked, and abandons a wait-for-card as
//!   soon as [`ReaderGate::paused`] resolves
//!
//! A pause is raised before the lock is taken, so once `pause` returns the
//! poller cannot start another cycle.

use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::debug;

/// Transport guarded against concurrent use.
#[derive(Debug)]
pub struct ReaderGate<T> {
    transport: Mutex<T>,
    pauses: watch::Sender<usize>,
}

impl<T> ReaderGate<T> {
    pub fn new(transport: T) -> Self {
        let (pauses, _) = watch::channel(0);
        Self {
            transport: Mutex::new(transport),
            pauses,
        }
    }

    /// Raise a pause until the returned guard is dropped.
    pub fn pause(&self) -> PauseGuard<'_, T> {
        self.pauses.send_modify(|count| *count += 1);
        debug!("Reader paused for write");
        PauseGuard { gate: self }
    }

    /// Returns `true` while any pause is raised.
    pub fn is_paused(&self) -> bool {
        *self.pauses.borrow() > 0
    }

    /// Resolves once a pause is raised (immediately if one already is).
    pub async fn paused(&self) {
        let mut pauses = self.pauses.subscribe();
        // The sender lives as long as the gate, so this only errs on drop.
        let _ = pauses.wait_for(|count| *count > 0).await;
    }

    /// Lock the transport unless a pause is raised or it is already locked.
    pub fn try_acquire(&self) -> Option<MutexGuard<'_, T>> {
        if self.is_paused() {
            return None;
        }
        self.transport.try_lock().ok()
    }

    /// Wait for the transport lock.
    pub async fn acquire(&self) -> MutexGuard<'_, T> {
        self.transport.lock().await
    }
}

/// Lowers its pause on drop.
#[derive(Debug)]
#[must_use = "the pause is lowered as soon as the guard is dropped"]
pub struct PauseGuard<'a, T> {
    gate: &'a ReaderGate<T>,
}

impl<T> Drop for PauseGuard<'_, T> {
    fn drop(&mut self) {
        self.gate
            .pauses
            .send_modify(|count| *count = count.saturating_sub(1));
        debug!("Reader pause lowered");
    }
}

//! Single-shot, restartable return-to-welcome countdown.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{task::JoinHandle, time::sleep};
use tracing::debug;

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Runs a callback once after a period of inactivity.
///
/// Every [`IdleTimer::reset`] cancels the pending countdown and starts a new
/// one, so only the last reset ever fires.
///
/// # Examples
///
/// ```
/// use kiosk_controller::IdleTimer;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let fired = Arc::new(AtomicUsize::new(0));
///     let timer = {
///         let fired = Arc::clone(&fired);
///         IdleTimer::new(move || {
///             fired.fetch_add(1, Ordering::SeqCst);
///         })
///     };
///     timer.reset(Duration::from_millis(10));
///     tokio::time::sleep(Duration::from_millis(50)).await;
///     assert_eq!(fired.load(Ordering::SeqCst), 1);
/// }
/// ```
pub struct IdleTimer {
    on_expire: Callback,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for IdleTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleTimer")
            .field("armed", &self.is_armed())
            .finish()
    }
}

impl IdleTimer {
    pub fn new(on_expire: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            on_expire: Arc::new(on_expire),
            pending: Mutex::new(None),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// (Re)start the countdown. Must be called inside a tokio runtime.
    pub fn reset(&self, after: Duration) {
        let on_expire = Arc::clone(&self.on_expire);
        let task = tokio::spawn(async move {
            sleep(after).await;
            debug!("Idle timeout reached");
            on_expire();
        });

        if let Some(previous) = self.pending().replace(task) {
            previous.abort();
        }
    }

    /// Stop the countdown without firing.
    pub fn cancel(&self) {
        if let Some(task) = self.pending().take() {
            task.abort();
        }
    }

    /// Returns `true` while a countdown is running.
    pub fn is_armed(&self) -> bool {
        self.pending().as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_timer() -> (IdleTimer, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let timer = IdleTimer::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (timer, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_timeout() {
        let (timer, fired) = counting_timer();
        timer.reset(Duration::from_secs(10));

        sleep(Duration::from_secs(9)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timer.is_armed());

        sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restarts_countdown() {
        let (timer, fired) = counting_timer();
        timer.reset(Duration::from_secs(10));
        sleep(Duration::from_secs(8)).await;
        timer.reset(Duration::from_secs(4));

        sleep(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        sleep(Duration::from_secs(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let (timer, fired) = counting_timer();
        timer.reset(Duration::from_secs(1));
        timer.cancel();
        sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!timer.is_armed());
    }
}

//! Cooperative cancellation for the interaction loop.
//!
//! Every suspension point in the runner — pacing delays, retry backoff,
//! quota waits, cooldowns — sleeps through a [`CancelToken`] so an external
//! interrupt (Ctrl-C) unwinds the loop cleanly instead of killing it
//! mid-report.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Cloneable cancellation handle shared between the signal listener and the
/// runner. Cancellation is one-way and sticky.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Request cancellation and wake every pending sleep.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `true` if the full duration elapsed, `false` if the sleep was
    /// cut short (or cancellation was already requested).
    pub async fn sleep(&self, duration: Duration) -> bool {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register interest before re-checking the flag so a cancel() racing
        // with this call cannot slip between check and wait.
        notified.as_mut().enable();

        if self.is_cancelled() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = &mut notified => false,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

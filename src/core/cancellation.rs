//! Cooperative cancellation for pipeline runs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Per-run cancellation signal
///
/// Clones share the same flag, so a caller can keep one handle and pass
/// another into [`Pipeline::run`](crate::execution::Pipeline::run). Once set,
/// the flag never resets.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; wakes every task waiting in [`cancelled`](Self::cancelled)
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            debug!("Cancellation requested");
            self.inner.notify.notify_waiters();
        }
    }

    /// Has cancellation been requested?
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancellation is requested
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before re-checking the flag so a concurrent cancel() can't be missed
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Cancel this token once `delay` has elapsed
    ///
    /// The engine has no timeout policy of its own; this is how a caller
    /// puts a deadline on a run. Aborting the returned handle disarms it.
    pub fn cancel_after(&self, delay: Duration) -> JoinHandle<()> {
        let token = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("Deadline of {:?} reached, cancelling", delay);
            token.cancel();
        })
    }
}

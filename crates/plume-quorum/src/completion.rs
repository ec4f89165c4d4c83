//! One-shot completion latch for operations.

use plume_core::ErrorCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::Notify;

/// One-shot completion latch carried by every [`Operation`].
///
/// Exactly one completing thread records the terminal [`ErrorCode`]; any
/// number of threads may poll [`is_ready`] or await [`wait`] concurrently.
/// The ready transition is monotonic: once set it never resets, and the
/// recorded code is never mutated afterward.
///
/// [`Operation`]: crate::operation::Operation
/// [`is_ready`]: CompletionSignal::is_ready
/// [`wait`]: CompletionSignal::wait
#[derive(Debug, Default)]
pub struct CompletionSignal {
    ready: AtomicBool,
    code: OnceLock<ErrorCode>,
    notify: Notify,
}

impl CompletionSignal {
    /// Create an incomplete signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the operation has reached a terminal state.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// The recorded terminal code; `ErrorCode::Ok` until completion.
    pub fn error_code(&self) -> ErrorCode {
        self.code.get().copied().unwrap_or_default()
    }

    /// Record the terminal code and wake all waiters.
    ///
    /// The first caller wins; later calls are no-ops that leave the stored
    /// code untouched. Returns whether this call performed the transition.
    pub fn set_complete(&self, code: ErrorCode) -> bool {
        let first = self.code.set(code).is_ok();
        if first {
            self.ready.store(true, Ordering::Release);
            self.notify.notify_waiters();
        }
        first
    }

    /// Await completion and return the terminal code.
    pub async fn wait(&self) -> ErrorCode {
        loop {
            if self.is_ready() {
                return self.error_code();
            }
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register as a waiter before the re-check so a completion
            // racing with us cannot be missed.
            notified.as_mut().enable();
            if self.is_ready() {
                return self.error_code();
            }
            notified.await;
        }
    }

    /// Await completion with a deadline; `None` on timeout.
    pub async fn wait_timeout(&self, deadline: Duration) -> Option<ErrorCode> {
        tokio::time::timeout(deadline, self.wait()).await.ok()
    }
}

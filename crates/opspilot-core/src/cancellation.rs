// crates/opspilot-core/src/cancellation.rs
// ============================================================================
// Module: OpsPilot Cancellation Token
// Description: Cooperative cancellation signal propagated through the module
// context.
// Purpose: Let the kernel signal `stop` to a module without blocking on it
// indefinitely.
// Dependencies: std::sync, tokio::sync::Notify
// ============================================================================

//! ## Overview
//! A [`CancellationToken`] is handed to every module through its context. On
//! `stop`, the kernel calls [`CancellationToken::cancel`] and awaits the
//! module's `stop()` under its configured timeout; modules that poll
//! [`CancellationToken::is_cancelled`] or await [`CancellationToken::cancelled`]
//! can wind down long-running work cooperatively.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A cloneable, cooperative cancellation signal.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a fresh, not-yet-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Signals cancellation, waking every waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Returns whether cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation has been signalled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.notify.notified().await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

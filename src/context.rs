//! Cancellation contexts for the scan core.
//!
//! A [`ScanContext`] wraps a `CancellationToken` and models the context tree
//! of a scan: a root context carrying the overall deadline and OS-signal
//! cancellation, with per-probe children carrying their own deadlines.
//! Cancelling a parent cancels every descendant; children never cancel their
//! parent.

use std::time::Duration;

use tokio_util::sync::{CancellationToken, DropGuard};

/// A cancellable execution context, cheap to clone.
#[derive(Debug, Clone)]
pub struct ScanContext {
    token: CancellationToken,
}

impl ScanContext {
    /// Creates a fresh root context that is never cancelled implicitly.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Creates a child context; cancelling the parent cancels the child.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Creates a child context that additionally cancels itself after
    /// `timeout`.
    ///
    /// The deadline timer is torn down as soon as the child is cancelled
    /// from any direction, so releasing the context (see
    /// [`ScanContext::drop_guard`]) never leaks a timer past the work it
    /// was guarding.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let child = self.token.child_token();
        let timer = child.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(timeout) => timer.cancel(),
            }
        });
        Self { token: child }
    }

    /// Cancels this context and all of its descendants.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether this context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when this context is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Returns a guard that cancels this context when dropped.
    ///
    /// Used to release per-probe contexts on every exit path, including
    /// panics and early returns.
    pub fn drop_guard(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    /// Runs `fut` unless the context is cancelled first.
    ///
    /// Returns `None` on cancellation.
    pub async fn run<F, T>(&self, fut: F) -> Option<T>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

impl Default for ScanContext {
    fn default() -> Self {
        Self::new()
    }
}

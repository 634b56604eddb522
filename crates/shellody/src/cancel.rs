use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use thiserror::Error;
use tokio::sync::Notify;

/// Error a handler returns to report that it stopped because cancellation was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("command cancelled")]
pub struct Cancelled;

#[derive(Default)]
struct TokenState {
    requested: AtomicBool,
    observed: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation signal shared between the session and one invocation.
///
/// Requesting cancellation never interrupts a handler. The invocation only ends
/// `Cancelled` when the handler sees the request through [`CancellationToken::is_cancelled`],
/// [`CancellationToken::cancelled`], [`CancellationToken::check`], or by returning
/// [`Cancelled`].
#[derive(Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Creates an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation and wakes every waiter. Idempotent.
    pub fn cancel(&self) {
        if !self.state.requested.swap(true, Ordering::AcqRel) {
            self.state.notify.notify_waiters();
        }
    }

    /// Handler-side check; a `true` answer counts as observing the request.
    pub fn is_cancelled(&self) -> bool {
        let requested = self.state.requested.load(Ordering::Acquire);
        if requested {
            self.state.observed.store(true, Ordering::Release);
        }
        requested
    }

    /// Returns `Err(Cancelled)` once cancellation was requested, for use with `?`.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Session-side check that does not count as the handler observing the request.
    pub fn is_requested(&self) -> bool {
        self.state.requested.load(Ordering::Acquire)
    }

    /// Returns whether the handler observed a cancellation request.
    pub fn was_observed(&self) -> bool {
        self.state.observed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("requested", &self.is_requested())
            .field("observed", &self.was_observed())
            .finish()
    }
}

//! Run-level cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    children: Mutex<Vec<Weak<Inner>>>,
    signal: Condvar,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Vec<Weak<Inner>>> {
        self.children
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Set the flag, wake waiters and cancel live children. Returns whether
    /// this call was the one that set the flag.
    fn cancel(&self) -> bool {
        let mut children = self.lock();
        let first = !self.cancelled.swap(true, Ordering::SeqCst);
        self.signal.notify_all();
        let live: Vec<Arc<Inner>> = children.drain(..).filter_map(|c| c.upgrade()).collect();
        drop(children);

        for child in live {
            child.cancel();
        }
        first
    }
}

/// Shared flag that asks a run to stop scheduling new steps.
///
/// Clones share the same flag. Waiting on the token (e.g. during retry
/// backoff) wakes up as soon as cancellation is requested. A [`child`]
/// token is cancelled with its parent but can also be cancelled alone.
///
/// [`child`]: CancellationToken::child
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token that follows this one's cancellation. Cancelling the
    /// child leaves this token untouched.
    pub fn child(&self) -> Self {
        let child = Arc::new(Inner::default());

        let mut children = self.inner.lock();
        if self.is_cancelled() {
            child.cancelled.store(true, Ordering::SeqCst);
        } else {
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }
        drop(children);

        Self { inner: child }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        if self.inner.cancel() {
            tracing::info!("cancellation requested");
        }
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `timeout` or until cancelled, whichever is first.
    ///
    /// Returns `true` if cancellation was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock();

        while !self.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = match self.inner.signal.wait_timeout(guard, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }

        true
    }
}

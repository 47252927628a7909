//! Cancellation token for cooperative cancellation.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

#[derive(Default)]
struct TokenState {
    /// Whether cancellation has been requested.
    cancelled: AtomicBool,
    /// The reason for cancellation (first one wins).
    reason: RwLock<Option<String>>,
    /// Derived tokens, cancelled together with this one.
    children: Mutex<Vec<Weak<TokenState>>>,
    /// Wakes tasks waiting in [`CancellationToken::cancelled`].
    notify: Notify,
}

impl TokenState {
    fn cancel(&self, reason: &str) {
        // Only set if not already cancelled (first reason wins)
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        *self.reason.write() = Some(reason.to_string());
        self.notify.notify_waiters();

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel(reason);
        }
    }
}

/// A token for cooperative cancellation.
///
/// Clones share state. Cancellation is idempotent - only the first
/// cancellation reason is kept. Tokens derived with [`child_token`] are
/// cancelled whenever their parent is, never the other way around.
///
/// [`child_token`]: CancellationToken::child_token
#[derive(Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a child token.
    ///
    /// If this token is already cancelled the child starts out cancelled.
    #[must_use]
    pub fn child_token(&self) -> Self {
        let child = Self::new();
        {
            let mut children = self.state.children.lock();
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child.state));
        }
        // Re-check after registering so a concurrent cancel cannot slip between.
        if self.is_cancelled() {
            child.cancel(self.reason().unwrap_or_default());
        }
        child
    }

    /// Requests cancellation with a reason.
    ///
    /// This is idempotent - only the first reason is kept. Children are
    /// cancelled with the same reason and waiters in [`cancelled`] wake up.
    ///
    /// [`cancelled`]: CancellationToken::cancelled
    pub fn cancel(&self, reason: impl Into<String>) {
        self.state.cancel(&reason.into());
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.state.reason.read().clone()
    }

    /// Completes once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Register interest before checking the flag so a cancel in
            // between still wakes us.
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Returns a guard that cancels this token when dropped.
    #[must_use = "the token is cancelled as soon as the guard is dropped"]
    pub fn drop_guard(self, reason: impl Into<String>) -> CancelGuard {
        CancelGuard {
            token: self,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

/// Cancels its token on drop, on every exit path of the owning scope.
#[derive(Debug)]
pub struct CancelGuard {
    token: CancellationToken,
    reason: String,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.token.cancel(std::mem::take(&mut self.reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_token_cancel() {
        let token = CancellationToken::new();
        token.cancel("User requested");

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("User requested".to_string()));
    }

    #[test]
    fn test_token_cancel_idempotent() {
        let token = CancellationToken::new();
        token.cancel("First reason");
        token.cancel("Second reason");

        // First reason wins
        assert_eq!(token.reason(), Some("First reason".to_string()));
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel("from clone");
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_parent_cancels_children() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        let grandchild = child.child_token();

        parent.cancel("shutdown");

        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
        assert_eq!(grandchild.reason(), Some("shutdown".to_string()));
    }

    #[test]
    fn test_child_does_not_cancel_parent() {
        let parent = CancellationToken::new();
        let child = parent.child_token();

        child.cancel("request done");

        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_child_of_cancelled_parent_starts_cancelled() {
        let parent = CancellationToken::new();
        parent.cancel("already gone");
        assert!(parent.child_token().is_cancelled());
    }

    #[test]
    fn test_dropped_children_are_pruned() {
        let parent = CancellationToken::new();
        for _ in 0..10 {
            let _ = parent.child_token();
        }
        let _live = parent.child_token();
        assert_eq!(parent.state.children.lock().len(), 1);
    }

    #[test]
    fn test_cancelled_future_wakes_on_cancel() {
        let token = CancellationToken::new();
        let mut waiter = task::spawn(token.cancelled());

        assert_pending!(waiter.poll());
        token.cancel("wake up");
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
    }

    #[test]
    fn test_cancelled_future_ready_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel("done");
        let mut waiter = task::spawn(token.cancelled());
        assert_ready!(waiter.poll());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_waiters_all_wake() {
        for _ in 0..100 {
            let parent = CancellationToken::new();
            let waiters: Vec<_> = (0..4)
                .map(|_| {
                    let token = parent.child_token();
                    tokio::spawn(async move { token.cancelled().await })
                })
                .collect();

            parent.cancel("closing time");

            for waiter in waiters {
                tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
                    .await
                    .expect("waiter missed the cancellation")
                    .unwrap();
            }
        }
    }

    #[test]
    fn test_drop_guard_cancels() {
        let token = CancellationToken::new();
        {
            let _guard = token.clone().drop_guard("scope exit");
        }
        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("scope exit".to_string()));
    }
}

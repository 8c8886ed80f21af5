//! Deadline-bound execution scope.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Why an execution scope ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeEnd {
    /// The deadline elapsed.
    DeadlineElapsed,
    /// The scope or one of its parents was cancelled.
    Cancelled,
}

impl ScopeEnd {
    pub fn as_label(&self) -> &'static str {
        match self {
            ScopeEnd::DeadlineElapsed => "deadline_elapsed",
            ScopeEnd::Cancelled => "cancelled",
        }
    }
}

/// A cancellable scope with a fixed deadline, derived from a parent scope.
///
/// Cancelling the parent ends this scope; releasing this scope leaves the
/// parent untouched.
#[derive(Debug, Clone)]
pub struct ExecutionScope {
    token: CancellationToken,
    deadline: Instant,
    budget: Duration,
}

impl ExecutionScope {
    /// Attach a deadline of `budget` from now to a child of `parent`.
    pub fn with_deadline(parent: &CancellationToken, budget: Duration) -> Self {
        Self {
            token: parent.child_token(),
            deadline: Instant::now() + budget,
            budget,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time left until the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Wait until the scope ends.
    ///
    /// Cancellation takes precedence when both are ready.
    pub async fn done(&self) -> ScopeEnd {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => ScopeEnd::Cancelled,
            _ = tokio::time::sleep_until(self.deadline) => ScopeEnd::DeadlineElapsed,
        }
    }

    /// Wait for cancellation only, ignoring the deadline.
    ///
    /// Handlers can select on this to stop work once the supervised call
    /// has returned.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Cancel the scope. Idempotent.
    pub fn release(&self) {
        self.token.cancel();
    }

    pub fn is_released(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Guard that releases the scope when dropped.
    pub fn release_on_drop(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let parent = CancellationToken::new();
        let scope = ExecutionScope::with_deadline(&parent, Duration::from_secs(1));
        let start = Instant::now();

        assert_eq!(scope.done().await, ScopeEnd::DeadlineElapsed);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_millis(1010));
        assert_eq!(scope.remaining(), Duration::ZERO);
        assert!(!scope.is_released());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_ends_scope() {
        let parent = CancellationToken::new();
        let scope = ExecutionScope::with_deadline(&parent, Duration::from_secs(10));

        parent.cancel();
        assert_eq!(scope.done().await, ScopeEnd::Cancelled);
        assert!(scope.is_released());
    }

    #[tokio::test]
    async fn test_release_is_idempotent_and_local() {
        let parent = CancellationToken::new();
        let scope = ExecutionScope::with_deadline(&parent, Duration::from_secs(10));

        scope.release();
        scope.release();
        assert!(scope.is_released());
        assert!(!parent.is_cancelled());
        assert_eq!(scope.done().await, ScopeEnd::Cancelled);
    }

    #[tokio::test]
    async fn test_drop_guard_releases() {
        let parent = CancellationToken::new();
        let scope = ExecutionScope::with_deadline(&parent, Duration::from_secs(10));
        {
            let _guard = scope.release_on_drop();
        }
        assert!(scope.is_released());
    }
}

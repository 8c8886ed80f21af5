//! Terminal outcomes of a supervised call.

use crate::error::HandlerFault;
use crate::supervisor::scope::ScopeEnd;

/// Which of the three racing events resolved a supervised call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The handler returned normally before the deadline.
    Completed,
    /// The handler panicked or returned an error.
    Failed(HandlerFault),
    /// The execution scope ended before the handler did.
    TimedOut(ScopeEnd),
}

impl Outcome {
    /// Returns a short stable label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Failed(_) => "failed",
            Outcome::TimedOut(_) => "timed_out",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Outcome::TimedOut(_))
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Completed => write!(f, "completed"),
            Outcome::Failed(fault) => write!(f, "failed: {}", fault),
            Outcome::TimedOut(end) => write!(f, "timed out ({})", end.as_label()),
        }
    }
}

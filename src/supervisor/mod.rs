//! Supervised handler execution.
//!
//! # Data Flow
//! ```text
//! Inbound call (request, response sink)
//!     → context.rs (bind to a deadline-bound scope + response guard)
//!     → executor.rs (spawn handler, race finished / failure / deadline)
//!     → guard.rs (single finalizing write under the lock)
//!     → scope.rs (release on every exit path)
//!     → Outcome
//! ```
//!
//! # Design Decisions
//! - Exactly one finalizing write per call, enforced by the guard and the
//!   finalized flag together
//! - Handler faults are caught at the task boundary and never reach the caller
//! - A timeout stops the wait, not the handler; its late writes are no-ops

pub mod context;
pub mod executor;
pub mod guard;
pub mod handler;
pub mod outcome;
pub mod scope;

pub use context::RequestContext;
pub use executor::Supervisor;
pub use guard::{Finalization, ResponseGuard};
pub use handler::{Handler, HandlerError, HandlerResult};
pub use outcome::Outcome;
pub use scope::{ExecutionScope, ScopeEnd};

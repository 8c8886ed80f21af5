//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → router.rs (exact lookup)
//!     → Return: handler or NoMatch (404, supervisor not invoked)
//! ```

pub mod router;

pub use router::RouteTable;

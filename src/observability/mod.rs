//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Supervisor and transport produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through every log line of a supervised call
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

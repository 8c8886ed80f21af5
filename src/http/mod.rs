//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, request ID, tracing)
//!     → routing (exact path lookup)
//!     → request.rs (buffer body, query/form/JSON accessors)
//!     → supervisor (one supervised handler call)
//!     → response.rs (single finalized JSON write)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{InboundRequest, UuidRequestId, X_REQUEST_ID};
pub use response::{HttpResponseSink, PendingResponse, ResponseSink};
pub use server::HttpServer;

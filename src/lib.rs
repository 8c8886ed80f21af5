//! Supervised request handler execution.
//!
//! Runs one handler per inbound call on its own task, under a deadline and a
//! panic isolation boundary, and finalizes the response exactly once with
//! whichever of completion, failure or deadline happens first.

pub mod config;
pub mod controllers;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod supervisor;

pub use config::ServiceConfig;
pub use error::{ContextError, HandlerFault, RequestError, SinkError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::RouteTable;
pub use supervisor::{
    Finalization, Handler, HandlerError, HandlerResult, Outcome, RequestContext, Supervisor,
};

//! Error types for supervised handler execution.

use thiserror::Error;

/// An unrecovered failure raised inside a handler body.
///
/// Captured at the isolation boundary and never propagated past the
/// supervisor. Surfaced to operators through a log record and to the client
/// as a fixed 500 response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerFault {
    /// The handler panicked. Contains a best-effort message.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The handler returned an error instead of completing.
    #[error("handler failed: {0}")]
    Errored(String),
}

impl HandlerFault {
    /// Build a fault from a panic payload captured by `catch_unwind`.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        HandlerFault::Panicked(message)
    }
}

/// Errors reported by a response sink.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SinkError {
    /// A second finalizing write reached the sink. Indicates a bug in the
    /// race logic; `write_result` never lets this through.
    #[error("response already finalized")]
    DuplicateFinalization,

    /// The transport side of the sink is gone (caller abandoned the call).
    #[error("response channel closed")]
    Closed,
}

/// Errors returned when writing a result through the response guard.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The payload could not be serialized. A generic failure payload was
    /// written in its place.
    #[error("failed to serialize response payload: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The sink rejected the write.
    #[error("response sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Errors produced while buffering or binding an inbound request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Request body exceeded the configured limit.
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// Request body could not be read.
    #[error("failed to read request body: {0}")]
    Body(String),

    /// Request body is not valid JSON for the target type.
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// JSON binding was requested on an empty body.
    #[error("request body is empty")]
    MissingBody,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_from_panic_payloads() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(
            HandlerFault::from_panic(payload.as_ref()),
            HandlerFault::Panicked("boom".into())
        );

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(
            HandlerFault::from_panic(payload.as_ref()),
            HandlerFault::Panicked("owned boom".into())
        );

        let payload: Box<dyn std::any::Any + Send> = Box::new(42u32);
        assert_eq!(
            HandlerFault::from_panic(payload.as_ref()),
            HandlerFault::Panicked("unknown panic".into())
        );
    }
}

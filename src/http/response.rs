//! Outbound response handling.
//!
//! # Responsibilities
//! - Define the response sink a supervised call finalizes into
//! - Bridge that sink to an axum `Response` for the transport
//! - Provide the fixed payloads for failure and timeout outcomes
//!
//! # Design Decisions
//! - A sink accepts exactly one write; a second write is an error
//! - Content type is always `application/json`
//! - A call that completed without writing answers `200` with an empty body

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::SinkError;

/// Media type used for every finalized response.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// The outbound response handle of one inbound call.
///
/// Implementations are owned by the transport; the supervisor only ever
/// reaches them through the response guard.
pub trait ResponseSink: Send + 'static {
    /// Write the status and serialized JSON body.
    fn write(&mut self, status: StatusCode, body: Bytes) -> Result<(), SinkError>;
}

/// Body shape of the generic failure and timeout payloads.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
}

/// Payload written when the handler faults.
pub const FAILURE_BODY: ErrorBody = ErrorBody {
    error: "internal server error",
};

/// Payload written when the deadline expires first.
pub const TIMEOUT_BODY: ErrorBody = ErrorBody {
    error: "request timed out",
};

/// Payload for requests that match no route.
pub const NOT_FOUND_BODY: ErrorBody = ErrorBody { error: "not found" };

/// Build a JSON response with the fixed content type.
pub fn json_response(status: StatusCode, body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(JSON_CONTENT_TYPE),
    );
    response
}

/// Build a JSON response from a serializable payload.
pub fn json_error(status: StatusCode, body: &ErrorBody) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => json_response(status, Bytes::from(bytes)),
        Err(_) => status.into_response(),
    }
}

/// Response sink that hands its single write to the transport over a oneshot.
#[derive(Debug)]
pub struct HttpResponseSink {
    tx: Option<oneshot::Sender<Response>>,
}

impl HttpResponseSink {
    /// Create a sink and the transport-side handle that resolves it.
    pub fn channel() -> (Self, PendingResponse) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, PendingResponse { rx })
    }
}

impl ResponseSink for HttpResponseSink {
    fn write(&mut self, status: StatusCode, body: Bytes) -> Result<(), SinkError> {
        let tx = self.tx.take().ok_or(SinkError::DuplicateFinalization)?;
        tx.send(json_response(status, body))
            .map_err(|_| SinkError::Closed)
    }
}

/// Transport-side half of an [`HttpResponseSink`].
#[derive(Debug)]
pub struct PendingResponse {
    rx: oneshot::Receiver<Response>,
}

impl PendingResponse {
    /// Take the finalized response, if any write happened.
    pub fn try_take(&mut self) -> Option<Response> {
        self.rx.try_recv().ok()
    }
}

impl IntoResponse for PendingResponse {
    fn into_response(mut self) -> Response {
        self.try_take()
            .unwrap_or_else(|| StatusCode::OK.into_response())
    }
}

//! Inbound request handling.
//!
//! # Responsibilities
//! - Generate unique request IDs (UUID v4)
//! - Buffer the request body under a size limit
//! - Expose query, form and JSON accessors to handlers
//!
//! # Design Decisions
//! - The request is read-only once buffered and needs no synchronization
//! - Scalar accessors take the last value of a repeated key
//! - Unparsable values fall back to the caller's default

use std::collections::HashMap;

use axum::{
    body::{Body, Bytes},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, Request, Uri},
};
use http_body_util::LengthLimitError;
use serde::de::DeserializeOwned;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::error::RequestError;

/// Name of the request ID header.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates a UUID v4 for every request lacking an `x-request-id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Read the request ID header, if present.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Parsed key/value pairs with repeated keys preserved in order.
pub type ParamMap = HashMap<String, Vec<String>>;

/// Read-only view of one inbound call.
#[derive(Debug)]
pub struct InboundRequest {
    parts: Parts,
    body: Bytes,
}

impl InboundRequest {
    /// Buffer an axum request, rejecting bodies over `limit` bytes.
    pub async fn from_request(request: Request<Body>, limit: usize) -> Result<Self, RequestError> {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, limit).await.map_err(|e| {
            let inner = e.into_inner();
            if is_length_limit(&*inner) {
                RequestError::BodyTooLarge { limit }
            } else {
                RequestError::Body(inner.to_string())
            }
        })?;
        Ok(Self { parts, body })
    }

    /// Build a request from already-buffered parts.
    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        Self { parts, body }
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn request_id(&self) -> &str {
        request_id(&self.parts.headers)
    }

    /// All query parameters.
    pub fn query_all(&self) -> ParamMap {
        parse_pairs(self.parts.uri.query().unwrap_or_default().as_bytes())
    }

    /// Query parameter as an integer, or `default`.
    pub fn query_int(&self, key: &str, default: i64) -> i64 {
        last_int(&self.query_all(), key, default)
    }

    /// Query parameter as a string, or `default`.
    pub fn query_string(&self, key: &str, default: &str) -> String {
        last_string(&self.query_all(), key, default)
    }

    /// Every value of a query parameter, or `default`.
    pub fn query_array(&self, key: &str, default: &[&str]) -> Vec<String> {
        all_values(self.query_all(), key, default)
    }

    /// All form parameters of an `application/x-www-form-urlencoded` body.
    ///
    /// Returns an empty map for any other content type.
    pub fn form_all(&self) -> ParamMap {
        let is_form = self
            .parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        if is_form {
            parse_pairs(&self.body)
        } else {
            ParamMap::new()
        }
    }

    /// Form parameter as an integer, or `default`.
    pub fn form_int(&self, key: &str, default: i64) -> i64 {
        last_int(&self.form_all(), key, default)
    }

    /// Form parameter as a string, or `default`.
    pub fn form_string(&self, key: &str, default: &str) -> String {
        last_string(&self.form_all(), key, default)
    }

    /// Every value of a form parameter, or `default`.
    pub fn form_array(&self, key: &str, default: &[&str]) -> Vec<String> {
        all_values(self.form_all(), key, default)
    }

    /// Deserialize the body as JSON.
    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T, RequestError> {
        if self.body.is_empty() {
            return Err(RequestError::MissingBody);
        }
        serde_json::from_slice(&self.body).map_err(RequestError::InvalidJson)
    }
}

fn is_length_limit(error: &(dyn std::error::Error + 'static)) -> bool {
    std::iter::successors(Some(error), |e| e.source())
        .any(|e| e.downcast_ref::<LengthLimitError>().is_some())
}

fn parse_pairs(input: &[u8]) -> ParamMap {
    let mut params = ParamMap::new();
    for (key, value) in url::form_urlencoded::parse(input) {
        params
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    params
}

fn last_string(params: &ParamMap, key: &str, default: &str) -> String {
    params
        .get(key)
        .and_then(|vals| vals.last())
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

fn last_int(params: &ParamMap, key: &str, default: i64) -> i64 {
    params
        .get(key)
        .and_then(|vals| vals.last())
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn all_values(mut params: ParamMap, key: &str, default: &[&str]) -> Vec<String> {
    params
        .remove(key)
        .unwrap_or_else(|| default.iter().map(|s| s.to_string()).collect())
}

//! Per-call request context.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::ContextError;
use crate::http::request::InboundRequest;
use crate::http::response::ResponseSink;
use crate::supervisor::guard::{Finalization, ResponseGuard};
use crate::supervisor::scope::ExecutionScope;

/// Everything one supervised call shares between the supervisor and the
/// handler task.
///
/// Created per inbound call and never reused. The handler receives it as an
/// `Arc` and may outlive the supervised call after a timeout.
#[derive(Debug)]
pub struct RequestContext {
    request: InboundRequest,
    scope: ExecutionScope,
    guard: ResponseGuard,
}

impl RequestContext {
    /// Bind a request and its response sink to a scope with a `deadline`
    /// derived from `parent`.
    pub fn create(
        request: InboundRequest,
        response: impl ResponseSink,
        parent: &CancellationToken,
        deadline: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            request,
            scope: ExecutionScope::with_deadline(parent, deadline),
            guard: ResponseGuard::new(response),
        })
    }

    pub fn request(&self) -> &InboundRequest {
        &self.request
    }

    pub fn scope(&self) -> &ExecutionScope {
        &self.scope
    }

    pub(crate) fn guard(&self) -> &ResponseGuard {
        &self.guard
    }

    /// Write a JSON result under the response guard.
    ///
    /// A no-op returning [`Finalization::Suppressed`] once the response has
    /// been finalized, e.g. when the deadline already answered the client.
    ///
    /// This is the only write path open to handlers. The guard is held for
    /// one synchronous write and cannot be kept across an `.await`:
    ///
    /// ```compile_fail
    /// use std::sync::Arc;
    /// use deadline_supervisor::RequestContext;
    ///
    /// async fn hold(ctx: Arc<RequestContext>) {
    ///     let _held = ctx.guard().acquire().await;
    ///     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    /// }
    /// ```
    pub async fn json<T: Serialize + ?Sized>(
        &self,
        status: StatusCode,
        payload: &T,
    ) -> Result<Finalization, ContextError> {
        let mut finalizer = self.guard.acquire().await;
        let result = finalizer.write_result(status, payload);
        if matches!(result, Ok(Finalization::Suppressed)) {
            crate::observability::metrics::record_suppressed_write();
            tracing::debug!(
                request_id = %self.request.request_id(),
                status = status.as_u16(),
                timed_out = finalizer.has_timed_out(),
                "Response already finalized, discarding write"
            );
        }
        result
    }

    /// Cancel the execution scope. Idempotent.
    pub fn release(&self) {
        self.scope.release();
    }
}

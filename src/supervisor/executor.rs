//! Supervised execution of a single handler invocation.
//!
//! # Protocol
//! ```text
//!            ┌──────────── spawn(handler) ───────────┐
//!            │   catch_unwind                         │
//!            │     Ok(())    → finished  (oneshot)    │
//!            │     Err / ⚡  → failure   (oneshot)    │
//!            └────────────────────────────────────────┘
//!   select! (first wins, the rest are dropped)
//!     failure  → guard → log fault → 500 → Failed
//!     finished →                           Completed
//!     scope    → guard → 504 → timed_out → TimedOut
//!   drop guard releases the execution scope on every path
//! ```
//!
//! The handler task is not aborted on timeout. It keeps running in the
//! background and any later write is discarded by the finalized flag.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use futures_util::FutureExt;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::SupervisionConfig;
use crate::error::HandlerFault;
use crate::http::request::InboundRequest;
use crate::http::response::{ResponseSink, FAILURE_BODY, TIMEOUT_BODY};
use crate::observability::metrics;
use crate::supervisor::context::RequestContext;
use crate::supervisor::guard::Finalization;
use crate::supervisor::handler::Handler;
use crate::supervisor::outcome::Outcome;

/// Runs handlers under a deadline with panic isolation.
#[derive(Debug, Clone, Copy)]
pub struct Supervisor {
    deadline: Duration,
}

impl Supervisor {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn from_config(config: &SupervisionConfig) -> Self {
        Self::new(config.deadline())
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Create a context for `request` and supervise one `handler` call on it.
    pub async fn supervise<H>(
        &self,
        handler: Arc<H>,
        request: InboundRequest,
        response: impl ResponseSink,
        parent: &CancellationToken,
    ) -> Outcome
    where
        H: Handler + ?Sized,
    {
        let ctx = RequestContext::create(request, response, parent, self.deadline);
        Self::supervise_context(ctx, handler).await
    }

    /// Supervise one `handler` call on an existing context.
    ///
    /// The context's scope is released before this returns, and also if the
    /// returned future is dropped early.
    pub async fn supervise_context<H>(ctx: Arc<RequestContext>, handler: Arc<H>) -> Outcome
    where
        H: Handler + ?Sized,
    {
        let _release = ctx.scope().release_on_drop();
        let started = Instant::now();

        let (finished_tx, finished_rx) = oneshot::channel::<()>();
        let (failure_tx, failure_rx) = oneshot::channel::<HandlerFault>();

        let task_ctx = Arc::clone(&ctx);
        tokio::spawn(
            async move {
                // The call itself sits inside the unwind boundary so a
                // handler that panics before returning its future is caught.
                let run = AssertUnwindSafe(async move { handler.call(task_ctx).await });
                match run.catch_unwind().await {
                    Ok(Ok(())) => {
                        let _ = finished_tx.send(());
                    }
                    Ok(Err(error)) => {
                        let _ = failure_tx.send(HandlerFault::Errored(error.to_string()));
                    }
                    Err(payload) => {
                        let _ = failure_tx.send(HandlerFault::from_panic(&*payload));
                    }
                }
            }
            .in_current_span(),
        );

        let request_id = ctx.request().request_id();

        let outcome = tokio::select! {
            Ok(fault) = failure_rx => {
                let mut finalizer = ctx.guard().acquire().await;
                tracing::error!(request_id = %request_id, error = %fault, "Handler fault recovered");
                if let Err(e) = finalizer.write_result(StatusCode::INTERNAL_SERVER_ERROR, &FAILURE_BODY) {
                    tracing::error!(request_id = %request_id, error = %e, "Failed to write failure response");
                }
                Outcome::Failed(fault)
            }
            Ok(()) = finished_rx => Outcome::Completed,
            end = ctx.scope().done() => {
                let mut finalizer = ctx.guard().acquire().await;
                let written = finalizer.write_result(StatusCode::GATEWAY_TIMEOUT, &TIMEOUT_BODY);
                finalizer.mark_timed_out();
                drop(finalizer);

                let deadline_ms = ctx.scope().budget().as_millis() as u64;
                match written {
                    Ok(Finalization::Written) => tracing::warn!(
                        request_id = %request_id,
                        deadline_ms,
                        cause = end.as_label(),
                        response = ?Finalization::Written,
                        "Handler did not finish in time"
                    ),
                    Ok(Finalization::Suppressed) => tracing::info!(
                        request_id = %request_id,
                        deadline_ms,
                        cause = end.as_label(),
                        response = ?Finalization::Suppressed,
                        "Scope ended after the handler had already responded"
                    ),
                    Err(e) => tracing::error!(
                        request_id = %request_id,
                        error = %e,
                        "Failed to write timeout response"
                    ),
                }
                Outcome::TimedOut(end)
            }
        };

        let elapsed = started.elapsed();
        metrics::record_outcome(outcome.as_label(), elapsed);
        tracing::debug!(
            request_id = %request_id,
            outcome = outcome.as_label(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Supervised call resolved"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::Request;
    use futures_util::future::BoxFuture;
    use tokio::sync::mpsc;

    use crate::supervisor::guard::tests::RecordingSink;
    use crate::supervisor::handler::HandlerResult;
    use crate::supervisor::scope::ScopeEnd;

    const DEADLINE: Duration = Duration::from_secs(1);

    fn context(sink: RecordingSink, parent: &CancellationToken) -> Arc<RequestContext> {
        let (parts, _) = Request::builder()
            .uri("/foo")
            .header("x-request-id", "test-id")
            .body(())
            .unwrap()
            .into_parts();
        RequestContext::create(
            InboundRequest::from_parts(parts, Bytes::new()),
            sink,
            parent,
            DEADLINE,
        )
    }

    async fn write_ok_after(ctx: Arc<RequestContext>, delay: Duration) -> HandlerResult {
        tokio::time::sleep(delay).await;
        ctx.json(StatusCode::OK, "ok").await?;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_times_out_at_deadline() {
        let sink = RecordingSink::default();
        let ctx = context(sink.clone(), &CancellationToken::new());
        let (tx, mut late_writes) = mpsc::unbounded_channel();

        let handler = Arc::new(move |ctx: Arc<RequestContext>| {
            let tx = tx.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(3)).await;
                let result = ctx.json(StatusCode::OK, "ok").await?;
                let _ = tx.send(result);
                HandlerResult::Ok(())
            }
        });

        let start = Instant::now();
        let outcome = Supervisor::supervise_context(ctx.clone(), handler).await;
        let elapsed = start.elapsed();

        assert_eq!(outcome, Outcome::TimedOut(ScopeEnd::DeadlineElapsed));
        assert!(elapsed >= DEADLINE);
        assert!(elapsed < DEADLINE + Duration::from_millis(10));
        assert!(ctx.scope().is_released());

        let (status, body) = sink.first().unwrap();
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(body.contains("request timed out"));

        // The handler keeps running and its late write is discarded.
        assert_eq!(late_writes.recv().await, Some(Finalization::Suppressed));
        assert_eq!(sink.count(), 1);
        assert!(ctx.guard().acquire().await.has_timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_yields_failure_promptly() {
        async fn boom(_ctx: Arc<RequestContext>) -> HandlerResult {
            panic!("boom");
        }

        let sink = RecordingSink::default();
        let ctx = context(sink.clone(), &CancellationToken::new());

        let start = Instant::now();
        let outcome = Supervisor::supervise_context(ctx.clone(), Arc::new(boom)).await;

        assert_eq!(outcome, Outcome::Failed(HandlerFault::Panicked("boom".into())));
        assert!(start.elapsed() < Duration::from_millis(10));
        assert!(ctx.scope().is_released());

        let (status, body) = sink.first().unwrap();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("internal server error"));
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_handler_response_is_unaltered() {
        let sink = RecordingSink::default();
        let ctx = context(sink.clone(), &CancellationToken::new());

        let handler = Arc::new(|ctx: Arc<RequestContext>| {
            write_ok_after(ctx, Duration::from_millis(200))
        });

        let start = Instant::now();
        let outcome = Supervisor::supervise_context(ctx.clone(), handler).await;
        let elapsed = start.elapsed();

        assert_eq!(outcome, Outcome::Completed);
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(210));
        assert_eq!(sink.first(), Some((StatusCode::OK, "\"ok\"".into())));
        assert_eq!(sink.count(), 1);
        assert!(ctx.scope().is_released());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fault_after_write_keeps_original_response() {
        async fn write_then_panic(ctx: Arc<RequestContext>) -> HandlerResult {
            ctx.json(StatusCode::OK, "ok").await?;
            panic!("after write");
        }

        let sink = RecordingSink::default();
        let ctx = context(sink.clone(), &CancellationToken::new());

        let outcome = Supervisor::supervise_context(ctx, Arc::new(write_then_panic)).await;

        assert!(outcome.is_failed());
        assert_eq!(sink.count(), 1);
        assert_eq!(sink.first(), Some((StatusCode::OK, "\"ok\"".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returned_error_is_a_failure() {
        async fn refuse(_ctx: Arc<RequestContext>) -> HandlerResult {
            Err("downstream refused".into())
        }

        let sink = RecordingSink::default();
        let ctx = context(sink.clone(), &CancellationToken::new());

        let outcome = Supervisor::supervise_context(ctx, Arc::new(refuse)).await;

        assert_eq!(
            outcome,
            Outcome::Failed(HandlerFault::Errored("downstream refused".into()))
        );
        assert_eq!(sink.first().unwrap().0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eager_panic_in_call_is_isolated() {
        struct PanicsOnCall;

        impl Handler for PanicsOnCall {
            fn call(&self, _ctx: Arc<RequestContext>) -> BoxFuture<'static, HandlerResult> {
                panic!("eager");
            }
        }

        let sink = RecordingSink::default();
        let ctx = context(sink.clone(), &CancellationToken::new());

        let outcome = Supervisor::supervise_context(ctx, Arc::new(PanicsOnCall)).await;

        assert_eq!(outcome, Outcome::Failed(HandlerFault::Panicked("eager".into())));
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_without_write_leaves_sink_untouched() {
        async fn silent(_ctx: Arc<RequestContext>) -> HandlerResult {
            Ok(())
        }

        let sink = RecordingSink::default();
        let ctx = context(sink.clone(), &CancellationToken::new());

        let outcome = Supervisor::supervise_context(ctx, Arc::new(silent)).await;

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(sink.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_resolves_as_timeout() {
        let parent = CancellationToken::new();
        let sink = RecordingSink::default();
        let ctx = context(sink.clone(), &parent);

        let handler = Arc::new(|ctx: Arc<RequestContext>| {
            write_ok_after(ctx, Duration::from_secs(5))
        });

        let canceller = parent.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let outcome = Supervisor::supervise_context(ctx, handler).await;

        assert_eq!(outcome, Outcome::TimedOut(ScopeEnd::Cancelled));
        assert_eq!(sink.first().unwrap().0, StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_call_releases_scope() {
        let ctx = context(RecordingSink::default(), &CancellationToken::new());
        let handler = Arc::new(|ctx: Arc<RequestContext>| {
            write_ok_after(ctx, Duration::from_secs(5))
        });

        let call = tokio::spawn(Supervisor::supervise_context(ctx.clone(), handler));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!ctx.scope().is_released());

        call.abort();
        let _ = call.await;
        assert!(ctx.scope().is_released());
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_builds_context_with_deadline() {
        let sink = RecordingSink::default();
        let supervisor = Supervisor::new(Duration::from_millis(300));
        let (parts, _) = Request::builder().uri("/slow").body(()).unwrap().into_parts();

        let handler = Arc::new(|ctx: Arc<RequestContext>| {
            write_ok_after(ctx, Duration::from_secs(1))
        });

        let start = Instant::now();
        let outcome = supervisor
            .supervise(
                handler,
                InboundRequest::from_parts(parts, Bytes::new()),
                sink.clone(),
                &CancellationToken::new(),
            )
            .await;

        assert!(outcome.is_timed_out());
        assert!(start.elapsed() < Duration::from_millis(310));
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_at_deadline_finalizes_once() {
        let sink = RecordingSink::default();
        let ctx = context(sink.clone(), &CancellationToken::new());

        // Completion and deadline land on the same instant and race for the guard.
        let handler = Arc::new(|ctx: Arc<RequestContext>| write_ok_after(ctx, DEADLINE));

        let start = Instant::now();
        let outcome = Supervisor::supervise_context(ctx.clone(), handler).await;
        assert!(start.elapsed() < DEADLINE + Duration::from_millis(10));

        // Let a handler that lost the race attempt its write.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(sink.count(), 1);
        let (status, _) = sink.first().unwrap();
        assert!(
            status == StatusCode::OK || status == StatusCode::GATEWAY_TIMEOUT,
            "unexpected status {status}"
        );
        if status == StatusCode::GATEWAY_TIMEOUT {
            assert!(outcome.is_timed_out());
        }
        assert!(ctx.scope().is_released());
    }
}

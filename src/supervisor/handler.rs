//! Handler abstraction.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::supervisor::context::RequestContext;

/// Error a handler may return instead of completing.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result of one handler invocation.
pub type HandlerResult = Result<(), HandlerError>;

/// A unit of request-specific work run under supervision.
///
/// Handlers write their own response through [`RequestContext::json`].
/// Implemented for any `Fn(Arc<RequestContext>) -> impl Future<Output = HandlerResult>`.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: Arc<RequestContext>) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Arc<RequestContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: Arc<RequestContext>) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(ctx))
    }
}

//! Demonstration handlers served by the binary.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde::Serialize;

use crate::http::request::ParamMap;
use crate::routing::RouteTable;
use crate::supervisor::{HandlerResult, RequestContext};

/// Simulates slow downstream work, then answers `200 "ok"`.
///
/// Sleeps for `delay_ms` (query, default 3000).
pub async fn foo(ctx: Arc<RequestContext>) -> HandlerResult {
    let delay = ctx.request().query_int("delay_ms", 3000).max(0) as u64;
    tokio::time::sleep(Duration::from_millis(delay)).await;
    tracing::debug!(delay_ms = delay, "foo finished its work");
    ctx.json(StatusCode::OK, "ok").await?;
    Ok(())
}

/// Panics. With `after_write=1` it first answers `200 "ok"`.
pub async fn panicking(ctx: Arc<RequestContext>) -> HandlerResult {
    if ctx.request().query_int("after_write", 0) == 1 {
        ctx.json(StatusCode::OK, "ok").await?;
    }
    panic!("handler panicked on purpose");
}

#[derive(Serialize)]
struct Echo {
    method: String,
    path: String,
    query: ParamMap,
    form: ParamMap,
}

/// Answers with the request's method, path, query and form parameters.
pub async fn echo(ctx: Arc<RequestContext>) -> HandlerResult {
    let request = ctx.request();
    let echo = Echo {
        method: request.method().to_string(),
        path: request.path().to_string(),
        query: request.query_all(),
        form: request.form_all(),
    };
    ctx.json(StatusCode::OK, &echo).await?;
    Ok(())
}

/// Route table with every demonstration handler registered.
pub fn routes() -> RouteTable {
    RouteTable::new()
        .register("/foo", foo)
        .register("/panic", panicking)
        .register("/echo", echo)
}

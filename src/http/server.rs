//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the axum Router with the dispatch handler
//! - Wire up middleware (request ID, tracing)
//! - Dispatch each inbound call to the supervisor
//! - Apply configuration reloads between calls
//! - Graceful shutdown, cancelling in-flight supervised calls

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::Instrument;

use crate::config::ServiceConfig;
use crate::error::RequestError;
use crate::http::request::{request_id, InboundRequest, UuidRequestId};
use crate::http::response::{json_error, ErrorBody, HttpResponseSink, NOT_FOUND_BODY};
use crate::routing::RouteTable;
use crate::supervisor::Supervisor;

/// Application state injected into the dispatch handler.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub config: Arc<ArcSwap<ServiceConfig>>,
    /// Parent of every call's execution scope. Cancelled on shutdown.
    pub root_scope: CancellationToken,
}

/// HTTP server running supervised handlers.
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server serving `routes` with the given configuration.
    pub fn new(config: ServiceConfig, routes: RouteTable) -> Self {
        let state = AppState {
            routes: Arc::new(routes),
            config: Arc::new(ArcSwap::from_pointee(config)),
            root_scope: CancellationToken::new(),
        };
        Self { state }
    }

    /// Build the axum router with all middleware layers.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(self.state.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Get the current config.
    pub fn config(&self) -> Arc<ServiceConfig> {
        self.state.config.load_full()
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configs received on `config_updates` replace the live config; calls
    /// already in flight keep the deadline they started with.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ServiceConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = ?self.state.routes.paths(),
            deadline_ms = self.config().supervision.deadline_ms,
            "HTTP server starting"
        );

        let live_config = Arc::clone(&self.state.config);
        let reloader = tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                tracing::info!(
                    deadline_ms = new_config.supervision.deadline_ms,
                    "Applying configuration update"
                );
                live_config.store(Arc::new(new_config));
            }
        });

        let root_scope = self.state.root_scope.clone();
        let app = self.router();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown requested, cancelling in-flight calls");
                root_scope.cancel();
            })
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Dispatch one inbound call: route, buffer, supervise, respond.
async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = request_id(request.headers()).to_string();
    let path = request.uri().path().to_string();

    let Some(handler) = state.routes.get(&path) else {
        tracing::warn!(request_id = %request_id, path = %path, "No route matched");
        return json_error(StatusCode::NOT_FOUND, &NOT_FOUND_BODY);
    };

    // Read once so a reload mid-call cannot change this call's settings.
    let config = state.config.load_full();

    let inbound = match InboundRequest::from_request(request, config.limits.max_body_bytes).await {
        Ok(inbound) => inbound,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Rejected request body");
            return request_error_response(&e);
        }
    };

    let (sink, pending) = HttpResponseSink::channel();
    let supervisor = Supervisor::from_config(&config.supervision);
    let span = tracing::info_span!("supervise", request_id = %request_id, path = %path);

    let outcome = supervisor
        .supervise(handler, inbound, sink, &state.root_scope)
        .instrument(span)
        .await;

    tracing::debug!(request_id = %request_id, outcome = %outcome, "Call finished");
    pending.into_response()
}

fn request_error_response(error: &RequestError) -> Response {
    match error {
        RequestError::BodyTooLarge { .. } => json_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            &ErrorBody {
                error: "request body too large",
            },
        ),
        _ => json_error(
            StatusCode::BAD_REQUEST,
            &ErrorBody {
                error: "invalid request body",
            },
        ),
    }
}

//! HTTP surface for the remote function
//!
//! `POST /` takes a batch envelope and answers with the replies in order.
//! `GET /health` and `GET /metrics` are there for the platform.

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::batch::{BatchDispatcher, BatchRequest, BatchResponse};
use crate::metrics;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<BatchDispatcher>,
}

impl AppState {
    /// Wrap a dispatcher for use by the handlers
    pub fn new(dispatcher: BatchDispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(handle_batch))
        .route("/health", get(health_check))
        .route("/metrics", get(export_metrics))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
            let tid = Uuid::new_v4().simple().to_string();
            info_span!("request", tid, method = ?req.method(), path = req.uri().path())
        }))
}

/// Bind to `port` on all interfaces and serve until SIGINT/SIGTERM
pub async fn serve(port: u16, state: AppState) -> crate::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Starting remote function server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn handle_batch(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match BatchRequest::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Failed to decode batch request");
            metrics::record_envelope_error();
            return send_error(&e, StatusCode::BAD_REQUEST);
        }
    };

    // Fires when this handler is dropped, e.g. because the client went away
    let cancel = CancellationToken::new();
    let _disconnect = cancel.clone().drop_guard();

    let response = state.dispatcher.dispatch(request, cancel).await;
    send_success(response)
}

/// Whole-request failure with `status` and a top-level error message
pub fn send_error(err: &impl Display, status: StatusCode) -> Response {
    let body = BatchResponse::error(format!("Got error with details: {err}"));
    (status, Json(body)).into_response()
}

/// Successful batch response
pub fn send_success(response: BatchResponse) -> Response {
    (StatusCode::OK, Json(response)).into_response()
}

async fn health_check() -> impl IntoResponse {
    "ok"
}

async fn export_metrics() -> Response {
    match metrics::export_metrics() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to export metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal, draining in-flight requests");
}

//! HTTP surface for the memory subsystem
//!
//! Read endpoints mirroring the CLI (index, timeline, list, single
//! entity), a retrieval endpoint, a consolidation trigger, and an SSE
//! stream of memory events. Stateless beyond the store itself; every
//! endpoint returns a structured error body instead of crashing.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::consolidation::similarity::Similarity;
use crate::error::{EngramError, Result};
use crate::events::EventBus;
use crate::storage::EntityStore;

/// Shared application state for all handlers.
pub struct AppState {
    pub config: Config,
    pub store: EntityStore,
    pub similarity: Box<dyn Similarity>,
    pub events: EventBus,
}

/// The memory daemon's HTTP server.
pub struct MemoryServer {
    state: Arc<AppState>,
}

impl MemoryServer {
    pub fn new(config: Config, store: EntityStore, similarity: Box<dyn Similarity>) -> Self {
        Self {
            state: Arc::new(AppState {
                config,
                store,
                similarity,
                events: EventBus::default(),
            }),
        }
    }

    /// Start serving and block until shutdown.
    pub async fn serve(&self) -> Result<()> {
        let addr: SocketAddr = self
            .state
            .config
            .server
            .listen_addr
            .parse()
            .map_err(|e| EngramError::Config(format!("Invalid listen address: {e}")))?;

        let app = create_router(self.state.clone());

        tracing::info!("Starting memory server on {addr}");
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| EngramError::Server(format!("Failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| EngramError::Server(format!("Server error: {e}")))?;

        tracing::info!("Memory server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/index", get(handlers::index_handler))
        .route("/api/timeline", get(handlers::timeline_handler))
        .route("/api/entities", get(handlers::entities_handler))
        .route("/api/entities/{kind}/{id}", get(handlers::entity_handler))
        .route("/api/retrieve", post(handlers::retrieve_handler))
        .route("/api/consolidate", post(handlers::consolidate_handler))
        .route("/api/economics", get(handlers::economics_handler))
        .route("/events", get(handlers::events_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Structured error body returned by every endpoint.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "bad_request",
            message: message.into(),
        }
    }
}

impl From<EngramError> for ApiError {
    fn from(e: EngramError) -> Self {
        let status = match &e {
            EngramError::NotFound { .. } | EngramError::CorruptEntity { .. } => {
                StatusCode::NOT_FOUND
            }
            EngramError::LockTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngramError::NamespaceViolation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: e.kind_str(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.kind,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

//! # Debugger HTTP API Module
//!
//! REST surface of the live trace, built on axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Trace metrics and store revision
//! - `GET /trace` - Full recursive trace
//! - `GET /trace/wait` - Long-poll for the next revision
//! - `POST /notify` - Apply one engine notification
//! - `POST /notify/batch` - Apply a batch of notifications
//! - `POST /reset` - Clear the trace
//! - `GET /reco/{reco_id}` - Recognition detail by engine id
//! - `GET /drops` - Recently dropped messages
//! - `POST /export` - Canonical binary snapshot
//!
//! Ingest routes (`/notify*`, `/reset`) are never rate limited. Settings
//! come from [`DebuggerConfig`].

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{ApiKey, api_key_auth_middleware};
pub use middleware::{GlobalRateLimiter, create_rate_limiter, rate_limit_middleware};
// Re-export handlers and types for integration tests (via `maadbg::api::*`)
#[allow(unused_imports)]
pub use handlers::{
    drops_handler, export_handler, health_handler, notify_batch_handler, notify_handler,
    recognition_handler, reset_handler, status_handler, trace_handler, trace_wait_handler,
};
#[allow(unused_imports)]
pub use types::{
    BatchResponse, DropsResponse, ExportResponse, HealthResponse, NotifyResponse,
    RecognitionResponse, ResetResponse, StatusResponse, WaitQuery,
};

use crate::config::DebuggerConfig;
use crate::ingest::{IngestHandle, spawn_ingest_loop};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use maadbg_core::{DebuggerError, TraceStore};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state: the store for reads, the ingest handle for writes.
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: Arc<TraceStore>,
    pub ingest: IngestHandle,
}

impl AppState {
    /// Create a fresh store and start its ingest loop.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(Arc::new(TraceStore::new()))
    }

    #[must_use]
    pub fn with_store(store: Arc<TraceStore>) -> Self {
        let ingest = spawn_ingest_loop(Arc::clone(&store));
        Self { store, ingest }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer from the configured origins.
///
/// - `["*"]`: any origin
/// - empty: localhost only
/// - otherwise: exactly the listed origins
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS: Allowing ALL origins. This is insecure outside local development!");
        return CorsLayer::permissive();
    }
    if origins.is_empty() {
        tracing::info!("CORS: No origins configured, defaulting to localhost only");
        return build_localhost_cors();
    }

    let allowed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(hv) => {
                tracing::info!("CORS: Allowing origin: {}", origin);
                Some(hv)
            }
            Err(e) => {
                tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    if allowed_origins.is_empty() {
        tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
        return build_localhost_cors();
    }
    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Localhost origins used by the renderer dev servers.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:5173",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:5173",
    ]
    .into_iter()
    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Authentication - validates API key (if configured)
/// 4. Rate limiting - read and export routes only (if enabled)
pub fn create_router(state: AppState, config: &DebuggerConfig) -> Router {
    let mut reads = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/trace", get(handlers::trace_handler))
        .route("/trace/wait", get(handlers::trace_wait_handler))
        .route("/reco/{reco_id}", get(handlers::recognition_handler))
        .route("/drops", get(handlers::drops_handler))
        .route("/export", post(handlers::export_handler));

    if config.rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", config.rate_limit);
        reads = reads.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(config.rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    let ingest = Router::new()
        .route("/notify", post(handlers::notify_handler))
        .route("/notify/batch", post(handlers::notify_batch_handler))
        .route("/reset", post(handlers::reset_handler));

    let mut router = reads.merge(ingest);

    match config.api_key.as_deref() {
        Some(key) => {
            tracing::info!("API key authentication enabled");
            router = router.layer(axum_middleware::from_fn_with_state(
                ApiKey::new(key),
                auth::api_key_auth_middleware,
            ));
        }
        None => {
            tracing::warn!(
                "API key authentication DISABLED - all endpoints are publicly accessible! \
                 Set MAADBG_API_KEY to enable authentication."
            );
        }
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(config.body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(&config.cors_origins)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server and serve until Ctrl-C.
pub async fn run_server(config: &DebuggerConfig) -> Result<(), DebuggerError> {
    let state = AppState::new();
    let router = create_router(state, config);
    let addr = config.bind_addr();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| DebuggerError::Io(format!("Bind failed: {}", e)))?;

    tracing::info!("maadbg HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| DebuggerError::Io(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

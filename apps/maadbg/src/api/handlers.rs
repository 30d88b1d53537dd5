//! # API Endpoint Handlers

use super::{
    AppState,
    types::{
        BatchResponse, DropsResponse, ExportResponse, HealthResponse, NotifyResponse,
        RecognitionResponse, ResetResponse, StatusResponse, WaitQuery,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use maadbg_core::{
    Normalizer, Outcome, RawNotification, export_canonical, primitives::MAX_BATCH_LENGTH,
    read_canonical_header, snapshot_digest,
};
use std::time::Duration;

/// Default long-poll wait.
const DEFAULT_WAIT_MS: u64 = 10_000;

/// Longest long-poll wait a client may ask for.
const MAX_WAIT_MS: u64 = 60_000;

// =============================================================================
// HEALTH & STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Trace metrics and store revision.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let response = StatusResponse {
        revision: state.store.revision(),
        metrics: state.store.metrics(),
        dropped: state.store.drops().len(),
    };
    (StatusCode::OK, Json(response))
}

// =============================================================================
// TRACE
// =============================================================================

/// Full recursive trace.
pub async fn trace_handler(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.store.snapshot()))
}

/// Long-poll: returns the trace once its revision passes `after`.
pub async fn trace_wait_handler(
    State(state): State<AppState>,
    Query(query): Query<WaitQuery>,
) -> impl IntoResponse {
    let timeout_ms = query.timeout_ms.unwrap_or(DEFAULT_WAIT_MS).min(MAX_WAIT_MS);
    let timeout = Duration::from_millis(timeout_ms);
    state.ingest.wait_for_revision(query.after, timeout).await;
    (StatusCode::OK, Json(state.store.snapshot()))
}

// =============================================================================
// NOTIFY
// =============================================================================

/// Apply one engine notification and report what it did.
pub async fn notify_handler(
    State(state): State<AppState>,
    Json(raw): Json<RawNotification>,
) -> impl IntoResponse {
    let message = match Normalizer::normalize(&raw) {
        Ok(message) => message,
        Err(reason) => {
            tracing::warn!(msg = %raw.msg, %reason, "rejected notification");
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(NotifyResponse::rejected(reason)),
            );
        }
    };

    match state.ingest.dispatch(message).await {
        Ok(outcome) => (StatusCode::OK, Json(NotifyResponse::applied(outcome))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(NotifyResponse::error(format!("Ingest unavailable: {}", e))),
        ),
    }
}

/// Apply a batch of notifications in order.
///
/// Notifications the normalizer rejects are counted and skipped; the rest
/// are queued back to back so no other writer can interleave.
pub async fn notify_batch_handler(
    State(state): State<AppState>,
    Json(batch): Json<Vec<RawNotification>>,
) -> impl IntoResponse {
    if batch.len() > MAX_BATCH_LENGTH {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(BatchResponse::error(format!(
                "Batch of {} notifications exceeds maximum {}",
                batch.len(),
                MAX_BATCH_LENGTH
            ))),
        );
    }

    let mut response = BatchResponse {
        success: true,
        ..BatchResponse::default()
    };
    let mut pending = Vec::with_capacity(batch.len());
    for raw in &batch {
        let Some(message) = Normalizer::accept(raw) else {
            response.rejected += 1;
            continue;
        };
        match state.ingest.enqueue(message) {
            Ok(receiver) => pending.push(receiver),
            Err(e) => {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(BatchResponse::error(format!("Ingest unavailable: {}", e))),
                );
            }
        }
    }

    for receiver in pending {
        match receiver.await {
            Ok(Outcome::Dropped(_)) => response.dropped += 1,
            Ok(_) => response.applied += 1,
            Err(_) => {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(BatchResponse::error("Ingest stopped mid-batch")),
                );
            }
        }
    }

    (StatusCode::OK, Json(response))
}

/// Clear the trace.
pub async fn reset_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.ingest.reset().await {
        Ok(revision) => (StatusCode::OK, Json(ResetResponse::success(revision))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ResetResponse::error(format!("Reset failed: {}", e))),
        ),
    }
}

// =============================================================================
// LOOKUPS
// =============================================================================

/// Recognition detail by engine recognition id.
pub async fn recognition_handler(
    State(state): State<AppState>,
    Path(reco_id): Path<i64>,
) -> impl IntoResponse {
    match state.store.recognition(reco_id) {
        Some(recognition) => (StatusCode::OK, Json(RecognitionResponse::found(recognition))),
        None => (
            StatusCode::NOT_FOUND,
            Json(RecognitionResponse::not_found(reco_id)),
        ),
    }
}

/// Recently dropped messages.
pub async fn drops_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(DropsResponse {
        drops: state.store.drops(),
    })
}

// =============================================================================
// EXPORT HANDLER
// =============================================================================

/// Export the trace as a canonical snapshot.
pub async fn export_handler(State(state): State<AppState>) -> impl IntoResponse {
    let exported = state
        .store
        .read(export_canonical)
        .and_then(|data| read_canonical_header(&data).map(|header| (data, header)));

    match exported {
        Ok((data, header)) => (
            StatusCode::OK,
            Json(ExportResponse::success(
                &data,
                header.checksum,
                snapshot_digest(&data),
                header.scope_count,
            )),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ExportResponse::error(format!("Export failed: {}", e))),
        ),
    }
}

//! # API Request/Response Types
//!
//! JSON bodies of the debugger HTTP API. Collaborator-facing operations
//! answer with an explicit `success` flag and an optional `error`.

use maadbg_core::{DropReason, DropRecord, Outcome, ScopeSnapshot, TraceMetrics};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Trace status: metrics plus store bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub revision: u64,
    #[serde(flatten)]
    pub metrics: TraceMetrics,
    /// Entries currently in the drop log.
    pub dropped: usize,
}

// =============================================================================
// WAIT QUERY
// =============================================================================

/// Query of `GET /trace/wait`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaitQuery {
    /// Return as soon as the revision is greater than this.
    #[serde(default)]
    pub after: u64,
    /// Upper bound on the wait, in milliseconds.
    pub timeout_ms: Option<u64>,
}

// =============================================================================
// NOTIFY
// =============================================================================

/// Result of one notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyResponse {
    /// True when the notification changed the trace.
    pub success: bool,
    pub outcome: Option<Outcome>,
    /// Drop reason, from the normalizer or the reducer.
    pub reason: Option<DropReason>,
    pub error: Option<String>,
}

impl NotifyResponse {
    pub fn applied(outcome: Outcome) -> Self {
        Self {
            success: !outcome.is_dropped(),
            outcome: Some(outcome),
            reason: outcome.drop_reason(),
            error: outcome
                .drop_reason()
                .map(|reason| format!("Dropped: {}", reason)),
        }
    }

    pub fn rejected(reason: DropReason) -> Self {
        Self {
            success: false,
            outcome: None,
            reason: Some(reason),
            error: Some(format!("Rejected: {}", reason)),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            outcome: None,
            reason: None,
            error: Some(msg.into()),
        }
    }
}

/// Result of a notification batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResponse {
    pub success: bool,
    /// Notifications that changed the trace.
    pub applied: usize,
    /// Notifications the reducer dropped.
    pub dropped: usize,
    /// Notifications the normalizer rejected.
    pub rejected: usize,
    pub error: Option<String>,
}

impl BatchResponse {
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(msg.into()),
            ..Self::default()
        }
    }
}

// =============================================================================
// RESET
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub success: bool,
    pub revision: Option<u64>,
    pub error: Option<String>,
}

impl ResetResponse {
    pub fn success(revision: u64) -> Self {
        Self {
            success: true,
            revision: Some(revision),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            revision: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// RECOGNITION LOOKUP
// =============================================================================

/// A recognition looked up by its engine id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionResponse {
    pub success: bool,
    pub recognition: Option<ScopeSnapshot>,
    pub error: Option<String>,
}

impl RecognitionResponse {
    pub fn found(recognition: ScopeSnapshot) -> Self {
        Self {
            success: true,
            recognition: Some(recognition),
            error: None,
        }
    }

    pub fn not_found(reco_id: i64) -> Self {
        Self {
            success: false,
            recognition: None,
            error: Some(format!("Recognition {} not found", reco_id)),
        }
    }
}

// =============================================================================
// DROPS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropsResponse {
    pub drops: Vec<DropRecord>,
}

// =============================================================================
// EXPORT RESPONSE
// =============================================================================

/// Canonical snapshot export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    pub data: Option<String>, // Base64 encoded
    pub checksum: Option<u64>,
    /// BLAKE3 digest of the exported bytes, hex encoded.
    pub digest: Option<String>,
    pub scope_count: Option<u64>,
    pub error: Option<String>,
}

impl ExportResponse {
    pub fn success(data: &[u8], checksum: u64, digest: String, scope_count: u64) -> Self {
        Self {
            success: true,
            data: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                data,
            )),
            checksum: Some(checksum),
            digest: Some(digest),
            scope_count: Some(scope_count),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            checksum: None,
            digest: None,
            scope_count: None,
            error: Some(msg.into()),
        }
    }
}

//! # Export Module
//!
//! Two views of a trace leave the engine:
//!
//! - [`TraceSnapshot`]: the full recursive tree, for renderers and
//!   diagnostics (JSON).
//! - The canonical snapshot: a bit-exact `postcard` encoding of the arena,
//!   for saving a run explicitly and inspecting it later.
//!
//! Canonical layout:
//! ```text
//! [header_len: u32 LE] [CanonicalHeader (postcard)] [Trace (postcard)]
//! ```

use crate::primitives::{
    MAX_IMPORT_SCOPE_COUNT, MAX_SNAPSHOT_SIZE, MAX_TRACE_DEPTH, SNAPSHOT_MAGIC, SNAPSHOT_VERSION,
};
use crate::trace::{Scope, Trace};
use crate::{DebuggerError, ScopeId, ScopeKind, Status};
use serde::{Deserialize, Serialize};

// =============================================================================
// RECURSIVE SNAPSHOT
// =============================================================================

/// One scope and everything it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSnapshot {
    pub scope: ScopeId,
    pub kind: ScopeKind,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Engine-side id: task, node, recognition or action id by kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reco: Vec<ScopeSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Box<ScopeSnapshot>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reco_detail: Option<Box<ScopeSnapshot>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ScopeSnapshot>,
}

impl ScopeSnapshot {
    /// Capture the subtree rooted at `id`.
    ///
    /// At most [`MAX_TRACE_DEPTH`] levels below `id` are captured; deeper
    /// scopes are left out.
    #[must_use]
    pub fn capture(trace: &Trace, id: ScopeId) -> Option<Self> {
        Self::capture_within(trace, id, MAX_TRACE_DEPTH)
    }

    fn capture_within(trace: &Trace, id: ScopeId, levels: usize) -> Option<Self> {
        trace.scope(id).map(|scope| Self::from_scope(trace, scope, levels))
    }

    fn from_scope(trace: &Trace, scope: &Scope, levels: usize) -> Self {
        let below = |id: ScopeId| -> Option<Self> {
            levels
                .checked_sub(1)
                .and_then(|levels| Self::capture_within(trace, id, levels))
        };
        let capture_all =
            |ids: &[ScopeId]| -> Vec<Self> { ids.iter().filter_map(|id| below(*id)).collect() };
        let payload = scope.payload();

        Self {
            scope: scope.id(),
            kind: scope.kind(),
            status: scope.status(),
            name: payload.name.clone(),
            engine_id: payload.id,
            entry: payload.entry.clone(),
            uuid: payload.uuid.clone(),
            next_list: payload.next_list.clone(),
            reco: capture_all(scope.reco()),
            action: scope.action().and_then(below).map(Box::new),
            reco_detail: scope.reco_detail().and_then(below).map(Box::new),
            children: capture_all(scope.children()),
        }
    }

    /// Number of scopes in this subtree, itself included.
    #[must_use]
    pub fn size(&self) -> usize {
        1 + self.reco.iter().map(Self::size).sum::<usize>()
            + self.action.as_deref().map_or(0, Self::size)
            + self.reco_detail.as_deref().map_or(0, Self::size)
            + self.children.iter().map(Self::size).sum::<usize>()
    }
}

/// The whole trace as a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSnapshot {
    /// Store revision the snapshot was taken at.
    pub revision: u64,
    pub depth: usize,
    pub tasks: Vec<ScopeSnapshot>,
}

impl TraceSnapshot {
    #[must_use]
    pub fn capture(trace: &Trace, revision: u64) -> Self {
        Self {
            revision,
            depth: trace.depth(),
            tasks: trace
                .tasks()
                .iter()
                .filter_map(|id| ScopeSnapshot::capture(trace, *id))
                .collect(),
        }
    }

    /// Total number of scopes.
    #[must_use]
    pub fn scope_count(&self) -> usize {
        self.tasks.iter().map(ScopeSnapshot::size).sum()
    }
}

// =============================================================================
// CANONICAL HEADER
// =============================================================================

/// Header of a canonical snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalHeader {
    /// Magic bytes to identify the format.
    pub magic: [u8; 4],

    /// Format version for compatibility.
    pub version: u8,

    /// Number of scopes in the arena.
    pub scope_count: u64,

    /// Number of root tasks.
    pub task_count: u64,

    /// Checksum of the data section.
    pub checksum: u64,
}

impl CanonicalHeader {
    #[must_use]
    pub fn new(scope_count: u64, task_count: u64, checksum: u64) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            scope_count,
            task_count,
            checksum,
        }
    }

    /// Validate magic and version.
    ///
    /// Error messages stay generic on purpose.
    pub fn validate(&self) -> Result<(), DebuggerError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DebuggerError::Deserialization(
                "Invalid file format".to_string(),
            ));
        }
        if self.version != SNAPSHOT_VERSION {
            return Err(DebuggerError::Deserialization(
                "Unsupported file version".to_string(),
            ));
        }
        Ok(())
    }
}

/// Deterministic XOR-rotate checksum of a data section.
///
/// Detects accidental corruption only; it is not a cryptographic hash.
/// Enable the `crypto-hash` feature for a BLAKE3 digest.
#[must_use]
pub fn canonical_checksum(data: &[u8]) -> u64 {
    data.iter().enumerate().fold(0u64, |hash, (pos, byte)| {
        hash.rotate_left(7) ^ u64::from(*byte).rotate_left((pos % 64) as u32)
    })
}

// =============================================================================
// EXPORT / IMPORT
// =============================================================================

/// Export a trace to the canonical postcard format.
pub fn export_canonical(trace: &Trace) -> Result<Vec<u8>, DebuggerError> {
    let data_bytes = postcard::to_allocvec(trace)
        .map_err(|e| DebuggerError::Serialization(format!("Data: {}", e)))?;

    let header = CanonicalHeader::new(
        trace.len() as u64,
        trace.tasks().len() as u64,
        canonical_checksum(&data_bytes),
    );
    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| DebuggerError::Serialization(format!("Header: {}", e)))?;

    let mut result = Vec::with_capacity(4 + header_bytes.len() + data_bytes.len());
    result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&data_bytes);

    Ok(result)
}

/// Read only the header of a canonical snapshot.
pub fn read_canonical_header(data: &[u8]) -> Result<CanonicalHeader, DebuggerError> {
    let (header, _) = split_canonical(data)?;
    Ok(header)
}

/// Import a trace from the canonical postcard format.
///
/// Checks, in order: size limit, header, scope count limit, checksum,
/// decoded counts, and the forest structure of the arena.
pub fn import_canonical(data: &[u8]) -> Result<Trace, DebuggerError> {
    let (header, body) = split_canonical(data)?;

    if header.scope_count > MAX_IMPORT_SCOPE_COUNT {
        return Err(DebuggerError::InvalidSnapshot(format!(
            "Scope count {} exceeds maximum allowed {}",
            header.scope_count, MAX_IMPORT_SCOPE_COUNT
        )));
    }

    let computed = canonical_checksum(body);
    if computed != header.checksum {
        return Err(DebuggerError::InvalidSnapshot(format!(
            "Checksum mismatch: expected {}, got {}",
            header.checksum, computed
        )));
    }

    let trace: Trace = postcard::from_bytes(body)
        .map_err(|e| DebuggerError::Deserialization(format!("Data: {}", e)))?;

    if trace.len() as u64 != header.scope_count {
        return Err(DebuggerError::InvalidSnapshot(
            "Scope count mismatch".to_string(),
        ));
    }
    if trace.tasks().len() as u64 != header.task_count {
        return Err(DebuggerError::InvalidSnapshot(
            "Task count mismatch".to_string(),
        ));
    }
    trace.validate().map_err(DebuggerError::InvalidSnapshot)?;

    Ok(trace)
}

fn split_canonical(data: &[u8]) -> Result<(CanonicalHeader, &[u8]), DebuggerError> {
    if data.len() > MAX_SNAPSHOT_SIZE {
        return Err(DebuggerError::InvalidSnapshot(format!(
            "Snapshot of {} bytes exceeds maximum allowed {}",
            data.len(),
            MAX_SNAPSHOT_SIZE
        )));
    }

    let (len_bytes, rest) = data
        .split_first_chunk::<4>()
        .ok_or_else(|| DebuggerError::Deserialization("Data too short".to_string()))?;
    let header_len = u32::from_le_bytes(*len_bytes) as usize;

    if rest.len() < header_len {
        return Err(DebuggerError::Deserialization(
            "Data too short for header".to_string(),
        ));
    }
    let (header_bytes, body) = rest.split_at(header_len);

    let header: CanonicalHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| DebuggerError::Deserialization(format!("Header: {}", e)))?;
    header.validate()?;

    Ok((header, body))
}

/// BLAKE3 digest of exported bytes, hex encoded.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn snapshot_digest(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================

//! # Core Type Definitions
//!
//! This module contains the vocabulary shared by every part of the trace engine:
//! - Arena identifiers (`ScopeId`)
//! - Scope and message classification (`ScopeKind`, `Phase`, `Status`)
//! - The drop taxonomy (`DropReason`)
//! - Error types (`DebuggerError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer identifiers only
//! - Implement `Ord` where they key a `BTreeMap`
//! - Are `Copy` when they are plain tags

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// ARENA IDENTIFIERS
// =============================================================================

/// Index of a scope inside the trace arena.
///
/// Ids are assigned in creation order and never reused until the whole
/// trace is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

impl ScopeId {
    /// Position of this scope in the arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// SCOPE KIND
// =============================================================================

/// Kind of a trace scope, and equally the kind of a notification.
///
/// The set is closed: every notification the engine emits about a run maps
/// onto exactly one of these, and each scope is opened by a `Starting`
/// notification of its own kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// One task run, root of a trace branch.
    Task,
    /// A named pipeline step (recognition phase + action phase).
    PipelineNode,
    /// A recognition invoked as a standalone node.
    RecognitionNode,
    /// An action invoked as a standalone node.
    ActionNode,
    /// The candidate list evaluated during a recognition phase.
    NextList,
    /// A single recognition attempt.
    Recognition,
    /// A single action execution.
    Action,
}

impl ScopeKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Task,
        Self::PipelineNode,
        Self::RecognitionNode,
        Self::ActionNode,
        Self::NextList,
        Self::Recognition,
        Self::Action,
    ];

    /// Wire name used by the engine (`PipelineNode`, `NextList`, ...).
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Task => "Task",
            Self::PipelineNode => "PipelineNode",
            Self::RecognitionNode => "RecognitionNode",
            Self::ActionNode => "ActionNode",
            Self::NextList => "NextList",
            Self::Recognition => "Recognition",
            Self::Action => "Action",
        }
    }

    /// Parse a wire name. Returns `None` for anything outside the closed set.
    #[must_use]
    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.wire_name() == name)
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// =============================================================================
// PHASE & STATUS
// =============================================================================

/// Lifecycle phase carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Starting,
    Succeeded,
    Failed,
}

impl Phase {
    /// Parse a wire phase (`Starting`, `Succeeded`, `Failed`).
    #[must_use]
    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "Starting" => Some(Self::Starting),
            "Succeeded" => Some(Self::Succeeded),
            "Failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Wire name of this phase.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Starting => "Starting",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        }
    }

    /// Status a scope takes when a notification in this phase closes it.
    ///
    /// `None` for `Starting`, which never closes anything.
    #[must_use]
    pub const fn terminal_status(self) -> Option<Status> {
        match self {
            Self::Starting => None,
            Self::Succeeded => Some(Status::Succeeded),
            Self::Failed => Some(Status::Failed),
        }
    }
}

/// Status of a scope.
///
/// Monotonic: `Running` transitions at most once to a terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Running,
    Succeeded,
    Failed,
}

impl Status {
    /// Whether the scope has left `Running`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        })
    }
}

// =============================================================================
// DROP TAXONOMY
// =============================================================================

/// Why a notification did not change the trace.
///
/// Drops are never errors: they are logged, recorded in the store's drop log
/// and processing continues with the next notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// A non-task notification arrived while no task is running.
    NoActiveTask,
    /// Walking down `depth - 1` levels found no open scope.
    TraceExhausted,
    /// The resolved tracker is not of the kind the notification requires.
    StructuralMismatch,
    /// The notification name is outside the closed kind set.
    UnknownMessageKind,
    /// The notification payload could not be decoded.
    MalformedNotification,
    /// A terminal notification targeted a scope that already finished.
    AlreadyTerminal,
    /// Opening the scope would nest deeper than `MAX_TRACE_DEPTH`.
    DepthLimitExceeded,
}

impl DropReason {
    /// Stable snake_case label, used in logs and API bodies.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NoActiveTask => "no_active_task",
            Self::TraceExhausted => "trace_exhausted",
            Self::StructuralMismatch => "structural_mismatch",
            Self::UnknownMessageKind => "unknown_message_kind",
            Self::MalformedNotification => "malformed_notification",
            Self::AlreadyTerminal => "already_terminal",
            Self::DepthLimitExceeded => "depth_limit_exceeded",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors for the fallible operations around the trace engine.
///
/// The reducer and `TraceStore::dispatch` never return these; they absorb
/// bad input as drops. Export, import, configuration and channel plumbing do.
#[derive(Debug, Error)]
pub enum DebuggerError {
    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// A snapshot decoded but does not describe a valid trace forest.
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The single-writer ingest loop is no longer running.
    #[error("Ingest channel closed")]
    ChannelClosed,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_roundtrip_for_every_kind() {
        for kind in ScopeKind::ALL {
            assert_eq!(ScopeKind::from_wire_name(kind.wire_name()), Some(kind));
        }
        assert_eq!(ScopeKind::from_wire_name("Debug"), None);
    }

    #[test]
    fn phase_terminal_status() {
        assert_eq!(Phase::Starting.terminal_status(), None);
        assert_eq!(Phase::Succeeded.terminal_status(), Some(Status::Succeeded));
        assert_eq!(Phase::Failed.terminal_status(), Some(Status::Failed));
    }

    #[test]
    fn status_terminality() {
        assert!(!Status::Running.is_terminal());
        assert!(Status::Succeeded.is_terminal());
        assert!(Status::Failed.is_terminal());
        assert_eq!(Status::default(), Status::Running);
    }

    #[test]
    fn drop_reason_labels_are_snake_case() {
        assert_eq!(DropReason::TraceExhausted.to_string(), "trace_exhausted");
        assert_eq!(DropReason::NoActiveTask.label(), "no_active_task");
        assert_eq!(DropReason::DepthLimitExceeded.label(), "depth_limit_exceeded");
    }

    #[test]
    fn scope_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ScopeKind::RecognitionNode).expect("serialize");
        assert_eq!(json, "\"recognition_node\"");
    }
}

//! # maadbg-core
//!
//! The execution-trace engine of the pipeline debugger - THE LOGIC.
//!
//! An automation engine reports a flat, interleaved stream of lifecycle
//! notifications while it runs a task. This crate folds that stream, one
//! notification at a time, back into the nested execution trace it
//! describes, so a renderer can draw it live and a user can drill into any
//! recognition or action afterwards.
//!
//! ## Pipeline
//!
//! ```text
//! RawNotification → Normalizer → Message → TraceStore::dispatch
//!                                             └─ Reducer (+ NestedRecognitionIndex) → Trace
//!                                             └─ subscribers
//! ```
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: NO async, NO network dependencies
//! - No global trace: every `TraceStore` is constructed and owned explicitly
//! - Best effort: bad input is dropped and logged, never raised

// =============================================================================
// MODULES
// =============================================================================

pub mod export;
pub mod message;
pub mod metrics;
pub mod nested;
pub mod normalizer;
pub mod primitives;
pub mod reducer;
pub mod store;
pub mod trace;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use message::Message;
pub use types::{DebuggerError, DropReason, Phase, ScopeId, ScopeKind, Status};

// =============================================================================
// RE-EXPORTS: Trace Engine
// =============================================================================

pub use nested::NestedRecognitionIndex;
pub use normalizer::{Normalizer, RawNotification};
pub use reducer::{Outcome, Reducer};
pub use store::{
    DropRecord, StoreEvent, Subscriber, SubscriberError, Subscription, TraceStore,
};
pub use trace::{Scope, Trace};

// =============================================================================
// RE-EXPORTS: Export & Metrics
// =============================================================================

#[cfg(feature = "crypto-hash")]
pub use export::snapshot_digest;
pub use export::{
    CanonicalHeader, ScopeSnapshot, TraceSnapshot, canonical_checksum, export_canonical,
    import_canonical, read_canonical_header,
};
pub use metrics::{TraceMetrics, task_scope_count};

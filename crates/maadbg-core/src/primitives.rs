//! # Primitives
//!
//! Hardcoded runtime constants for the trace engine.
//!
//! These bound every input the engine accepts so that a misbehaving
//! notification source cannot exhaust memory, and fix the binary snapshot
//! format identifiers.

/// Magic bytes for the canonical trace snapshot.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"MDBG";

/// Current canonical snapshot format version.
///
/// Increment this when making breaking changes to the snapshot layout.
pub const SNAPSHOT_VERSION: u8 = 1;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length, in bytes, of a node, entry or recognition name.
///
/// Longer names make the notification malformed.
pub const MAX_NAME_LENGTH: usize = 1024;

/// Maximum number of candidates in a single next list.
pub const MAX_NEXT_LIST_LENGTH: usize = 1024;

/// Maximum number of notifications accepted in one batch request.
pub const MAX_BATCH_LENGTH: usize = 10_000;

/// Maximum number of scopes open below a task at once.
///
/// A `Starting` notification that would open a scope deeper than this is
/// dropped, and imported snapshots may not nest deeper either. At this
/// depth the JSON view of a trace nests fewer than 128 levels.
pub const MAX_TRACE_DEPTH: usize = 60;

// =============================================================================
// STORE LIMITS
// =============================================================================

/// Number of dropped-message records the store keeps.
///
/// Older records are discarded first.
pub const MAX_DROP_RECORDS: usize = 100;

// =============================================================================
// IMPORT LIMITS
// =============================================================================

/// Maximum number of scopes accepted when importing a snapshot.
pub const MAX_IMPORT_SCOPE_COUNT: u64 = 2_000_000;

/// Maximum snapshot size accepted for import (256 MB).
pub const MAX_SNAPSHOT_SIZE: usize = 256 * 1024 * 1024;

//! # CLI Command Implementations

use crate::api;
use crate::config::DebuggerConfig;
use maadbg_core::{
    DebuggerError, Normalizer, RawNotification, ScopeSnapshot, TraceMetrics, TraceSnapshot,
    TraceStore, export_canonical, import_canonical,
    primitives::{MAX_BATCH_LENGTH, MAX_TRACE_DEPTH},
    read_canonical_header, snapshot_digest,
};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a notification log (100 MB).
const MAX_LOG_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum size of a canonical snapshot file (256 MB).
const MAX_SNAPSHOT_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), DebuggerError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| DebuggerError::Io(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(DebuggerError::Io(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path: symlinks and `..` resolved, must be a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, DebuggerError> {
    let canonical = path.canonicalize().map_err(|e| {
        DebuggerError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(DebuggerError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path: the parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, DebuggerError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        DebuggerError::Io(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(DebuggerError::Io(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| DebuggerError::Io("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn read_input(path: &Path, max_size: u64) -> Result<Vec<u8>, DebuggerError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, max_size)?;
    std::fs::read(&validated).map_err(|e| DebuggerError::Io(format!("Read file: {}", e)))
}

fn write_output(path: &Path, data: &[u8]) -> Result<PathBuf, DebuggerError> {
    let validated = validate_output_path(path)?;
    std::fs::write(&validated, data)
        .map_err(|e| DebuggerError::Io(format!("Write file: {}", e)))?;
    Ok(validated)
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String, DebuggerError> {
    serde_json::to_string_pretty(value).map_err(|e| DebuggerError::Serialization(e.to_string()))
}

// =============================================================================
// NOTIFICATION LOGS
// =============================================================================

/// Parse a recorded notification log.
///
/// Accepts a JSON array of `{msg, details}` objects, or one such object per
/// line (blank lines ignored).
pub fn parse_notification_log(text: &str) -> Result<Vec<RawNotification>, DebuggerError> {
    let notifications: Vec<RawNotification> = if text.trim_start().starts_with('[') {
        serde_json::from_str(text)
            .map_err(|e| DebuggerError::Deserialization(format!("Invalid log: {}", e)))?
    } else {
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line).map_err(|e| {
                    DebuggerError::Deserialization(format!("Invalid log line {}: {}", n + 1, e))
                })
            })
            .collect::<Result<_, _>>()?
    };

    if notifications.len() > MAX_BATCH_LENGTH {
        return Err(DebuggerError::Deserialization(format!(
            "Notification count {} exceeds maximum {}",
            notifications.len(),
            MAX_BATCH_LENGTH
        )));
    }
    Ok(notifications)
}

// =============================================================================
// OUTLINE RENDERING
// =============================================================================

/// Render a trace as an indented outline, one scope per line.
///
/// Scopes nested more than `MAX_TRACE_DEPTH` levels below their task are
/// elided with `...`.
pub fn render_outline(snapshot: &TraceSnapshot) -> String {
    let mut out = String::new();
    for task in &snapshot.tasks {
        render_scope(&mut out, task, 0, None);
    }
    out
}

fn render_scope(out: &mut String, scope: &ScopeSnapshot, indent: usize, role: Option<&str>) {
    out.push_str(&"  ".repeat(indent));
    if let Some(role) = role {
        out.push_str(role);
        out.push_str(": ");
    }
    out.push_str(&format!("{} [{}]", scope.kind, scope.status));
    if let Some(label) = scope.name.as_deref().or(scope.entry.as_deref()) {
        out.push_str(&format!(" {}", label));
    }
    if let Some(id) = scope.engine_id {
        out.push_str(&format!(" #{}", id));
    }
    if !scope.next_list.is_empty() {
        out.push_str(&format!(" -> [{}]", scope.next_list.join(", ")));
    }
    let owns_more = scope.reco_detail.is_some()
        || scope.action.is_some()
        || !scope.reco.is_empty()
        || !scope.children.is_empty();
    if indent >= MAX_TRACE_DEPTH && owns_more {
        out.push_str(" ...\n");
        return;
    }
    out.push('\n');

    if let Some(detail) = scope.reco_detail.as_deref() {
        render_scope(out, detail, indent + 1, Some("detail"));
    }
    for reco in &scope.reco {
        render_scope(out, reco, indent + 1, Some("reco"));
    }
    if let Some(action) = scope.action.as_deref() {
        render_scope(out, action, indent + 1, Some("action"));
    }
    for child in &scope.children {
        render_scope(out, child, indent + 1, None);
    }
}

fn print_metrics(metrics: &TraceMetrics) {
    println!("Tasks:     {}", metrics.tasks);
    println!("Scopes:    {}", metrics.scopes);
    println!(
        "Status:    {} running, {} succeeded, {} failed",
        metrics.running, metrics.succeeded, metrics.failed
    );
    println!("Depth:     {}", metrics.depth);
    println!("Height:    {}", metrics.height);
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: &DebuggerConfig) -> Result<(), DebuggerError> {
    println!("maadbg trace server starting...");
    println!();
    println!("Configuration:");
    println!("  Bind:       {}", config.bind_addr());
    println!(
        "  Auth:       {}",
        if config.api_key.is_some() { "api key" } else { "disabled" }
    );
    println!("  Rate limit: {}/s (reads only)", config.rate_limit);
    println!();
    println!("Endpoints:");
    println!("  POST /notify       - Apply an engine notification");
    println!("  POST /notify/batch - Apply a batch of notifications");
    println!("  POST /reset        - Clear the trace");
    println!("  GET  /trace        - Full trace");
    println!("  GET  /trace/wait   - Long-poll for changes");
    println!("  GET  /status       - Trace metrics");
    println!("  POST /export       - Canonical snapshot");
    println!("  GET  /health       - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(config).await
}

// =============================================================================
// REPLAY COMMAND
// =============================================================================

/// Replay a notification log through a fresh store.
pub fn cmd_replay(
    file: &Path,
    export: Option<&Path>,
    json_out: Option<&Path>,
    json_mode: bool,
) -> Result<(), DebuggerError> {
    tracing::info!("Replaying {:?}", file);

    let contents = read_input(file, MAX_LOG_FILE_SIZE)?;
    let text = String::from_utf8(contents)
        .map_err(|e| DebuggerError::Deserialization(format!("Log is not UTF-8: {}", e)))?;
    let notifications = parse_notification_log(&text)?;

    let store = TraceStore::new();
    let mut rejected = 0usize;
    for raw in &notifications {
        match Normalizer::accept(raw) {
            Some(message) => {
                store.dispatch(&message);
            }
            None => rejected += 1,
        }
    }

    let snapshot = store.snapshot();
    let metrics = store.metrics();
    let dropped = store.drops().len();

    if let Some(path) = export {
        let data = store.read(export_canonical)?;
        let written = write_output(path, &data)?;
        tracing::info!("Exported {} bytes to {:?}", data.len(), written);
    }
    if let Some(path) = json_out {
        let written = write_output(path, to_pretty_json(&snapshot)?.as_bytes())?;
        tracing::info!("Wrote trace JSON to {:?}", written);
    }

    if json_mode {
        let output = serde_json::json!({
            "notifications": notifications.len(),
            "rejected": rejected,
            "dropped": dropped,
            "metrics": metrics,
            "trace": snapshot,
        });
        println!("{}", to_pretty_json(&output)?);
        return Ok(());
    }

    print!("{}", render_outline(&snapshot));
    println!();
    println!("Notifications: {}", notifications.len());
    println!("Rejected:      {}", rejected);
    println!("Dropped:       {}", dropped);
    print_metrics(&metrics);

    Ok(())
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

/// Load a canonical snapshot and print it.
pub fn cmd_inspect(input: &Path, json_mode: bool) -> Result<(), DebuggerError> {
    let data = read_input(input, MAX_SNAPSHOT_FILE_SIZE)?;
    let header = read_canonical_header(&data)?;
    let trace = import_canonical(&data)?;
    let snapshot = TraceSnapshot::capture(&trace, 0);
    let metrics = TraceMetrics::from_trace(&trace);
    let digest = snapshot_digest(&data);

    if json_mode {
        let output = serde_json::json!({
            "version": header.version,
            "checksum": header.checksum,
            "digest": digest,
            "metrics": metrics,
            "trace": snapshot,
        });
        println!("{}", to_pretty_json(&output)?);
        return Ok(());
    }

    println!("Snapshot {:?}", input);
    println!("Version:   {}", header.version);
    println!("Checksum:  {}", header.checksum);
    println!("BLAKE3:    {}", digest);
    print_metrics(&metrics);
    println!();
    print!("{}", render_outline(&snapshot));

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

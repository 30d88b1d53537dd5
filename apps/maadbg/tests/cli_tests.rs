//! Offline command tests: replay, inspect and config files.

#![allow(clippy::unwrap_used, clippy::panic)]

use maadbg::cli::{cmd_inspect, cmd_replay};
use maadbg::config::{DebuggerConfig, LogFormat};
use maadbg_core::{TraceSnapshot, import_canonical, read_canonical_header};
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

const LOG: &str = r#"
{"msg":"Tasker.Task.Starting","details":{"task_id":1,"entry":"Main"}}
{"msg":"Node.PipelineNode.Starting","details":{"task_id":1,"node_id":1,"name":"A"}}
{"msg":"Node.Action.Starting","details":{"task_id":1,"action_id":5,"name":"A"}}
{"msg":"Node.Action.Succeeded","details":{"task_id":1,"action_id":5,"name":"A"}}
{"msg":"Node.PipelineNode.Succeeded","details":{"task_id":1,"node_id":1,"name":"A"}}
{"msg":"Tasker.Task.Succeeded","details":{"task_id":1,"entry":"Main"}}
"#;

fn write_log(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_replay_writes_snapshot_and_json() {
    let log = write_log(LOG);
    let dir = TempDir::new().unwrap();
    let snapshot_path = dir.path().join("run.mdbg");
    let json_path = dir.path().join("run.json");

    cmd_replay(log.path(), Some(&snapshot_path), Some(&json_path), true).unwrap();

    let data = std::fs::read(&snapshot_path).unwrap();
    let header = read_canonical_header(&data).unwrap();
    assert_eq!(header.task_count, 1);
    assert_eq!(header.scope_count, 3);

    let trace = import_canonical(&data).unwrap();
    assert_eq!(trace.depth(), 0);

    let json: TraceSnapshot =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(json.tasks.len(), 1);
    assert!(json.tasks[0].children[0].action.is_some());
}

#[test]
fn test_replay_accepts_json_array() {
    let lines: Vec<&str> = LOG.lines().filter(|l| !l.trim().is_empty()).collect();
    let log = write_log(&format!("[{}]", lines.join(",")));

    assert!(cmd_replay(log.path(), None, None, true).is_ok());
}

#[test]
fn test_replay_rejects_garbage() {
    let log = write_log("not a log");
    assert!(cmd_replay(log.path(), None, None, true).is_err());
}

#[test]
fn test_replay_missing_file() {
    let dir = TempDir::new().unwrap();
    assert!(cmd_replay(&dir.path().join("absent.jsonl"), None, None, true).is_err());
}

#[test]
fn test_inspect_exported_snapshot() {
    let log = write_log(LOG);
    let dir = TempDir::new().unwrap();
    let snapshot_path = dir.path().join("run.mdbg");
    cmd_replay(log.path(), Some(&snapshot_path), None, true).unwrap();

    assert!(cmd_inspect(&snapshot_path, true).is_ok());
    assert!(cmd_inspect(&snapshot_path, false).is_ok());
}

#[test]
fn test_inspect_rejects_corrupt_snapshot() {
    let file = write_log("MDBG but not really");
    assert!(cmd_inspect(file.path(), false).is_err());
}

#[test]
fn test_config_file_loads() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "host = \"0.0.0.0\"\nport = 9911\nlog_format = \"json\"").unwrap();

    let config = DebuggerConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.log_format, LogFormat::Json);
}

#[test]
fn test_config_rejects_unknown_keys() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "prot = 9911").unwrap();

    assert!(DebuggerConfig::load(Some(file.path())).is_err());
}

#[test]
fn test_config_missing_explicit_file() {
    let dir = TempDir::new().unwrap();
    assert!(DebuggerConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
}

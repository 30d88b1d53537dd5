//! # maadbg
//!
//! Live pipeline debugger front-end: the single-writer ingest loop, the
//! HTTP API renderers poll, and the CLI. The trace engine itself lives in
//! `maadbg-core`.

pub mod api;
pub mod cli;
pub mod config;
pub mod ingest;

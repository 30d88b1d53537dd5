//! # Configuration Module
//!
//! Server and logging settings, resolved in three layers:
//!
//! 1. `maadbg.toml` (or the file passed with `--config`), if present
//! 2. Environment variables (`MAADBG_*`)
//! 3. CLI flags
//!
//! ## Environment Variables
//!
//! - `MAADBG_HOST`, `MAADBG_PORT`: bind address
//! - `MAADBG_LOG_FORMAT`: `text` or `json`
//! - `MAADBG_API_KEY`: if set, requires Bearer token authentication
//! - `MAADBG_RATE_LIMIT`: read requests per second (0 disables)
//! - `MAADBG_CORS_ORIGINS`: comma-separated origins, or `*` for all

use maadbg_core::DebuggerError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default request body limit (2 MB).
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "maadbg.toml";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Result<Self, DebuggerError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(DebuggerError::Config(format!(
                "Unknown log format '{}' (expected text or json)",
                other
            ))),
        }
    }
}

/// Resolved debugger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebuggerConfig {
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
    /// Bearer key required on every route except `/health`.
    pub api_key: Option<String>,
    /// Read/export requests per second; 0 disables limiting.
    pub rate_limit: u32,
    /// Allowed CORS origins; empty means localhost only, `*` means any.
    pub cors_origins: Vec<String>,
    pub body_limit: usize,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            log_format: LogFormat::Text,
            api_key: None,
            rate_limit: 100,
            cors_origins: Vec::new(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl DebuggerConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, DebuggerError> {
        toml::from_str(text).map_err(|e| DebuggerError::Config(format!("Invalid config: {}", e)))
    }

    /// Load the file layer, then apply the environment.
    ///
    /// An explicit path must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, DebuggerError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, DebuggerError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DebuggerError::Io(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `MAADBG_*` overrides from an arbitrary lookup.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), DebuggerError> {
        if let Some(host) = lookup("MAADBG_HOST").filter(|h| !h.is_empty()) {
            self.host = host;
        }
        if let Some(port) = lookup("MAADBG_PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| DebuggerError::Config(format!("Invalid MAADBG_PORT '{}'", port)))?;
        }
        if let Some(format) = lookup("MAADBG_LOG_FORMAT") {
            self.log_format = LogFormat::parse(&format)?;
        }
        if let Some(key) = lookup("MAADBG_API_KEY") {
            self.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(rate) = lookup("MAADBG_RATE_LIMIT") {
            self.rate_limit = rate.trim().parse().map_err(|_| {
                DebuggerError::Config(format!("Invalid MAADBG_RATE_LIMIT '{}'", rate))
            })?;
        }
        if let Some(origins) = lookup("MAADBG_CORS_ORIGINS") {
            self.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    /// Apply CLI overrides.
    pub fn apply_cli(&mut self, host: Option<String>, port: Option<u16>) {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
    }

    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// TESTS
// =============================================================================

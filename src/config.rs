//! Gateway configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid:
//!
//! ```toml
//! max_timeout_ms = 60000
//! allowed_commands = ["git", "cargo", "ls"]
//! strip_dangerous_env = true
//! ```

use crate::allowlist::default_commands;
use crate::error::SetupError;
use crate::runner::DEFAULT_MAX_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Process-lifetime settings for an `ExecutionGateway`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Upper bound on any single execution, in milliseconds.
    pub max_timeout_ms: u64,

    /// Seed allow-list (basenames).
    pub allowed_commands: Vec<String>,

    /// Remove loader/interpreter injection variables from the merged environment.
    pub strip_dangerous_env: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_timeout_ms: u64::try_from(DEFAULT_MAX_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
            allowed_commands: default_commands(),
            strip_dangerous_env: false,
        }
    }
}

impl GatewayConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self, SetupError> {
        Ok(toml::from_str(s)?)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load config from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SetupError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| SetupError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// The maximum timeout as a `Duration`.
    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }
}

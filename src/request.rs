//! Execution request.

use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// A proposed command execution.
///
/// This struct represents what the caller wants to run. It is validated by
/// `ExecutionGateway::execute()` before any process is started.
///
/// Deserializes from the loosely-typed payload an outer tool layer receives:
///
/// ```json
/// { "command": "git", "args": ["status"], "cwd": "repo", "env": {"GIT_PAGER": "cat"}, "timeout_ms": 5000 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExecutionRequest {
    /// Command to run. Its basename must be in the allow-list.
    ///
    /// Passed to the OS as-is, so a bare name is looked up on the merged
    /// environment's `PATH`.
    pub command: String,

    /// Arguments (not including the command itself).
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory, relative to the sandbox root or absolute.
    ///
    /// If `None`, the sandbox root is used.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Environment overrides, applied on top of the gateway's base environment.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Requested timeout. Clamped to the gateway's maximum.
    #[serde(default, rename = "timeout_ms", deserialize_with = "millis")]
    pub timeout: Option<Duration>,
}

impl ExecutionRequest {
    /// Create a new request with minimal arguments.
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set environment overrides.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Add a single environment override.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the requested timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

fn millis<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}

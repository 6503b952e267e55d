//! Error types for exec_gateway.
//!
//! This module defines three error categories:
//! - [`Violation`]: Request rejected during validation - no process is spawned
//! - [`ExecError`]: Execution failures - the request was valid but running it failed
//! - [`SetupError`]: The gateway itself could not be constructed (startup)
//!
//! `Violation` and `ExecError` never escape `ExecutionGateway::execute`; they are
//! folded into an [`ExecutionResult`](crate::ExecutionResult) together with an
//! [`ErrorKind`] so callers can branch without matching on message text.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Coarse failure classification carried by every failed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Empty command, or command not in the allow-list.
    Validation,
    /// Working directory resolves outside the sandbox root.
    SandboxViolation,
    /// Working directory does not exist.
    NotFound,
    /// The operating system could not start the process.
    Spawn,
    /// The process outlived its timeout and was killed.
    Timeout,
    /// The caller cancelled the execution and the process was killed.
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::SandboxViolation => write!(f, "sandbox_violation"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Spawn => write!(f, "spawn"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Request rejected before any process was spawned.
///
/// All error messages are safe to log (no environment values included).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Violation {
    // Command errors
    /// Command string is empty
    #[error("no command specified")]
    EmptyCommand,

    /// Command basename is not in the allow-list
    #[error("command not allowed: {command} (allowed commands: {})", .allowed.join(", "))]
    CommandNotAllowed {
        command: String,
        allowed: Vec<String>,
    },

    // Working directory errors
    /// Working directory resolves outside the sandbox root
    #[error("working directory {path} is outside the sandbox root {root}")]
    SandboxViolation { path: String, root: String },

    /// Working directory does not exist
    #[error("working directory not found: {path}")]
    CwdNotFound { path: String },

    /// Working directory exists but cannot be used
    #[error("working directory unusable: {path} ({reason})")]
    CwdInvalid { path: String, reason: String },
}

impl Violation {
    /// Classify this violation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Violation::EmptyCommand | Violation::CommandNotAllowed { .. } => ErrorKind::Validation,
            Violation::SandboxViolation { .. } => ErrorKind::SandboxViolation,
            Violation::CwdNotFound { .. } | Violation::CwdInvalid { .. } => ErrorKind::NotFound,
        }
    }
}

/// Execution failure after validation succeeded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// Process exceeded timeout and was killed
    #[error("process timed out after {elapsed:?} (limit: {limit:?})")]
    Timeout { limit: Duration, elapsed: Duration },

    /// Failed to spawn the process
    #[error("failed to start process {command}: {reason}")]
    SpawnFailed { command: String, reason: String },

    /// Execution was cancelled by the caller and the process was killed
    #[error("process cancelled after {elapsed:?}")]
    Cancelled { elapsed: Duration },
}

impl ExecError {
    /// Classify this execution error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::Timeout { .. } => ErrorKind::Timeout,
            ExecError::SpawnFailed { .. } => ErrorKind::Spawn,
            ExecError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }
}

/// Failure to construct a gateway or load its configuration.
///
/// Unlike the other errors this one is returned as `Err`: a gateway that
/// cannot establish its sandbox root must refuse to start.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Sandbox root does not exist or cannot be resolved
    #[error("sandbox root {path} is unusable: {reason}")]
    BaseDir { path: PathBuf, reason: String },

    /// Sandbox root is not a directory
    #[error("sandbox root is not a directory: {path}")]
    BaseDirNotDirectory { path: PathBuf },

    /// No sandbox root was supplied to the builder
    #[error("sandbox root not configured")]
    BaseDirMissing,

    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file could not be parsed
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

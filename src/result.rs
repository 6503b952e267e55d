//! Execution result.

use crate::error::{ErrorKind, ExecError, Violation};
use serde::Serialize;
use std::time::Duration;

/// Exit code reported for every failure that has no real exit status
/// (rejection, spawn failure, timeout, cancellation).
pub const FAILURE_EXIT_CODE: i32 = 1;

/// Message used when a failed result has neither stderr nor an error.
pub const GENERIC_FAILURE: &str = "command failed";

/// Uniform outcome of one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,

    /// Captured standard error (lossy UTF-8).
    pub stderr: String,

    /// Exit code of the process, or [`FAILURE_EXIT_CODE`].
    pub exit_code: i32,

    /// `true` iff the process exited on its own with code 0.
    pub success: bool,

    /// Human-readable error, set on every failure path except a plain
    /// non-zero exit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Failure classification, `None` when the process ran to completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,

    /// Wall-clock time spent running the process.
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

impl ExecutionResult {
    /// A process that ran to completion with `exit_code`.
    pub fn completed(stdout: &[u8], stderr: &[u8], exit_code: i32, duration: Duration) -> Self {
        Self {
            stdout: String::from_utf8_lossy(stdout).into_owned(),
            stderr: String::from_utf8_lossy(stderr).into_owned(),
            exit_code,
            success: exit_code == 0,
            error: None,
            kind: None,
            duration,
        }
    }

    /// A request rejected before spawning.
    pub fn rejected(violation: &Violation) -> Self {
        Self::failure(violation.kind(), violation.to_string())
    }

    /// A run that failed or was killed, keeping any partial output.
    pub fn aborted(error: &ExecError, stdout: &[u8], stderr: &[u8], duration: Duration) -> Self {
        Self {
            stdout: String::from_utf8_lossy(stdout).into_owned(),
            stderr: String::from_utf8_lossy(stderr).into_owned(),
            duration,
            ..Self::failure(error.kind(), error.to_string())
        }
    }

    fn failure(kind: ErrorKind, message: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: FAILURE_EXIT_CODE,
            success: false,
            error: Some(message),
            kind: Some(kind),
            duration: Duration::ZERO,
        }
    }

    /// True if the process was killed for exceeding its timeout.
    pub fn timed_out(&self) -> bool {
        self.kind == Some(ErrorKind::Timeout)
    }

    /// Failure message: stderr if non-empty, else the error, else a generic
    /// fallback.
    pub fn message(&self) -> String {
        if !self.stderr.trim().is_empty() {
            self.stderr.clone()
        } else if let Some(error) = &self.error {
            error.clone()
        } else {
            format!("{} (exit code {})", GENERIC_FAILURE, self.exit_code)
        }
    }

    /// Render for a request/response tool layer: stdout on success, the
    /// failure message otherwise.
    pub fn into_reply(self) -> Result<String, String> {
        if self.success {
            Ok(self.stdout)
        } else {
            Err(self.message())
        }
    }
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

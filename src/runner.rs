//! Process runner.
//!
//! Spawns one child, drains stdout and stderr while it runs, and races its exit
//! against a deadline and an optional cancellation future. Every outcome is
//! returned as an [`ExecutionResult`]; nothing here returns `Err` or panics on
//! OS failures.

use crate::error::ExecError;
use crate::result::ExecutionResult;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, warn};

/// Default upper bound on a single execution.
pub const DEFAULT_MAX_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to keep reading pipes after the process group was killed.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

const READ_CHUNK: usize = 8192;

/// Runs external programs with a bounded lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessRunner {
    max_timeout: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TIMEOUT)
    }
}

/// How the race between exit, deadline and cancellation ended.
enum Outcome {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
    WaitFailed(io::Error),
}

impl ProcessRunner {
    /// Create a runner that never lets a process live longer than `max_timeout`.
    pub fn new(max_timeout: Duration) -> Self {
        Self { max_timeout }
    }

    /// The configured maximum timeout.
    pub fn max_timeout(&self) -> Duration {
        self.max_timeout
    }

    /// `min(requested, max)`, or the max when nothing was requested.
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Duration {
        requested.map_or(self.max_timeout, |t| t.min(self.max_timeout))
    }

    /// Run `command` to completion or until its timeout expires.
    ///
    /// `env` is the complete environment of the child; nothing is inherited.
    pub async fn run(
        &self,
        command: &str,
        args: &[String],
        cwd: &Path,
        env: &HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> ExecutionResult {
        self.run_until(command, args, cwd, env, timeout, std::future::pending())
            .await
    }

    /// Like [`run`](Self::run), but also kills the process when `cancel`
    /// completes first.
    pub async fn run_until<F>(
        &self,
        command: &str,
        args: &[String],
        cwd: &Path,
        env: &HashMap<String, String>,
        timeout: Option<Duration>,
        cancel: F,
    ) -> ExecutionResult
    where
        F: Future<Output = ()>,
    {
        let limit = self.effective_timeout(timeout);
        let start = Instant::now();

        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(cwd)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut handle = match ProcessHandle::spawn(&mut cmd) {
            Ok(handle) => handle,
            Err(e) => {
                let error = ExecError::SpawnFailed {
                    command: command.to_string(),
                    reason: e.to_string(),
                };
                warn!(%error, "spawn failed");
                return ExecutionResult::aborted(&error, b"", b"", start.elapsed());
            }
        };
        debug!(pid = ?handle.pgid, timeout = ?limit, "process started");

        let outcome = handle.race(limit, cancel).await;
        let elapsed = start.elapsed();

        let error = match outcome {
            Outcome::Exited(status) => {
                let exit_code = exit_code(status);
                debug!(exit_code, ?elapsed, "process exited");
                return ExecutionResult::completed(
                    &handle.stdout_buf,
                    &handle.stderr_buf,
                    exit_code,
                    elapsed,
                );
            }
            Outcome::TimedOut => ExecError::Timeout { limit, elapsed },
            Outcome::Cancelled => ExecError::Cancelled { elapsed },
            Outcome::WaitFailed(e) => ExecError::SpawnFailed {
                command: command.to_string(),
                reason: format!("wait error: {e}"),
            },
        };

        warn!(%error, "killing process group");
        handle.terminate().await;
        ExecutionResult::aborted(&error, &handle.stdout_buf, &handle.stderr_buf, elapsed)
    }
}

/// A live child and everything it has written so far.
///
/// Owned by one `run_until` call and dropped when it returns; `kill_on_drop`
/// covers the case where that future is itself dropped mid-run.
struct ProcessHandle {
    child: Child,
    pgid: Option<i32>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    stdout_buf: Vec<u8>,
    stderr_buf: Vec<u8>,
}

impl ProcessHandle {
    fn spawn(cmd: &mut Command) -> io::Result<Self> {
        let mut child = cmd.spawn()?;
        // process_group(0) makes the child its own group leader.
        let pgid = child.id().and_then(|id| i32::try_from(id).ok());
        Ok(Self {
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            child,
            pgid,
            stdout_buf: Vec::new(),
            stderr_buf: Vec::new(),
        })
    }

    fn drained(&self) -> bool {
        self.stdout.is_none() && self.stderr.is_none()
    }

    /// Drive the child until it exits and both pipes hit EOF, the deadline
    /// passes, or `cancel` resolves.
    async fn race<F>(&mut self, limit: Duration, cancel: F) -> Outcome
    where
        F: Future<Output = ()>,
    {
        let deadline = tokio::time::sleep(limit);
        tokio::pin!(deadline);
        tokio::pin!(cancel);

        let mut out_chunk = [0u8; READ_CHUNK];
        let mut err_chunk = [0u8; READ_CHUNK];
        let mut exited: Option<ExitStatus> = None;

        loop {
            if let Some(status) = exited {
                if self.drained() {
                    return Outcome::Exited(status);
                }
            }

            tokio::select! {
                read = read_pipe(&mut self.stdout, &mut out_chunk), if self.stdout.is_some() => {
                    absorb(read, &out_chunk, &mut self.stdout, &mut self.stdout_buf);
                }
                read = read_pipe(&mut self.stderr, &mut err_chunk), if self.stderr.is_some() => {
                    absorb(read, &err_chunk, &mut self.stderr, &mut self.stderr_buf);
                }
                status = self.child.wait(), if exited.is_none() => match status {
                    Ok(status) => exited = Some(status),
                    Err(e) => return Outcome::WaitFailed(e),
                },
                () = &mut deadline => {
                    return match exited {
                        // Exited in time, but a descendant still holds a pipe open.
                        Some(status) => {
                            warn!("output pipes still open after exit; killing process group");
                            self.kill_group();
                            Outcome::Exited(status)
                        }
                        None => Outcome::TimedOut,
                    };
                }
                () = &mut cancel => {
                    return match exited {
                        Some(status) => {
                            self.kill_group();
                            Outcome::Exited(status)
                        }
                        None => Outcome::Cancelled,
                    };
                }
            }
        }
    }

    /// Kill the whole group, reap the leader and collect what is left in the pipes.
    async fn terminate(&mut self) {
        self.kill_group();
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "start_kill failed");
        }
        if let Err(e) = self.child.wait().await {
            debug!(error = %e, "reaping killed child failed");
        }
        if tokio::time::timeout(DRAIN_GRACE, self.drain()).await.is_err() {
            debug!("pipes not closed after kill; dropping remaining output");
        }
    }

    fn kill_group(&self) {
        let Some(pgid) = self.pgid else {
            return;
        };
        // SAFETY: killpg has no memory-safety preconditions.
        let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        if rc != 0 {
            debug!(pgid, error = %io::Error::last_os_error(), "killpg failed");
        }
    }

    async fn drain(&mut self) {
        let mut chunk = [0u8; READ_CHUNK];
        while self.stdout.is_some() {
            let read = read_pipe(&mut self.stdout, &mut chunk).await;
            absorb(read, &chunk, &mut self.stdout, &mut self.stdout_buf);
        }
        while self.stderr.is_some() {
            let read = read_pipe(&mut self.stderr, &mut chunk).await;
            absorb(read, &chunk, &mut self.stderr, &mut self.stderr_buf);
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: &mut Option<R>, chunk: &mut [u8]) -> io::Result<usize> {
    match pipe {
        Some(pipe) => pipe.read(chunk).await,
        None => Ok(0),
    }
}

/// Append a read to `buf`, closing the pipe on EOF or error.
fn absorb<R>(read: io::Result<usize>, chunk: &[u8], pipe: &mut Option<R>, buf: &mut Vec<u8>) {
    match read {
        Ok(0) => *pipe = None,
        Ok(n) => buf.extend_from_slice(&chunk[..n]),
        Err(e) => {
            debug!(error = %e, "pipe read failed");
            *pipe = None;
        }
    }
}

/// Exit code, or `128 + signal` for a signal-terminated process.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn path_env() -> HashMap<String, String> {
        HashMap::from([(
            "PATH".to_string(),
            std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string()),
        )])
    }

    fn args(a: &[&str]) -> Vec<String> {
        a.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_effective_timeout() {
        let runner = ProcessRunner::new(Duration::from_secs(10));
        assert_eq!(runner.effective_timeout(None), Duration::from_secs(10));
        assert_eq!(
            runner.effective_timeout(Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        assert_eq!(
            runner.effective_timeout(Some(Duration::from_secs(60))),
            Duration::from_secs(10)
        );
    }

    #[tokio::test]
    async fn test_captures_stdout() {
        let runner = ProcessRunner::default();
        let result = runner
            .run("echo", &args(&["hello"]), Path::new("/"), &path_env(), None)
            .await;
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hello\n");
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_captures_stderr_and_exit_code() {
        let runner = ProcessRunner::default();
        let result = runner
            .run(
                "sh",
                &args(&["-c", "echo out; echo err >&2; exit 3"]),
                Path::new("/"),
                &path_env(),
                None,
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert!(result.kind.is_none());
    }

    #[tokio::test]
    async fn test_signal_death_reports_128_plus_signal() {
        let runner = ProcessRunner::default();
        let result = runner
            .run(
                "sh",
                &args(&["-c", "echo dying; kill -9 $$"]),
                Path::new("/"),
                &path_env(),
                None,
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.exit_code, 128 + 9);
        assert!(result.kind.is_none());
        assert!(result.error.is_none());
        assert_eq!(result.stdout, "dying\n");
    }

    #[tokio::test]
    async fn test_timeout_kills() {
        let runner = ProcessRunner::default();
        let start = Instant::now();
        let result = runner
            .run(
                "sh",
                &args(&["-c", "echo started; sleep 5"]),
                Path::new("/"),
                &path_env(),
                Some(Duration::from_millis(500)),
            )
            .await;
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(!result.success);
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.kind, Some(ErrorKind::Timeout));
        assert_eq!(result.stdout, "started\n");
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let runner = ProcessRunner::default();
        let result = runner
            .run(
                "/nonexistent/binary/for-runner",
                &[],
                Path::new("/"),
                &path_env(),
                None,
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.kind, Some(ErrorKind::Spawn));
        assert!(result.error.unwrap().contains("failed to start process"));
        assert!(result.stdout.is_empty());
        assert!(result.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_kills() {
        let runner = ProcessRunner::default();
        let start = Instant::now();
        let result = runner
            .run_until(
                "sleep",
                &args(&["5"]),
                Path::new("/"),
                &path_env(),
                None,
                tokio::time::sleep(Duration::from_millis(200)),
            )
            .await;
        assert!(start.elapsed() < Duration::from_secs(3));
        assert_eq!(result.kind, Some(ErrorKind::Cancelled));
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_env_is_exactly_the_map() {
        let runner = ProcessRunner::default();
        let mut env = path_env();
        env.insert("ONLY_THIS".to_string(), "yes".to_string());
        let result = runner
            .run("env", &[], Path::new("/"), &env, None)
            .await;
        assert!(result.success);
        assert!(result.stdout.contains("ONLY_THIS=yes"));
        assert!(!result.stdout.contains("HOME="));
    }

    #[tokio::test]
    async fn test_runs_in_cwd() {
        let tmp = tempfile::TempDir::new().unwrap();
        let runner = ProcessRunner::default();
        let result = runner
            .run("pwd", &[], tmp.path(), &path_env(), None)
            .await;
        assert!(result.success);
        let expected = std::fs::canonicalize(tmp.path()).unwrap();
        assert_eq!(result.stdout.trim(), expected.to_str().unwrap());
    }

    #[tokio::test]
    async fn test_large_output_on_both_streams() {
        let runner = ProcessRunner::default();
        let script = "i=0; while [ $i -lt 2000 ]; do \
                      echo 0123456789012345678901234567890123456789; \
                      echo 0123456789012345678901234567890123456789 >&2; \
                      i=$((i+1)); done";
        let result = runner
            .run(
                "sh",
                &args(&["-c", script]),
                Path::new("/"),
                &path_env(),
                Some(Duration::from_secs(20)),
            )
            .await;
        assert!(result.success);
        assert_eq!(result.stdout.len(), 2000 * 41);
        assert_eq!(result.stderr.len(), 2000 * 41);
    }
}

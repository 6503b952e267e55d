//! Execution gateway.
//!
//! The main entry point for exec_gateway. `ExecutionGateway` validates each
//! request against the allow-list and the sandbox boundary, merges the
//! environment and hands the command to a [`ProcessRunner`].

use crate::allowlist::{default_commands, CommandAllowList};
use crate::config::GatewayConfig;
use crate::env::{merge_environment, strip_dangerous};
use crate::error::{SetupError, Violation};
use crate::request::ExecutionRequest;
use crate::result::ExecutionResult;
use crate::runner::{ProcessRunner, DEFAULT_MAX_TIMEOUT};
use crate::sandbox::SandboxBoundary;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, field, info, instrument, warn, Span};

/// Validates and runs command requests inside a sandbox root.
///
/// Create using `ExecutionGateway::builder()` or
/// [`ExecutionGateway::from_config`]. The gateway is `Send + Sync`; share it
/// behind an `Arc` to serve concurrent requests.
#[derive(Debug)]
pub struct ExecutionGateway {
    /// Permitted command basenames.
    allowlist: CommandAllowList,

    /// Root every working directory must resolve under.
    sandbox: SandboxBoundary,

    /// Host-supplied environment every child starts from.
    base_env: HashMap<String, String>,

    /// Spawns and bounds the child.
    runner: ProcessRunner,

    /// Strip injection variables after merging.
    strip_dangerous_env: bool,
}

impl ExecutionGateway {
    /// Create a new gateway builder.
    pub fn builder() -> ExecutionGatewayBuilder {
        ExecutionGatewayBuilder::new()
    }

    /// Build a gateway from a loaded config.
    ///
    /// # Errors
    ///
    /// Returns a `SetupError` if `base_dir` is not an existing directory.
    pub fn from_config(
        base_dir: impl Into<PathBuf>,
        base_env: HashMap<String, String>,
        config: &GatewayConfig,
    ) -> Result<Self, SetupError> {
        Self::builder()
            .base_dir(base_dir)
            .base_env(base_env)
            .max_timeout(config.max_timeout())
            .allowed_commands(config.allowed_commands.iter().cloned())
            .strip_dangerous_env(config.strip_dangerous_env)
            .build()
    }

    /// Validate a request without running it.
    ///
    /// Checks, in order: non-empty command, allow-list membership, working
    /// directory containment. Returns the resolved working directory.
    ///
    /// # Errors
    ///
    /// Returns the first `Violation` encountered.
    pub fn validate(&self, request: &ExecutionRequest) -> Result<PathBuf, Violation> {
        if request.command.trim().is_empty() {
            return Err(Violation::EmptyCommand);
        }

        if !self.allowlist.is_allowed(&request.command) {
            return Err(Violation::CommandNotAllowed {
                command: request.command.clone(),
                allowed: self.allowlist.list(),
            });
        }

        self.sandbox.resolve(request.cwd.as_deref())
    }

    /// Validate and run a request.
    ///
    /// Never fails: rejections, spawn failures and timeouts are all reported
    /// in the returned [`ExecutionResult`].
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        self.execute_with_cancel(request, std::future::pending())
            .await
    }

    /// Like [`execute`](Self::execute), but kills the process if `cancel`
    /// completes before it exits.
    #[instrument(name = "execute", skip_all, fields(command = %request.command, cwd = field::Empty))]
    pub async fn execute_with_cancel<F>(&self, request: ExecutionRequest, cancel: F) -> ExecutionResult
    where
        F: Future<Output = ()>,
    {
        let cwd = match self.validate(&request) {
            Ok(cwd) => cwd,
            Err(violation) => {
                warn!(kind = %violation.kind(), %violation, "request rejected");
                return ExecutionResult::rejected(&violation);
            }
        };
        Span::current().record("cwd", field::display(cwd.display()));
        debug!(args = request.args.len(), "request validated");

        let mut env = merge_environment(&self.base_env, &request.env);
        if self.strip_dangerous_env {
            let removed = strip_dangerous(&mut env);
            if removed > 0 {
                debug!(removed, "stripped dangerous environment variables");
            }
        }

        let result = self
            .runner
            .run_until(
                &request.command,
                &request.args,
                &cwd,
                &env,
                request.timeout,
                cancel,
            )
            .await;

        info!(
            exit_code = result.exit_code,
            success = result.success,
            duration_ms = u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            "execution finished"
        );
        result
    }

    /// Report whether `command` (by basename) may run.
    pub fn is_allowed(&self, command: &str) -> bool {
        self.allowlist.is_allowed(command)
    }

    /// Permit a command basename. Idempotent.
    pub fn allow(&self, name: impl Into<String>) {
        let name = name.into();
        info!(command = %name, "command allowed");
        self.allowlist.allow(name);
    }

    /// Revoke a command basename. Idempotent.
    pub fn disallow(&self, name: &str) {
        info!(command = %name, "command disallowed");
        self.allowlist.disallow(name);
    }

    /// Currently allowed commands, in insertion order.
    pub fn allowed_commands(&self) -> Vec<String> {
        self.allowlist.list()
    }

    /// The sandbox boundary.
    pub fn sandbox(&self) -> &SandboxBoundary {
        &self.sandbox
    }

    /// The canonical sandbox root.
    pub fn base_dir(&self) -> &Path {
        self.sandbox.root()
    }

    /// Upper bound applied to every request's timeout.
    pub fn max_timeout(&self) -> Duration {
        self.runner.max_timeout()
    }
}

/// Builder for `ExecutionGateway`.
#[derive(Debug, Clone)]
pub struct ExecutionGatewayBuilder {
    /// Sandbox root (validated at build time).
    base_dir: Option<PathBuf>,

    /// Base environment.
    base_env: HashMap<String, String>,

    /// Seed allow-list.
    commands: Vec<String>,

    /// Maximum timeout.
    max_timeout: Duration,

    /// Environment hardening.
    strip_dangerous_env: bool,
}

impl ExecutionGatewayBuilder {
    /// Create a new builder seeded with the default allow-list.
    pub fn new() -> Self {
        Self {
            base_dir: None,
            base_env: HashMap::new(),
            commands: default_commands(),
            max_timeout: DEFAULT_MAX_TIMEOUT,
            strip_dangerous_env: false,
        }
    }

    /// Set the sandbox root. Must exist when `build()` is called.
    pub fn base_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(path.into());
        self
    }

    /// Set the base environment.
    pub fn base_env(mut self, env: HashMap<String, String>) -> Self {
        self.base_env = env;
        self
    }

    /// Add a single base environment variable.
    pub fn base_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.base_env.insert(key.into(), value.into());
        self
    }

    /// Replace the seed allow-list.
    pub fn allowed_commands<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands = names.into_iter().map(Into::into).collect();
        self
    }

    /// Add one command to the seed allow-list.
    pub fn allow(mut self, name: impl Into<String>) -> Self {
        self.commands.push(name.into());
        self
    }

    /// Set the maximum timeout.
    pub fn max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = timeout;
        self
    }

    /// Strip loader/interpreter injection variables from merged environments.
    pub fn strip_dangerous_env(mut self, strip: bool) -> Self {
        self.strip_dangerous_env = strip;
        self
    }

    /// Build the gateway.
    ///
    /// # Errors
    ///
    /// Returns an error if no base directory was set, or it does not exist or
    /// is not a directory.
    pub fn build(self) -> Result<ExecutionGateway, SetupError> {
        let base_dir = self.base_dir.ok_or(SetupError::BaseDirMissing)?;
        let sandbox = SandboxBoundary::new(&base_dir)?;

        info!(
            root = %sandbox.root().display(),
            commands = self.commands.len(),
            max_timeout = ?self.max_timeout,
            "execution gateway ready"
        );

        Ok(ExecutionGateway {
            allowlist: CommandAllowList::with_commands(self.commands),
            sandbox,
            base_env: self.base_env,
            runner: ProcessRunner::new(self.max_timeout),
            strip_dangerous_env: self.strip_dangerous_env,
        })
    }
}

impl Default for ExecutionGatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

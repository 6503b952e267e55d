//! # exec_gateway
//!
//! Sandboxed command execution for agentic tool hosts.
//!
//! `exec_gateway` accepts a request to run an external program, checks the
//! program against an allow-list, confines its working directory to a sandbox
//! root, merges its environment, runs it with a bounded lifetime and returns a
//! structured result. `execute` never fails: every outcome, including
//! rejection, spawn failure and timeout, is an [`ExecutionResult`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use exec_gateway::{ExecutionGateway, ExecutionRequest};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = ExecutionGateway::builder()
//!     .base_dir("/srv/workspace")
//!     .base_env_var("PATH", "/usr/bin:/bin")
//!     .allowed_commands(["git", "ls", "cargo"])
//!     .max_timeout(Duration::from_secs(60))
//!     .build()?;
//!
//! let request = ExecutionRequest::new("git", ["status", "--short"])
//!     .with_cwd("my-repo")
//!     .with_timeout(Duration::from_secs(10));
//!
//! let result = gateway.execute(request).await;
//! match result.into_reply() {
//!     Ok(stdout) => println!("{stdout}"),
//!     Err(message) => eprintln!("failed: {message}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - **Allow-list by basename**: only listed executables run, matched exactly
//! - **Contained working directory**: compared per path component after
//!   normalization and symlink resolution
//! - **No shell interpretation**: argv-style execution
//! - **Bounded lifetime**: on timeout the child's whole process group is
//!   killed with SIGKILL and partial output is returned
//!
//! ## Platform Support
//!
//! Unix only (Linux, macOS). Process-group termination relies on `killpg`.

#[cfg(windows)]
compile_error!(
    "exec_gateway does not support Windows: bounded lifetime relies on \
     killing the child's process group, which has no direct equivalent."
);

mod allowlist;
mod config;
mod env;
mod error;
mod gateway;
mod logging;
mod request;
mod result;
mod runner;
mod sandbox;

// Public API
pub use allowlist::{
    basename, default_commands, CommandAllowList, SEED_CONTAINERS, SEED_FILESYSTEM,
    SEED_PACKAGE_MANAGERS, SEED_TOOLCHAINS, SEED_VERSION_CONTROL,
};
pub use config::GatewayConfig;
pub use env::{is_dangerous, merge_environment, strip_dangerous, DANGEROUS_ENV};
pub use error::{ErrorKind, ExecError, SetupError, Violation};
pub use gateway::{ExecutionGateway, ExecutionGatewayBuilder};
pub use logging::init_logging;
pub use request::ExecutionRequest;
pub use result::{ExecutionResult, FAILURE_EXIT_CODE, GENERIC_FAILURE};
pub use runner::{ProcessRunner, DEFAULT_MAX_TIMEOUT};
pub use sandbox::{normalize, SandboxBoundary};

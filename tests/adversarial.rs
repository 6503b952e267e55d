//! Adversarial tests for exec_gateway.
//!
//! These tests attempt to escape the sandbox root, slip past the allow-list
//! or outlive the timeout. Every attack must be rejected or contained.

use exec_gateway::{ErrorKind, ExecutionGateway, ExecutionRequest, SandboxBoundary, Violation};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

fn host_path() -> String {
    std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string())
}

fn gateway_at(root: &Path) -> ExecutionGateway {
    ExecutionGateway::builder()
        .base_dir(root)
        .base_env_var("PATH", host_path())
        .allowed_commands(["pwd", "sh", "ls"])
        .max_timeout(Duration::from_secs(10))
        .build()
        .expect("valid gateway")
}

/// `<tmp>/app` as the root, with an `app-other` sibling next to it.
fn app_with_sibling() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
    let parent = TempDir::new().unwrap();
    let app = parent.path().join("app");
    let other = parent.path().join("app-other");
    std::fs::create_dir(&app).unwrap();
    std::fs::create_dir(&other).unwrap();
    (parent, app, other)
}

async fn assert_sandbox_violation(gw: &ExecutionGateway, cwd: &str) {
    let request = ExecutionRequest::new("pwd", Vec::<String>::new()).with_cwd(cwd);
    let result = gw.execute(request).await;
    assert!(!result.success, "{cwd} should be rejected");
    assert_eq!(result.kind, Some(ErrorKind::SandboxViolation), "{cwd}");
    assert!(result.stdout.is_empty());
}

// =============================================================================
// PATH TRAVERSAL
// =============================================================================

#[tokio::test]
async fn test_dotdot_escape() {
    let tmp = TempDir::new().unwrap();
    let gw = gateway_at(tmp.path());

    for cwd in ["..", "../..", "./..", "a/../../", "../../../../../../../../"] {
        assert_sandbox_violation(&gw, cwd).await;
    }
}

#[tokio::test]
async fn test_dotdot_escape_through_existing_subdir() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir(tmp.path().join("sub")).unwrap();
    let gw = gateway_at(tmp.path());

    assert_sandbox_violation(&gw, "sub/../..").await;
    assert_sandbox_violation(&gw, "sub/./../../sub").await;
}

#[tokio::test]
async fn test_absolute_outside_paths() {
    let tmp = TempDir::new().unwrap();
    let gw = gateway_at(tmp.path());

    for cwd in ["/", "/etc", "/tmp", "/nonexistent/place"] {
        assert_sandbox_violation(&gw, cwd).await;
    }
}

#[tokio::test]
async fn test_absolute_path_with_dotdot_back_out() {
    let tmp = TempDir::new().unwrap();
    let gw = gateway_at(tmp.path());

    let sneaky = format!("{}/../", gw.base_dir().display());
    assert_sandbox_violation(&gw, &sneaky).await;
}

// =============================================================================
// STRING PREFIX CONFUSION
// =============================================================================

#[tokio::test]
async fn test_sibling_sharing_string_prefix() {
    let (_parent, app, other) = app_with_sibling();
    let gw = gateway_at(&app);

    assert_sandbox_violation(&gw, other.to_str().unwrap()).await;
    assert_sandbox_violation(&gw, "../app-other").await;
}

#[test]
fn test_boundary_prefix_check_is_per_component() {
    let (_parent, app, other) = app_with_sibling();
    let boundary = SandboxBoundary::new(&app).unwrap();

    let result = boundary.resolve(Some(&other));
    assert!(matches!(result, Err(Violation::SandboxViolation { .. })));
    assert!(!boundary.contains(&other));
}

// =============================================================================
// SYMLINK ESCAPES
// =============================================================================

#[tokio::test]
async fn test_symlink_to_outside_dir() {
    let jail = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    std::os::unix::fs::symlink(outside.path(), jail.path().join("escape")).unwrap();
    let gw = gateway_at(jail.path());

    assert_sandbox_violation(&gw, "escape").await;
}

#[tokio::test]
async fn test_symlink_to_root() {
    let jail = TempDir::new().unwrap();
    std::os::unix::fs::symlink("/", jail.path().join("rootlink")).unwrap();
    let gw = gateway_at(jail.path());

    assert_sandbox_violation(&gw, "rootlink").await;
    assert_sandbox_violation(&gw, "rootlink/etc").await;
}

#[tokio::test]
async fn test_symlink_chain_out() {
    let jail = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    std::os::unix::fs::symlink(outside.path(), jail.path().join("hop2")).unwrap();
    std::os::unix::fs::symlink(jail.path().join("hop2"), jail.path().join("hop1")).unwrap();
    let gw = gateway_at(jail.path());

    assert_sandbox_violation(&gw, "hop1").await;
}

#[tokio::test]
async fn test_symlink_to_sibling_with_shared_prefix() {
    let (_parent, app, other) = app_with_sibling();
    std::os::unix::fs::symlink(&other, app.join("link")).unwrap();
    let gw = gateway_at(&app);

    assert_sandbox_violation(&gw, "link").await;
}

// =============================================================================
// ALLOW-LIST BYPASS ATTEMPTS
// =============================================================================

#[tokio::test]
async fn test_case_variants_rejected() {
    let tmp = TempDir::new().unwrap();
    let gw = gateway_at(tmp.path());

    for command in ["SH", "Sh", "PWD", "Ls"] {
        let result = gw.execute(ExecutionRequest::new(command, Vec::<String>::new())).await;
        assert_eq!(result.kind, Some(ErrorKind::Validation), "{command}");
    }
}

#[tokio::test]
async fn test_names_embedding_allowed_commands_rejected() {
    let tmp = TempDir::new().unwrap();
    let gw = gateway_at(tmp.path());

    for command in ["sh ", " sh", "sh;curl", "sh\0", "lsof", "bash", "sh/"] {
        let result = gw.execute(ExecutionRequest::new(command, Vec::<String>::new())).await;
        assert!(!result.success, "{command:?}");
        assert_eq!(result.kind, Some(ErrorKind::Validation), "{command:?}");
    }
}

#[tokio::test]
async fn test_shell_metacharacters_are_literal_args() {
    let tmp = TempDir::new().unwrap();
    let marker = tmp.path().join("pwned");
    let gw = gateway_at(tmp.path());

    // No shell between us and the binary: `;` and `$(...)` are plain arguments.
    let request = ExecutionRequest::new(
        "ls",
        [format!("; touch {}", marker.display()), "$(touch pwned)".to_string()],
    );
    let result = gw.execute(request).await;

    assert!(!result.success);
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_rejected_command_never_spawned() {
    let tmp = TempDir::new().unwrap();
    let marker = tmp.path().join("created");
    let gw = gateway_at(tmp.path());

    let request = ExecutionRequest::new("touch", [marker.to_str().unwrap()]);
    let result = gw.execute(request).await;

    assert_eq!(result.kind, Some(ErrorKind::Validation));
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_rejected_cwd_never_spawned() {
    let tmp = TempDir::new().unwrap();
    let marker = tmp.path().join("created");
    let gw = gateway_at(tmp.path());

    let script = format!("touch {}", marker.display());
    let request = ExecutionRequest::new("sh", ["-c", script.as_str()]).with_cwd("..");
    let result = gw.execute(request).await;

    assert_eq!(result.kind, Some(ErrorKind::SandboxViolation));
    assert!(!marker.exists());
}

// =============================================================================
// RUNAWAY PROCESSES
// =============================================================================

#[tokio::test]
async fn test_grandchild_holding_pipe_is_killed() {
    let tmp = TempDir::new().unwrap();
    let gw = gateway_at(tmp.path());

    // The background sleep inherits stdout; only a group kill closes the pipe.
    let start = Instant::now();
    let request = ExecutionRequest::new("sh", ["-c", "sleep 30 & sleep 30"])
        .with_timeout(Duration::from_millis(500));
    let result = gw.execute(request).await;

    assert!(start.elapsed() < Duration::from_secs(5), "took {:?}", start.elapsed());
    assert!(result.timed_out());
}

#[tokio::test]
async fn test_background_child_after_exit_does_not_hang() {
    let tmp = TempDir::new().unwrap();
    let gw = gateway_at(tmp.path());

    // Leader exits at once but leaves a descendant holding stdout open.
    let start = Instant::now();
    let request = ExecutionRequest::new("sh", ["-c", "echo done; sleep 30 &"])
        .with_timeout(Duration::from_secs(1));
    let result = gw.execute(request).await;

    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(result.success);
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "done\n");
}

#[tokio::test]
async fn test_ignores_sigterm() {
    let tmp = TempDir::new().unwrap();
    let gw = gateway_at(tmp.path());

    let start = Instant::now();
    let request = ExecutionRequest::new("sh", ["-c", "trap '' TERM; sleep 30"])
        .with_timeout(Duration::from_millis(500));
    let result = gw.execute(request).await;

    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(result.timed_out());
}

#[tokio::test]
async fn test_output_flood_does_not_block_timeout() {
    let tmp = TempDir::new().unwrap();
    let gw = gateway_at(tmp.path());

    let start = Instant::now();
    let request = ExecutionRequest::new("sh", ["-c", "while :; do echo flood >&2; done"])
        .with_timeout(Duration::from_millis(500));
    let result = gw.execute(request).await;

    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(result.timed_out());
    assert!(result.stderr.starts_with("flood\n"));
}

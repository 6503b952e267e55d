//! Environment merging.
//!
//! The spawned process sees exactly the merged map: the host-supplied base
//! environment overlaid by the request's overrides. Nothing is inherited from
//! the gateway's own process environment.

use std::collections::HashMap;

/// Variables removed from the merged environment when stripping is enabled.
///
/// These can inject code into the child or redirect what it executes.
pub const DANGEROUS_ENV: &[&str] = &[
    // Library injection
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "LD_DEBUG",
    "LD_PROFILE",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "DYLD_FRAMEWORK_PATH",
    "DYLD_FALLBACK_LIBRARY_PATH",
    // Interpreter paths and startup hooks
    "PYTHONPATH",
    "PYTHONSTARTUP",
    "PYTHONHOME",
    "RUBYLIB",
    "RUBYOPT",
    "PERL5LIB",
    "PERL5OPT",
    "PERLLIB",
    "NODE_PATH",
    "NODE_OPTIONS",
    // Shell startup hooks
    "BASH_ENV",
    "ENV",
    "PROMPT_COMMAND",
    // Git hooks
    "GIT_EXEC_PATH",
    "GIT_TEMPLATE_DIR",
];

/// Overlay `overrides` onto `base`. Override values win on key conflict.
pub fn merge_environment(
    base: &HashMap<String, String>,
    overrides: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = base.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Remove every [`DANGEROUS_ENV`] key from `env`. Returns how many were removed.
pub fn strip_dangerous(env: &mut HashMap<String, String>) -> usize {
    let before = env.len();
    env.retain(|k, _| !is_dangerous(k));
    before - env.len()
}

/// Check if a key is in [`DANGEROUS_ENV`] (ASCII case-insensitive).
pub fn is_dangerous(key: &str) -> bool {
    DANGEROUS_ENV.iter().any(|&s| s.eq_ignore_ascii_case(key))
}

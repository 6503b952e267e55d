//! Command allow-list.
//!
//! Commands are matched by basename only: `/usr/bin/git`, `./git` and `git`
//! all test membership of `git`. Matching is exact and case-sensitive and
//! never touches the filesystem.

use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Package managers.
pub const SEED_PACKAGE_MANAGERS: &[&str] = &[
    "npm", "npx", "yarn", "pnpm", "bun", "pip", "pip3", "uv", "cargo", "gem", "bundle",
    "composer", "brew",
];

/// Version control.
pub const SEED_VERSION_CONTROL: &[&str] = &["git", "gh", "hg", "svn"];

/// Filesystem and text utilities.
pub const SEED_FILESYSTEM: &[&str] = &[
    "ls", "cat", "head", "tail", "wc", "pwd", "echo", "mkdir", "touch", "cp", "mv", "rm",
    "find", "grep", "diff", "sort", "tree", "du",
];

/// Language toolchains.
pub const SEED_TOOLCHAINS: &[&str] = &[
    "node", "deno", "tsc", "python", "python3", "rustc", "rustup", "go", "java", "javac",
    "make", "cmake",
];

/// Container tooling.
pub const SEED_CONTAINERS: &[&str] = &["docker", "docker-compose", "podman", "kubectl"];

/// The default allow-list, in category order.
pub fn default_commands() -> Vec<String> {
    [
        SEED_PACKAGE_MANAGERS,
        SEED_VERSION_CONTROL,
        SEED_FILESYSTEM,
        SEED_TOOLCHAINS,
        SEED_CONTAINERS,
    ]
    .iter()
    .flat_map(|group| group.iter())
    .map(|s| s.to_string())
    .collect()
}

/// Last path segment of a command, as used for allow-list membership.
///
/// `"/usr/bin/git"` becomes `"git"`. A trailing slash yields an empty
/// basename, which is never allowed.
pub fn basename(command: &str) -> &str {
    command.rsplit('/').next().unwrap_or(command)
}

/// A mutable, insertion-ordered set of permitted executable basenames.
///
/// Reads and writes go through an `RwLock`, so one list can be shared by
/// concurrent `execute` calls while an administrator mutates it.
#[derive(Debug, Default)]
pub struct CommandAllowList {
    names: RwLock<Vec<String>>,
}

impl CommandAllowList {
    /// Create an empty allow-list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allow-list seeded with the given names.
    ///
    /// Duplicates are dropped; first occurrence wins the position.
    pub fn with_commands<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = Self::new();
        for name in names {
            list.allow(name);
        }
        list
    }

    /// Report whether the basename of `command` is allowed.
    pub fn is_allowed(&self, command: &str) -> bool {
        let name = basename(command);
        if name.is_empty() {
            return false;
        }
        self.read(|names| names.iter().any(|n| n == name))
    }

    /// Add a name. Adding an existing name is a no-op.
    ///
    /// Matching is by basename, so an empty name or one containing `/` could
    /// never match and is ignored.
    pub fn allow(&self, name: impl Into<String>) {
        let name = name.into();
        if name.is_empty() || name.contains('/') {
            debug!(command = %name, "ignoring allow-list entry that is not a basename");
            return;
        }
        self.write(|names| {
            if !names.contains(&name) {
                names.push(name);
            }
        });
    }

    /// Remove a name. Removing a missing name is a no-op.
    pub fn disallow(&self, name: &str) {
        self.write(|names| names.retain(|n| n != name));
    }

    /// Snapshot of the allowed names in insertion order.
    pub fn list(&self) -> Vec<String> {
        self.read(|names| names.clone())
    }

    // A panic while holding the lock cannot leave the Vec half-mutated
    // (push/retain are the only writers), so poisoning is ignored.
    fn read<T>(&self, f: impl FnOnce(&Vec<String>) -> T) -> T {
        let guard = self.names.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Vec<String>) -> T) -> T {
        let mut guard = self.names.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

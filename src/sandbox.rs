//! Sandbox boundary for working directories.
//!
//! Every process the gateway starts runs with a working directory equal to, or
//! below, the sandbox root. Containment is decided per path component, never
//! by string prefix, so `/srv/app-other` is not inside `/srv/app`.

use crate::error::{SetupError, Violation};
use std::io;
use std::path::{Component, Path, PathBuf};

/// The root directory outside which no execution may occur.
#[derive(Debug, Clone)]
pub struct SandboxBoundary {
    /// Canonical root (symlinks resolved).
    root: PathBuf,

    /// Root as configured, made absolute and lexically normalized.
    ///
    /// Differs from `root` when the configured path goes through a symlink
    /// (e.g. `/tmp` -> `/private/tmp`); requests may name either spelling.
    configured: PathBuf,
}

impl SandboxBoundary {
    /// Establish a boundary at `root`.
    ///
    /// # Errors
    ///
    /// Fails if `root` does not exist, cannot be canonicalized, or is not a
    /// directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SetupError> {
        let given = root.as_ref();

        let canonical = std::fs::canonicalize(given).map_err(|e| SetupError::BaseDir {
            path: given.to_path_buf(),
            reason: e.to_string(),
        })?;

        if !canonical.is_dir() {
            return Err(SetupError::BaseDirNotDirectory {
                path: given.to_path_buf(),
            });
        }

        let configured = std::path::absolute(given)
            .map(|p| normalize(&p))
            .unwrap_or_else(|_| canonical.clone());

        Ok(Self {
            root: canonical,
            configured,
        })
    }

    /// The canonical sandbox root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a requested working directory against the root.
    ///
    /// Relative requests are joined onto the root; absolute requests are
    /// taken as-is. `None` yields the root itself and never fails.
    ///
    /// # Errors
    ///
    /// - `SandboxViolation` if the lexically normalized path is outside the
    ///   root, or if resolving symlinks takes it outside
    /// - `CwdNotFound` if the path does not exist
    /// - `CwdInvalid` if the path exists but is not a usable directory
    pub fn resolve(&self, requested: Option<&Path>) -> Result<PathBuf, Violation> {
        let Some(requested) = requested else {
            return Ok(self.root.clone());
        };

        let normalized = normalize(&self.root.join(requested));
        let lexical = if normalized.starts_with(&self.root) {
            normalized
        } else {
            // Requests may spell the root the way it was configured.
            let alt = normalize(&self.configured.join(requested));
            if !alt.starts_with(&self.configured) {
                return Err(self.violation(requested));
            }
            alt
        };

        let canonical = std::fs::canonicalize(&lexical).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Violation::CwdNotFound {
                path: requested.display().to_string(),
            },
            _ => Violation::CwdInvalid {
                path: requested.display().to_string(),
                reason: e.to_string(),
            },
        })?;

        // Symlinks inside the jail may point out of it.
        if !canonical.starts_with(&self.root) {
            return Err(self.violation(requested));
        }

        if !canonical.is_dir() {
            return Err(Violation::CwdInvalid {
                path: requested.display().to_string(),
                reason: "not a directory".to_string(),
            });
        }

        Ok(canonical)
    }

    /// Check containment without touching the filesystem.
    pub fn contains(&self, path: &Path) -> bool {
        normalize(&self.root.join(path)).starts_with(&self.root)
    }

    fn violation(&self, requested: &Path) -> Violation {
        Violation::SandboxViolation {
            path: requested.display().to_string(),
            root: self.root.display().to_string(),
        }
    }
}

/// Lexically normalize a path: drop `.`, fold `..` into its parent.
///
/// `..` at the filesystem root stays at the root. Symlinks are not consulted.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

//! Save-directory path resolution and escape detection.
//!
//! Reset paths are caller controlled, so every resolved location must stay
//! inside the save root. Normalizes `.` and `..`, rejects absolute inputs
//! and detects symlink-based escapes.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::{PathResolver, StorageHost};
use crate::{AppError, Result};

/// Validate that `relative` resolves to a location within `save_root`.
///
/// Returns the absolute path on success. The file itself need not exist.
///
/// # Errors
///
/// Returns `AppError::PathViolation` if:
/// - The save root cannot be canonicalized.
/// - The candidate is empty or absolute.
/// - The candidate contains `..` segments that escape the root.
/// - The resolved path is a symlink whose target escapes the root.
pub fn validate_save_path(save_root: &Path, relative: &str) -> Result<PathBuf> {
    let root = save_root
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("save root invalid: {err}")))?;

    let mut normalized = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(AppError::PathViolation(format!(
                        "{relative} attempts to escape the save directory"
                    )));
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::PathViolation(format!(
                    "{relative} must be relative to the save directory"
                )));
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(AppError::PathViolation(format!(
            "'{relative}' does not name a file"
        )));
    }

    let absolute = root.join(normalized);

    // Symlink escape detection: canonicalize follows links of existing paths.
    if absolute.exists() {
        let canonical = absolute
            .canonicalize()
            .map_err(|err| AppError::PathViolation(format!("cannot resolve {relative}: {err}")))?;
        if !canonical.starts_with(&root) {
            return Err(AppError::PathViolation(format!(
                "symlink target of {relative} escapes the save directory"
            )));
        }
    }

    Ok(absolute)
}

/// A save rooted at one directory on disk.
#[derive(Debug, Clone)]
pub struct SaveDirectory {
    root: PathBuf,
}

impl SaveDirectory {
    /// Create a save directory handle. The root is checked on each resolve,
    /// not here, because the save may be created after bootstrap.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the save.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PathResolver for SaveDirectory {
    fn resolve_save_path(&self, relative: &str) -> Result<PathBuf> {
        validate_save_path(&self.root, relative)
    }
}

impl StorageHost for SaveDirectory {
    fn current_save(&self) -> Result<Arc<dyn PathResolver>> {
        if !self.root.is_dir() {
            return Err(AppError::Resolve(format!(
                "save directory {} is not available",
                self.root.display()
            )));
        }
        Ok(Arc::new(self.clone()))
    }
}

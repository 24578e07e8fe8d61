//! On-disk workspaces, one per repository name, and the locks that serialize
//! controllers acting on the same repository.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use regex::Regex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::PreviewError;

fn repo_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("static pattern"))
}

/// Rejects names that could escape the workspace root.
pub fn validate_repo_name(name: &str) -> Result<(), PreviewError> {
    if name == "." || name == ".." || !repo_name_pattern().is_match(name) {
        return Err(PreviewError::FilesystemError(format!(
            "Refusing to use {:?} as a workspace name",
            name
        )));
    }
    Ok(())
}

/// Rejects branch names git would parse as an option.
pub fn validate_branch_name(branch: &str) -> Result<(), PreviewError> {
    if branch.is_empty() || branch.starts_with('-') || branch.chars().any(char::is_control) {
        return Err(PreviewError::SourceControlError(format!(
            "Refusing to check out branch {:?}",
            branch
        )));
    }
    Ok(())
}

/// Owns the workspace root and one async mutex per repository name.
///
/// Lock entries are created on first use and dropped again by [`forget`]
/// once a repository's workspace is gone and nobody else is waiting on it.
///
/// [`forget`]: Workspaces::forget
pub struct Workspaces {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Workspaces {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, repo_name: &str) -> Result<PathBuf, PreviewError> {
        validate_repo_name(repo_name)?;
        Ok(self.root.join(repo_name))
    }

    /// Waits for exclusive access to `repo_name`'s workspace.
    pub async fn lock(&self, repo_name: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            // A poisoned map only means another thread panicked while
            // inserting; the map itself is still usable.
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            Arc::clone(
                locks
                    .entry(repo_name.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        debug!(repo = %repo_name, "waiting for workspace lock");
        mutex.lock_owned().await
    }

    /// Drops the lock entry for `repo_name` unless another task still holds
    /// or awaits it. Call after releasing the guard.
    pub fn forget(&self, repo_name: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        if locks
            .get(repo_name)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            locks.remove(repo_name);
            debug!(repo = %repo_name, "dropped workspace lock entry");
        }
    }

    /// Number of repositories with a lock entry.
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

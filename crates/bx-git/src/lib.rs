//! Git operations backing the batch executor: a bounded worktree sandbox
//! pool, branch promotion, and diff generation.

use std::path::Path;

pub mod branch;
pub mod diff;
pub mod error;
pub mod pool;

pub use branch::{BranchManager, GitBranchManager, PromoteResult};
pub use diff::{DefaultDiffGenerator, Diff, DiffGenerator, DiffStat, FileDiff};
pub use error::GitError;
pub use pool::{AcquireTimeout, RecoveryFailed, Sandbox, SandboxHealth, SandboxStatus, WorktreePool};

/// Check if a path is inside a git repository.
///
/// # Errors
///
/// Returns an error if the path cannot be accessed.
pub fn is_git_repo(path: &Path) -> Result<bool, GitError> {
    match git2::Repository::discover(path) {
        Ok(_) => Ok(true),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(false),
        Err(e) => Err(GitError::Git2Error(e)),
    }
}

/// Check if the batch executor's state directory has been initialized in
/// this repository.
#[must_use]
pub fn is_initialized(repo_root: &Path) -> bool {
    repo_root.join(".batchexec").exists()
}

/// Get the root directory of the git repository containing the given path.
///
/// # Errors
///
/// Returns an error if the path is not in a git repository.
pub fn repo_root(path: &Path) -> Result<std::path::PathBuf, GitError> {
    let repo = git2::Repository::discover(path)?;
    repo.workdir()
        .map(|p| p.to_path_buf())
        .ok_or_else(|| GitError::NotARepo("Bare repository".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_git_repo() -> TempDir {
        let dir = TempDir::new().expect("Failed to create temp dir");
        git2::Repository::init(dir.path()).expect("Failed to init git repo");
        dir
    }

    #[test]
    fn test_is_git_repo_true_for_git_directory() {
        let repo = create_git_repo();
        assert!(is_git_repo(repo.path()).unwrap());
    }

    #[test]
    fn test_is_git_repo_false_for_non_git_directory() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        assert!(!is_git_repo(dir.path()).unwrap());
    }

    #[test]
    fn test_is_initialized_false_when_nothing_exists() {
        let repo = create_git_repo();
        assert!(!is_initialized(repo.path()));
    }

    #[test]
    fn test_is_initialized_true_when_marker_exists() {
        let repo = create_git_repo();
        std::fs::create_dir(repo.path().join(".batchexec")).expect("create marker");
        assert!(is_initialized(repo.path()));
    }

    #[test]
    fn test_repo_root_returns_root_path() {
        let repo = create_git_repo();
        let root = repo_root(repo.path()).unwrap();
        assert_eq!(root, repo.path());
    }

    #[test]
    fn test_repo_root_fails_for_non_git() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        assert!(repo_root(dir.path()).is_err());
    }
}

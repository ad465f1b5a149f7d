//! Version-control collaborator.
//!
//! The session manager treats git as an opaque capability: find the
//! repository root, check a branch out, create a branch, undo the last
//! commit. `GitBranchCoordinator` is the only thing the rest of the crate
//! talks to.

mod cli;

pub use cli::GitCliBackend;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::GitError;

/// A discovered repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    root_path: PathBuf,
}

impl RepoHandle {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
        }
    }

    /// Absolute path of the repository root.
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }
}

/// Branch operations provided by a version-control tool.
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Find the repository containing `start`.
    async fn discover_root(&self, start: &Path) -> Result<RepoHandle, GitError>;

    async fn checkout(&self, repo: &RepoHandle, branch: &str) -> Result<(), GitError>;

    async fn create_branch(
        &self,
        repo: &RepoHandle,
        name: &str,
        checkout: bool,
    ) -> Result<(), GitError>;

    /// Drop the most recent commit on the checked-out branch.
    async fn undo_last_commit(&self, repo: &RepoHandle) -> Result<(), GitError>;
}

/// Wraps the optional git capability.
///
/// A missing backend is a configuration error, reported on every call
/// rather than retried.
#[derive(Clone)]
pub struct GitBranchCoordinator {
    backend: Option<Arc<dyn GitBackend>>,
}

impl GitBranchCoordinator {
    pub fn new(backend: Arc<dyn GitBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A coordinator with no git capability at all.
    pub fn unavailable() -> Self {
        Self { backend: None }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self) -> Result<&Arc<dyn GitBackend>, GitError> {
        self.backend.as_ref().ok_or_else(|| {
            warn!("Git extension not found");
            GitError::ExtensionNotFound
        })
    }

    pub async fn discover_root(&self, start: &Path) -> Result<RepoHandle, GitError> {
        self.backend()?.discover_root(start).await
    }

    pub async fn checkout(&self, repo: &RepoHandle, branch: &str) -> Result<(), GitError> {
        self.backend()?.checkout(repo, branch).await?;
        info!(branch = branch, "Checked out branch");
        Ok(())
    }

    pub async fn create_branch(
        &self,
        repo: &RepoHandle,
        name: &str,
        checkout: bool,
    ) -> Result<(), GitError> {
        self.backend()?.create_branch(repo, name, checkout).await?;
        info!(branch = name, checkout = checkout, "Created branch");
        Ok(())
    }

    pub async fn undo_last_commit(&self, repo: &RepoHandle) -> Result<(), GitError> {
        self.backend()?.undo_last_commit(repo).await?;
        info!(repo = %repo.root_path().display(), "Undid last commit");
        Ok(())
    }
}

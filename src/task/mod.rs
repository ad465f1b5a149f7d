//! Tasks: units of work bound to a branch and a conversation.
//!
//! A task's repository handle is acquired lazily. Until `init()` succeeds the
//! task is `Uninitialized` and nothing that needs the repository may run;
//! once a handle is held it is kept for the life of the task.

pub mod conversation;
pub mod registry;

pub use conversation::{ConversationStore, Message, Sender};
pub use registry::TaskRegistry;

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{GitError, TaskError, WorkspaceError};
use crate::git::{GitBranchCoordinator, RepoHandle};
use crate::single_flight::SingleFlight;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Derive a branch name from a human title: whitespace runs become hyphens.
pub fn branch_name_for(prefix: &str, title: &str) -> String {
    format!("{}{}", prefix, WHITESPACE_RUN.replace_all(title, "-"))
}

/// Repository binding of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoState {
    Uninitialized,
    /// Discovery is in flight.
    Initializing,
    Initialized(RepoHandle),
}

/// Listing entry for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub title: String,
    pub branch: String,
    pub active: bool,
}

/// A unit of work.
pub struct Task {
    id: String,
    title: String,
    branch_name: String,
    workspace_root: PathBuf,
    git: GitBranchCoordinator,
    repo: SingleFlight<RepoHandle, TaskError>,
    workspace_paths: SingleFlight<Arc<Vec<String>>, WorkspaceError>,
    conversation: RwLock<ConversationStore>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        branch_name: impl Into<String>,
        workspace_root: impl Into<PathBuf>,
        git: GitBranchCoordinator,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            branch_name: branch_name.into(),
            workspace_root: workspace_root.into(),
            git,
            repo: SingleFlight::new(),
            workspace_paths: SingleFlight::new(),
            conversation: RwLock::new(ConversationStore::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn branch_name(&self) -> &str {
        &self.branch_name
    }

    /// Acquire the repository handle, once.
    ///
    /// Repeated calls after a success return the cached handle. Concurrent
    /// calls share one discovery. A failed discovery caches nothing.
    pub async fn init(&self) -> Result<RepoHandle, TaskError> {
        let git = self.git.clone();
        let start = self.workspace_root.clone();
        let task_id = self.id.clone();

        self.repo
            .get_or_try_init(move || async move {
                match git.discover_root(&start).await {
                    Ok(repo) => {
                        info!(
                            task_id = %task_id,
                            root = %repo.root_path().display(),
                            "Task repository initialized"
                        );
                        Ok(repo)
                    }
                    Err(GitError::ExtensionNotFound) => Err(TaskError::GitExtensionNotFound),
                    Err(e) => {
                        warn!(
                            task_id = %task_id,
                            error = %e,
                            "Task repository initialization failed"
                        );
                        Err(TaskError::InitializationFailed {
                            reason: e.to_string(),
                        })
                    }
                }
            })
            .await
    }

    pub async fn repo_state(&self) -> RepoState {
        if let Some(repo) = self.repo.get().await {
            RepoState::Initialized(repo)
        } else if self.repo.is_pending().await {
            RepoState::Initializing
        } else {
            RepoState::Uninitialized
        }
    }

    /// The repository handle if already initialized; never triggers discovery.
    pub async fn repo(&self) -> Option<RepoHandle> {
        self.repo.get().await
    }

    pub(crate) fn workspace_paths(&self) -> &SingleFlight<Arc<Vec<String>>, WorkspaceError> {
        &self.workspace_paths
    }

    pub fn conversation(&self) -> &RwLock<ConversationStore> {
        &self.conversation
    }

    /// Snapshot of the transcript in order.
    pub async fn messages(&self) -> Vec<Message> {
        self.conversation.read().await.messages().to_vec()
    }

    pub fn summary(&self, active: bool) -> TaskSummary {
        TaskSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            branch: self.branch_name.clone(),
            active,
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("branch_name", &self.branch_name)
            .finish_non_exhaustive()
    }
}

//! Task registry: creation, lookup, and the single active task.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::{Message, Task, TaskSummary, branch_name_for};
use crate::config::SessionConfig;
use crate::error::{Result, TaskError};
use crate::git::{GitBranchCoordinator, RepoHandle};

#[derive(Default)]
struct RegistryState {
    tasks: HashMap<String, Arc<Task>>,
    /// Insertion order, for listing.
    order: Vec<String>,
    /// Always `None` or a key of `tasks`.
    active: Option<String>,
    /// Seeded tasks whose branch has not been checked out or created yet.
    unbranched: HashSet<String>,
}

/// Owns every task and tracks which one is active.
pub struct TaskRegistry {
    workspace_root: PathBuf,
    branch_prefix: String,
    create_branches: bool,
    git: GitBranchCoordinator,
    state: RwLock<RegistryState>,
    /// Serializes task creation and operations that move the checked-out branch.
    branch_lock: Mutex<()>,
}

impl TaskRegistry {
    pub fn new(config: &SessionConfig, git: GitBranchCoordinator) -> Self {
        Self {
            workspace_root: config.workspace_root.clone(),
            branch_prefix: config.branch_prefix.clone(),
            create_branches: config.create_branches,
            git,
            state: RwLock::new(RegistryState::default()),
            branch_lock: Mutex::new(()),
        }
    }

    pub fn git(&self) -> &GitBranchCoordinator {
        &self.git
    }

    fn new_task(&self, id: String, title: &str) -> Task {
        Task::new(
            id,
            title,
            branch_name_for(&self.branch_prefix, title),
            self.workspace_root.clone(),
            self.git.clone(),
        )
    }

    fn next_id(state: &RegistryState) -> String {
        let base = format!("task_{}", Utc::now().timestamp_millis());
        if !state.tasks.contains_key(&base) {
            return base;
        }
        (1..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !state.tasks.contains_key(candidate))
            .unwrap_or(base)
    }

    fn insert_active(state: &mut RegistryState, task: Arc<Task>) {
        let id = task.id().to_string();
        state.order.push(id.clone());
        state.tasks.insert(id.clone(), task);
        state.active = Some(id);
    }

    /// Create a task, initialize its repository, and make it active.
    ///
    /// Nothing is registered unless initialization (and branch creation,
    /// when enabled) succeeds.
    pub async fn create_task(&self, title: &str) -> Result<String> {
        if title.trim().is_empty() {
            return Err(TaskError::InvalidTitle.into());
        }

        let _guard = self.branch_lock.lock().await;

        let id = Self::next_id(&*self.state.read().await);
        let task = Arc::new(self.new_task(id.clone(), title));

        let repo = task.init().await?;
        if self.create_branches {
            self.git.create_branch(&repo, task.branch_name(), true).await?;
        }

        let mut state = self.state.write().await;
        info!(task_id = %id, branch = %task.branch_name(), "Task created");
        Self::insert_active(&mut state, task);
        Ok(id)
    }

    /// Register a task without touching git.
    ///
    /// Its repository is initialized, and its branch checked out or created,
    /// on first use through `active_task` or `switch_to_task`.
    pub async fn seed_task(&self, title: &str) -> std::result::Result<String, TaskError> {
        if title.trim().is_empty() {
            return Err(TaskError::InvalidTitle);
        }
        let _guard = self.branch_lock.lock().await;
        let mut state = self.state.write().await;
        let id = Self::next_id(&state);
        let task = Arc::new(self.new_task(id.clone(), title));
        info!(task_id = %id, branch = %task.branch_name(), "Task seeded");
        state.unbranched.insert(id.clone());
        Self::insert_active(&mut state, task);
        Ok(id)
    }

    /// All tasks in creation order.
    pub async fn list_tasks(&self) -> Vec<Arc<Task>> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.tasks.get(id).cloned())
            .collect()
    }

    pub async fn summaries(&self) -> Vec<TaskSummary> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.tasks.get(id))
            .map(|task| task.summary(state.active.as_deref() == Some(task.id())))
            .collect()
    }

    pub async fn get(&self, task_id: &str) -> std::result::Result<Arc<Task>, TaskError> {
        self.state
            .read()
            .await
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound {
                id: task_id.to_string(),
            })
    }

    /// Transcript of any task by id.
    pub async fn conversation(
        &self,
        task_id: &str,
    ) -> std::result::Result<Vec<Message>, TaskError> {
        Ok(self.get(task_id).await?.messages().await)
    }

    pub async fn active_task_id(&self) -> Option<String> {
        self.state.read().await.active.clone()
    }

    /// Check out the task's branch, then make it active.
    ///
    /// If the checkout fails the active task is left unchanged.
    pub async fn switch_to_task(&self, task_id: &str) -> Result<()> {
        let _guard = self.branch_lock.lock().await;

        let task = self.get(task_id).await?;
        let repo = task.init().await?;
        if self.needs_branch(task_id).await {
            self.ensure_branch(&task, &repo).await?;
        } else {
            self.git.checkout(&repo, task.branch_name()).await?;
        }

        let mut state = self.state.write().await;
        if state.tasks.contains_key(task_id) {
            state.active = Some(task_id.to_string());
        }
        info!(task_id = %task_id, branch = %task.branch_name(), "Switched task");
        Ok(())
    }

    /// The active task, with its repository initialized.
    ///
    /// A seeded task also gets its branch here the first time it is used.
    pub async fn active_task(&self) -> Result<Arc<Task>> {
        let task = self.active_entry().await?;
        if !self.needs_branch(task.id()).await {
            task.init().await?;
            return Ok(task);
        }

        let _guard = self.branch_lock.lock().await;
        // The active task may have moved while waiting for the lock.
        let task = self.active_entry().await?;
        let repo = task.init().await?;
        if self.needs_branch(task.id()).await {
            self.ensure_branch(&task, &repo).await?;
        }
        Ok(task)
    }

    async fn active_entry(&self) -> std::result::Result<Arc<Task>, TaskError> {
        let state = self.state.read().await;
        let id = state.active.as_ref().ok_or(TaskError::NoActiveTask)?;
        state
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound { id: id.clone() })
    }

    async fn needs_branch(&self, task_id: &str) -> bool {
        self.create_branches && self.state.read().await.unbranched.contains(task_id)
    }

    /// Check out a seeded task's branch, creating it when it does not exist.
    ///
    /// Caller holds `branch_lock`.
    async fn ensure_branch(&self, task: &Task, repo: &RepoHandle) -> Result<()> {
        if let Err(e) = self.git.checkout(repo, task.branch_name()).await {
            debug!(task_id = %task.id(), error = %e, "Seeded branch missing, creating it");
            self.git.create_branch(repo, task.branch_name(), true).await?;
        }
        self.state.write().await.unbranched.remove(task.id());
        info!(task_id = %task.id(), branch = %task.branch_name(), "Seeded task branch ready");
        Ok(())
    }
}

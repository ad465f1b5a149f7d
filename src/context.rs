//! The "mind": file paths the user has placed in the model's context.

use tokio::sync::RwLock;
use tracing::info;

/// Log target for context-set mutations.
pub const MIND_LOG_TARGET: &str = "melty::mind";

/// Ordered multiset of repository-relative paths.
///
/// Adding a path twice keeps both entries; removing drops every occurrence.
#[derive(Debug, Default)]
pub struct FileContextSet {
    paths: RwLock<Vec<String>>,
}

impl FileContextSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, path: impl Into<String>) {
        let path = path.into();
        info!(target: MIND_LOG_TARGET, "Added file: {}", path);
        self.paths.write().await.push(path);
    }

    pub async fn remove(&self, path: &str) {
        self.paths.write().await.retain(|p| p != path);
        info!(target: MIND_LOG_TARGET, "Dropped file: {}", path);
    }

    /// Current members in insertion order, empty strings excluded.
    pub async fn list(&self) -> Vec<String> {
        self.paths
            .read()
            .await
            .iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect()
    }
}

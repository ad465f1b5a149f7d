//! Workspace file index.
//!
//! The index is the full list of repository-relative file paths for a
//! task, minus an ignore glob (dependency trees by default). It is computed
//! at most once per task repository binding; every later read is served
//! from the cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Result, WorkspaceError};
use crate::task::Task;

/// Directory names never descended into.
const ALWAYS_SKIPPED_DIRS: &[&str] = &[".git"];

/// A compiled glob over `/`-separated relative paths.
///
/// `*` and `?` stay within one path segment; `**` crosses segments.
#[derive(Debug, Clone)]
pub struct Glob {
    matcher: GlobMatcher,
}

impl Glob {
    pub fn new(pattern: &str) -> std::result::Result<Self, WorkspaceError> {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| WorkspaceError::InvalidGlob {
                pattern: pattern.to_string(),
                reason: e.kind().to_string(),
            })?;
        Ok(Self {
            matcher: glob.compile_matcher(),
        })
    }

    pub fn is_match(&self, relative: &str) -> bool {
        self.matcher.is_match(relative)
    }

    /// Whether everything below `dir` is matched, so the walk can prune it.
    fn covers_dir(&self, relative_dir: &str) -> bool {
        self.matcher.is_match(format!("{}/", relative_dir))
    }
}

/// Enumerates files the editor knows about.
#[async_trait]
pub trait FileEnumerator: Send + Sync {
    /// Absolute paths of files matching `include` and not `exclude`.
    async fn find_files(
        &self,
        include: &Glob,
        exclude: &Glob,
    ) -> std::result::Result<Vec<PathBuf>, WorkspaceError>;
}

/// Walks a directory tree on disk, following symlinks.
pub struct FsFileEnumerator {
    root: PathBuf,
}

impl FsFileEnumerator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn walk(
        root: &Path,
        include: &Glob,
        exclude: &Glob,
    ) -> std::result::Result<Vec<PathBuf>, WorkspaceError> {
        let walker = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                !ALWAYS_SKIPPED_DIRS.contains(&name.as_ref())
                    && !exclude.covers_dir(&relative_slash_path(root, entry.path()))
            });

        let mut found = Vec::new();
        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(WorkspaceError::EnumerationFailed {
                        reason: format!("{}: {}", root.display(), e),
                    });
                }
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable workspace entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = relative_slash_path(root, entry.path());
            if include.is_match(&relative) && !exclude.is_match(&relative) {
                found.push(entry.into_path());
            }
        }
        found.sort();
        Ok(found)
    }
}

#[async_trait]
impl FileEnumerator for FsFileEnumerator {
    async fn find_files(
        &self,
        include: &Glob,
        exclude: &Glob,
    ) -> std::result::Result<Vec<PathBuf>, WorkspaceError> {
        let root = self.root.clone();
        let include = include.clone();
        let exclude = exclude.clone();
        tokio::task::spawn_blocking(move || Self::walk(&root, &include, &exclude))
            .await
            .map_err(|e| WorkspaceError::EnumerationFailed {
                reason: e.to_string(),
            })?
    }
}

fn relative_slash_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Memoized repository-relative file listing per task.
pub struct WorkspaceFileIndex {
    enumerator: Arc<dyn FileEnumerator>,
    include: Glob,
    exclude: Glob,
}

impl WorkspaceFileIndex {
    pub fn new(
        enumerator: Arc<dyn FileEnumerator>,
        include: &str,
        exclude: &str,
    ) -> std::result::Result<Self, WorkspaceError> {
        Ok(Self {
            enumerator,
            include: Glob::new(include)?,
            exclude: Glob::new(exclude)?,
        })
    }

    /// Repository-relative paths for `task`.
    ///
    /// Initializes the task's repository first if needed. Concurrent first
    /// calls share one enumeration.
    pub async fn paths(&self, task: &Task) -> Result<Arc<Vec<String>>> {
        let repo = task.init().await?;

        let enumerator = Arc::clone(&self.enumerator);
        let include = self.include.clone();
        let exclude = self.exclude.clone();
        let task_id = task.id().to_string();

        let paths = task
            .workspace_paths()
            .get_or_try_init(move || async move {
                let files = enumerator.find_files(&include, &exclude).await?;
                let root = repo.root_path();
                let relative: Vec<String> = files
                    .iter()
                    .filter_map(|file| match file.strip_prefix(root) {
                        Ok(rel) => Some(relative_slash_path(Path::new(""), rel)),
                        Err(_) => {
                            debug!(file = %file.display(), "Skipping file outside repository");
                            None
                        }
                    })
                    .collect();
                info!(task_id = %task_id, count = relative.len(), "Workspace files enumerated");
                Ok(Arc::new(relative))
            })
            .await?;
        Ok(paths)
    }
}

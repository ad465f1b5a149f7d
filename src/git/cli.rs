//! `GitBackend` backed by the `git` executable.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{GitBackend, RepoHandle};
use crate::error::GitError;

/// Default timeout for a single git invocation.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs git as a subprocess.
pub struct GitCliBackend {
    program: String,
    timeout: Duration,
}

impl GitCliBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Run git in `dir`, returning trimmed stdout.
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<String, GitError> {
        debug!(dir = %dir.display(), args = ?args, "Running git");

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(GitError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("git {} timed out after {:?}", args.join(" "), self.timeout),
                )));
            }
        };

        if !output.status.success() {
            return Err(GitError::CommandFailed {
                args: args.join(" "),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for GitCliBackend {
    fn default() -> Self {
        Self::new("git")
    }
}

#[async_trait]
impl GitBackend for GitCliBackend {
    async fn discover_root(&self, start: &Path) -> Result<RepoHandle, GitError> {
        let root = self.run(start, &["rev-parse", "--show-toplevel"]).await?;
        Ok(RepoHandle::new(PathBuf::from(root)))
    }

    async fn checkout(&self, repo: &RepoHandle, branch: &str) -> Result<(), GitError> {
        self.run(repo.root_path(), &["checkout", branch]).await?;
        Ok(())
    }

    async fn create_branch(
        &self,
        repo: &RepoHandle,
        name: &str,
        checkout: bool,
    ) -> Result<(), GitError> {
        if checkout {
            self.run(repo.root_path(), &["checkout", "-b", name]).await?;
        } else {
            self.run(repo.root_path(), &["branch", name]).await?;
        }
        Ok(())
    }

    async fn undo_last_commit(&self, repo: &RepoHandle) -> Result<(), GitError> {
        self.run(repo.root_path(), &["reset", "--hard", "HEAD~1"])
            .await?;
        Ok(())
    }
}

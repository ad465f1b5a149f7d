//! Stub collaborators shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, broadcast};
use tokio::time::timeout;

use melty::bridge::{Event, MessageBridge};
use melty::config::SessionConfig;
use melty::context::FileContextSet;
use melty::editor::Editor;
use melty::error::{GenerationError, GitError, WorkspaceError};
use melty::generator::{GenerationRequest, Generator, PartialSink, Reply};
use melty::git::{GitBackend, GitBranchCoordinator, RepoHandle};
use melty::task::TaskRegistry;
use melty::workspace::{FileEnumerator, Glob, WorkspaceFileIndex};

pub const REPO_ROOT: &str = "/work/repo";
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Git stub: every repository lives at `REPO_ROOT`.
#[derive(Default)]
pub struct StubGit {
    pub calls: Mutex<Vec<String>>,
    /// Branch names whose checkout fails.
    pub failing_checkouts: Mutex<Vec<String>>,
    pub undo_fails: bool,
}

impl StubGit {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_checkout_of(&self, branch: &str) {
        self.failing_checkouts.lock().unwrap().push(branch.to_string());
    }
}

#[async_trait]
impl GitBackend for StubGit {
    async fn discover_root(&self, _start: &Path) -> Result<RepoHandle, GitError> {
        self.calls.lock().unwrap().push("discover".into());
        Ok(RepoHandle::new(REPO_ROOT))
    }

    async fn checkout(&self, _repo: &RepoHandle, branch: &str) -> Result<(), GitError> {
        self.calls.lock().unwrap().push(format!("checkout {}", branch));
        if self.failing_checkouts.lock().unwrap().iter().any(|b| b == branch) {
            return Err(GitError::CommandFailed {
                args: format!("checkout {}", branch),
                code: 1,
                stderr: "error: pathspec did not match".into(),
            });
        }
        Ok(())
    }

    async fn create_branch(
        &self,
        _repo: &RepoHandle,
        name: &str,
        _checkout: bool,
    ) -> Result<(), GitError> {
        self.calls.lock().unwrap().push(format!("create {}", name));
        Ok(())
    }

    async fn undo_last_commit(&self, _repo: &RepoHandle) -> Result<(), GitError> {
        self.calls.lock().unwrap().push("undo".into());
        if self.undo_fails {
            return Err(GitError::CommandFailed {
                args: "reset --hard HEAD~1".into(),
                code: 128,
                stderr: "ambiguous argument 'HEAD~1'".into(),
            });
        }
        Ok(())
    }
}

/// Enumerator stub returning fixed absolute paths and counting calls.
pub struct StubEnumerator {
    pub calls: AtomicUsize,
    pub files: Vec<PathBuf>,
}

impl StubEnumerator {
    pub fn with_files(relative: &[&str]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            files: relative.iter().map(|r| Path::new(REPO_ROOT).join(r)).collect(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileEnumerator for StubEnumerator {
    async fn find_files(
        &self,
        _include: &Glob,
        _exclude: &Glob,
    ) -> Result<Vec<PathBuf>, WorkspaceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.files.clone())
    }
}

#[derive(Default)]
pub struct RecordingEditor {
    pub opened: Mutex<Vec<PathBuf>>,
}

impl Editor for RecordingEditor {
    fn open_document(&self, path: &Path) {
        self.opened.lock().unwrap().push(path.to_path_buf());
    }
}

/// Generator that streams fixed partials, optionally parks, then replies.
pub struct ScriptedGenerator {
    pub partials: Vec<String>,
    pub reply: Result<Reply, GenerationError>,
    /// When set, the generator waits for a notification after its partials.
    pub hold: Option<Arc<Notify>>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn replying(partials: &[&str], text: &str) -> Self {
        Self {
            partials: partials.iter().map(|p| p.to_string()).collect(),
            reply: Ok(Reply {
                text: text.to_string(),
                diff: None,
            }),
            hold: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(partials: &[&str], reason: &str) -> Self {
        Self {
            reply: Err(GenerationError::Failed {
                reason: reason.to_string(),
            }),
            ..Self::replying(partials, "")
        }
    }

    pub fn held(mut self, hold: Arc<Notify>) -> Self {
        self.hold = Some(hold);
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        request: GenerationRequest,
        partials: PartialSink,
    ) -> Result<Reply, GenerationError> {
        self.requests.lock().unwrap().push(request);
        for partial in &self.partials {
            partials.send(partial.clone()).await;
        }
        if let Some(hold) = &self.hold {
            hold.notified().await;
        }
        self.reply.clone()
    }
}

pub struct Harness {
    pub bridge: Arc<MessageBridge>,
    pub git: Arc<StubGit>,
    pub enumerator: Arc<StubEnumerator>,
    pub editor: Arc<RecordingEditor>,
    pub generator: Arc<ScriptedGenerator>,
}

pub fn config() -> SessionConfig {
    SessionConfig {
        workspace_root: PathBuf::from(REPO_ROOT),
        ..SessionConfig::default()
    }
}

/// Bridge over stub collaborators, with no task registered.
pub fn harness_with(git: StubGit, generator: ScriptedGenerator) -> Harness {
    let git = Arc::new(git);
    let enumerator = Arc::new(StubEnumerator::with_files(&["src/main.ts", "README.md"]));
    let editor = Arc::new(RecordingEditor::default());
    let generator = Arc::new(generator);

    let coordinator = GitBranchCoordinator::new(Arc::clone(&git) as Arc<dyn GitBackend>);
    let registry = Arc::new(TaskRegistry::new(&config(), coordinator));
    let index = WorkspaceFileIndex::new(
        Arc::clone(&enumerator) as Arc<dyn FileEnumerator>,
        "**/*",
        "**/node_modules/**",
    )
    .unwrap();

    let bridge = Arc::new(MessageBridge::new(
        registry,
        Arc::new(FileContextSet::new()),
        Arc::new(index),
        Arc::clone(&editor) as Arc<dyn Editor>,
        Arc::clone(&generator) as Arc<dyn Generator>,
    ));

    Harness {
        bridge,
        git,
        enumerator,
        editor,
        generator,
    }
}

pub fn harness() -> Harness {
    harness_with(StubGit::default(), ScriptedGenerator::replying(&[], "ok"))
}

/// Next event, failing the test if none arrives in time.
pub async fn next_event(rx: &mut broadcast::Receiver<Event>) -> Event {
    timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Skip events until one matches.
pub async fn wait_for(
    rx: &mut broadcast::Receiver<Event>,
    pred: impl Fn(&Event) -> bool,
) -> Event {
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return event;
        }
    }
}

//! Message bridge: maps UI commands onto session operations.
//!
//! Every command is handled to completion (or to the point a generation is
//! spawned) before the transport reads the next one. Results go out as
//! events on a broadcast channel; failures become an `error` event instead
//! of escaping the bridge.

pub mod protocol;
pub mod stdio;
pub mod ws;

pub use protocol::{Command, Event, PartialResponse, WireMessage};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EVENT_BUFFER_CAPACITY;
use crate::context::FileContextSet;
use crate::editor::Editor;
use crate::error::{Error, ProtocolError, Result, TaskError};
use crate::generator::{GenerationRequest, Generator, Mode, PartialSink};
use crate::task::{Message, Task, TaskRegistry};
use crate::workspace::WorkspaceFileIndex;

/// An in-flight generation bound to one task.
struct Generation {
    id: Uuid,
    handle: JoinHandle<()>,
}

type Generations = Arc<Mutex<HashMap<String, Generation>>>;

pub struct MessageBridge {
    registry: Arc<TaskRegistry>,
    files: Arc<FileContextSet>,
    index: Arc<WorkspaceFileIndex>,
    editor: Arc<dyn Editor>,
    generator: Arc<dyn Generator>,
    events: broadcast::Sender<Event>,
    generations: Generations,
}

impl MessageBridge {
    pub fn new(
        registry: Arc<TaskRegistry>,
        files: Arc<FileContextSet>,
        index: Arc<WorkspaceFileIndex>,
        editor: Arc<dyn Editor>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER_CAPACITY);
        Self {
            registry,
            files,
            index,
            editor,
            generator,
            events,
            generations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    fn emit(&self, event: Event) {
        // Zero receivers just means no UI is attached.
        let _ = self.events.send(event);
    }

    /// Parse and handle one raw JSON command.
    pub async fn handle_text(&self, text: &str) {
        match serde_json::from_str::<Command>(text) {
            Ok(command) => self.handle(command).await,
            Err(e) => {
                debug!(error = %e, text = text, "Unrecognized command from client");
                let err = Error::from(ProtocolError::InvalidCommand {
                    reason: e.to_string(),
                });
                self.emit(Event::error(&err));
            }
        }
    }

    /// Handle one command; failures are emitted as an `error` event.
    pub async fn handle(&self, command: Command) {
        let name = command.name();
        debug!(command = name, "Command received");
        if let Err(e) = self.dispatch(command).await {
            warn!(command = name, kind = ?e.kind(), error = %e, "Command failed");
            self.emit(Event::error(&e));
        }
    }

    async fn dispatch(&self, command: Command) -> Result<()> {
        match command {
            Command::Ask { text } => self.start_generation(Mode::Ask, text).await,
            Command::Code { text } => self.start_generation(Mode::Code, text).await,
            Command::ListMeltyFiles => {
                self.emit_melty_files().await;
                Ok(())
            }
            Command::ListWorkspaceFiles => {
                let task = self.registry.active_task().await?;
                let paths = self.index.paths(&task).await?;
                self.emit(Event::ListWorkspaceFiles {
                    workspace_file_paths: (*paths).clone(),
                });
                Ok(())
            }
            Command::AddMeltyFile { file_path } => {
                self.files.add(file_path).await;
                self.emit_melty_files().await;
                Ok(())
            }
            Command::DropMeltyFile { file_path } => {
                self.files.remove(&file_path).await;
                self.emit_melty_files().await;
                Ok(())
            }
            Command::LoadMessages => {
                let task = self.registry.active_task().await?;
                self.emit(Event::LoadMessages {
                    messages: task.messages().await,
                });
                Ok(())
            }
            Command::Undo => self.undo().await,
            Command::ResetTask => Err(TaskError::Unsupported {
                operation: "resetTask".to_string(),
            }
            .into()),
            Command::OpenFileInEditor { file_path } => {
                let task = self.registry.active_task().await?;
                let repo = task.init().await?;
                self.editor.open_document(&repo.root_path().join(file_path));
                Ok(())
            }
            Command::CreateTask { title } => {
                self.cancel_active_generation(None).await;
                let task_id = self.registry.create_task(&title).await?;
                self.emit_active_task(&task_id).await?;
                self.emit(Event::ListTasks {
                    tasks: self.registry.summaries().await,
                });
                Ok(())
            }
            Command::ListTasks => {
                self.emit(Event::ListTasks {
                    tasks: self.registry.summaries().await,
                });
                Ok(())
            }
            Command::SwitchTask { task_id } => {
                self.cancel_active_generation(Some(&task_id)).await;
                self.registry.switch_to_task(&task_id).await?;
                self.emit_active_task(&task_id).await?;
                self.emit(Event::LoadMessages {
                    messages: self.registry.conversation(&task_id).await?,
                });
                Ok(())
            }
        }
    }

    async fn emit_melty_files(&self) {
        self.emit(Event::ListMeltyFiles {
            melty_file_paths: self.files.list().await,
        });
    }

    async fn emit_active_task(&self, task_id: &str) -> Result<()> {
        let task = self.registry.get(task_id).await?;
        self.emit(Event::ActiveTask {
            task_id: task.id().to_string(),
            branch: task.branch_name().to_string(),
        });
        Ok(())
    }

    async fn undo(&self) -> Result<()> {
        let task = self.registry.active_task().await?;
        let repo = task.init().await?;
        self.registry.git().undo_last_commit(&repo).await?;
        task.conversation()
            .write()
            .await
            .append(Message::user("Undone commit"));
        info!(task_id = %task.id(), "Undo confirmed");
        self.emit(Event::ConfirmedUndo);
        Ok(())
    }

    /// Cancel the active task's generation unless `keep` names that task.
    async fn cancel_active_generation(&self, keep: Option<&str>) {
        if let Some(active) = self.registry.active_task_id().await
            && keep != Some(active.as_str())
        {
            self.cancel_generation(&active).await;
        }
    }

    /// Events that bring a subscriber up to date with current state.
    pub async fn snapshot(&self) -> Vec<Event> {
        let mut events = Vec::new();
        if let Some(task_id) = self.registry.active_task_id().await
            && let Ok(task) = self.registry.get(&task_id).await
        {
            events.push(Event::ActiveTask {
                task_id: task.id().to_string(),
                branch: task.branch_name().to_string(),
            });
            let conversation = task.conversation().read().await;
            events.push(Event::LoadMessages {
                messages: conversation.messages().to_vec(),
            });
            if let Some(partial) = conversation.partial() {
                events.push(Event::SetPartialResponse {
                    joule: PartialResponse {
                        message: partial.text.clone(),
                    },
                });
            }
        }
        events.push(Event::ListMeltyFiles {
            melty_file_paths: self.files.list().await,
        });
        events
    }

    /// Recover a subscriber that fell behind the event stream.
    ///
    /// Discards whatever is still buffered and returns a fresh snapshot
    /// instead. `None` once the channel is closed.
    pub async fn resync(&self, rx: &mut broadcast::Receiver<Event>) -> Option<Vec<Event>> {
        loop {
            match rx.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => return None,
            }
        }
        Some(self.snapshot().await)
    }

    /// Cancel the in-flight generation for `task_id`, if any.
    ///
    /// Returns whether something was cancelled.
    pub async fn cancel_generation(&self, task_id: &str) -> bool {
        let previous = self.generations.lock().await.remove(task_id);
        match previous {
            Some(previous) => {
                self.abort(task_id, previous).await;
                true
            }
            None => false,
        }
    }

    async fn abort(&self, task_id: &str, generation: Generation) {
        generation.handle.abort();
        let _ = generation.handle.await;
        if let Ok(task) = self.registry.get(task_id).await {
            task.conversation().write().await.clear_partial();
        }
        info!(task_id = task_id, generation_id = %generation.id, "Generation cancelled");
    }

    /// Whether a generation is in flight for `task_id`.
    pub async fn is_generating(&self, task_id: &str) -> bool {
        self.generations
            .lock()
            .await
            .get(task_id)
            .is_some_and(|g| !g.handle.is_finished())
    }

    async fn start_generation(&self, mode: Mode, prompt: String) -> Result<()> {
        let task = self.registry.active_task().await?;
        let repo = task.init().await?;

        // Held until the new generation is registered, so a second command
        // for the same task cannot interleave.
        let mut generations = self.generations.lock().await;
        if let Some(previous) = generations.remove(task.id()) {
            self.abort(task.id(), previous).await;
        }

        let user = Message::user(prompt.clone());
        task.conversation().write().await.append(user.clone());
        self.emit(Event::add_message(user));

        let request = GenerationRequest {
            task_id: task.id().to_string(),
            mode,
            prompt,
            history: task.messages().await,
            files: self.files.list().await,
            repo_root: repo.root_path().to_path_buf(),
        };

        let id = Uuid::new_v4();
        info!(task_id = %task.id(), generation_id = %id, mode = %mode, "Generation started");
        let handle = tokio::spawn(run_generation(
            id,
            Arc::clone(&task),
            Arc::clone(&self.generator),
            request,
            self.events.clone(),
            Arc::clone(&self.generations),
        ));
        generations.insert(task.id().to_string(), Generation { id, handle });
        Ok(())
    }
}

async fn run_generation(
    id: Uuid,
    task: Arc<Task>,
    generator: Arc<dyn Generator>,
    request: GenerationRequest,
    events: broadcast::Sender<Event>,
    generations: Generations,
) {
    let sink = PartialSink::new(Arc::clone(&task), events.clone());
    match generator.generate(request, sink).await {
        Ok(reply) => {
            let message = reply.into_message();
            task.conversation().write().await.finalize(message.clone());
            info!(task_id = %task.id(), generation_id = %id, "Generation finished");
            let _ = events.send(Event::add_message(message));
        }
        Err(e) => {
            task.conversation().write().await.clear_partial();
            warn!(task_id = %task.id(), generation_id = %id, error = %e, "Generation failed");
            let _ = events.send(Event::error(&Error::from(e)));
        }
    }

    let mut generations = generations.lock().await;
    if generations.get(task.id()).is_some_and(|g| g.id == id) {
        generations.remove(task.id());
    }
}

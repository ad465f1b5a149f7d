//! Response generation backend.
//!
//! A `Generator` turns a user prompt into a bot reply, streaming partial
//! text through a [`PartialSink`] as it goes. The bridge owns the lifecycle
//! (spawning, cancelling, finalizing); generators only produce text.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::bridge::protocol::{Event, PartialResponse};
use crate::error::GenerationError;
use crate::task::{Message, Task};

/// How the reply is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Answer without touching the repository.
    Ask,
    /// Propose and apply a change.
    Code,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ask => write!(f, "ask"),
            Self::Code => write!(f, "code"),
        }
    }
}

/// Everything a generator sees for one cycle.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub task_id: String,
    pub mode: Mode,
    pub prompt: String,
    /// Transcript up to and including the prompt message.
    pub history: Vec<Message>,
    /// Context-set paths, repository-relative.
    pub files: Vec<String>,
    pub repo_root: PathBuf,
}

/// Final output of a generation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub diff: Option<String>,
}

impl Reply {
    pub fn into_message(self) -> Message {
        let message = Message::bot(self.text);
        match self.diff {
            Some(diff) => message.with_diff(diff),
            None => message,
        }
    }
}

/// Streams partial text for one task.
///
/// Every call replaces the task's partial slot and fans the text out as a
/// `setPartialResponse` event.
#[derive(Clone)]
pub struct PartialSink {
    task: Arc<Task>,
    events: broadcast::Sender<Event>,
}

impl PartialSink {
    pub fn new(task: Arc<Task>, events: broadcast::Sender<Event>) -> Self {
        Self { task, events }
    }

    pub async fn send(&self, text: impl Into<String>) {
        let text = text.into();
        self.task
            .conversation()
            .write()
            .await
            .set_partial(text.clone());
        // No subscribers is not an error; the partial is still recorded.
        let _ = self.events.send(Event::SetPartialResponse {
            joule: PartialResponse { message: text },
        });
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        request: GenerationRequest,
        partials: PartialSink,
    ) -> Result<Reply, GenerationError>;
}

/// Streams the prompt back word by word.
pub struct EchoGenerator {
    delay: Duration,
}

impl EchoGenerator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for EchoGenerator {
    fn default() -> Self {
        Self::new(Duration::from_millis(30))
    }
}

#[async_trait]
impl Generator for EchoGenerator {
    async fn generate(
        &self,
        request: GenerationRequest,
        partials: PartialSink,
    ) -> Result<Reply, GenerationError> {
        debug!(task_id = %request.task_id, mode = %request.mode, "Echo generation started");

        let mut text = String::new();
        for word in request.prompt.split_whitespace() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(word);
            partials.send(text.clone()).await;
            tokio::time::sleep(self.delay).await;
        }

        if request.files.is_empty() {
            Ok(Reply { text, diff: None })
        } else {
            Ok(Reply {
                text: format!("{}\n\nFiles in context: {}", text, request.files.join(", ")),
                diff: None,
            })
        }
    }
}

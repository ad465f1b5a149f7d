//! Wire types exchanged with the UI.
//!
//! Both directions are JSON objects discriminated by a `command` field.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::task::{Message, Sender, TaskSummary};

/// Inbound command (UI → backend).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    Ask { text: String },
    Code { text: String },
    ListMeltyFiles,
    ListWorkspaceFiles,
    AddMeltyFile { file_path: String },
    DropMeltyFile { file_path: String },
    LoadMessages,
    Undo,
    ResetTask,
    OpenFileInEditor { file_path: String },
    CreateTask { title: String },
    ListTasks,
    SwitchTask { task_id: String },
}

impl Command {
    /// Wire name of the command, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ask { .. } => "ask",
            Self::Code { .. } => "code",
            Self::ListMeltyFiles => "listMeltyFiles",
            Self::ListWorkspaceFiles => "listWorkspaceFiles",
            Self::AddMeltyFile { .. } => "addMeltyFile",
            Self::DropMeltyFile { .. } => "dropMeltyFile",
            Self::LoadMessages => "loadMessages",
            Self::Undo => "undo",
            Self::ResetTask => "resetTask",
            Self::OpenFileInEditor { .. } => "openFileInEditor",
            Self::CreateTask { .. } => "createTask",
            Self::ListTasks => "listTasks",
            Self::SwitchTask { .. } => "switchTask",
        }
    }
}

/// A message as carried by `addMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub message: String,
    pub sender: Sender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl From<Message> for WireMessage {
    fn from(m: Message) -> Self {
        Self {
            message: m.text,
            sender: m.sender,
            diff: m.diff,
        }
    }
}

/// Payload of `setPartialResponse`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialResponse {
    pub message: String,
}

/// Outbound event (backend → UI).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Event {
    AddMessage { text: WireMessage },
    SetPartialResponse { joule: PartialResponse },
    ListMeltyFiles { melty_file_paths: Vec<String> },
    ListWorkspaceFiles { workspace_file_paths: Vec<String> },
    LoadMessages { messages: Vec<Message> },
    ConfirmedUndo,
    ListTasks { tasks: Vec<TaskSummary> },
    ActiveTask { task_id: String, branch: String },
    Error { kind: ErrorKind, message: String },
}

impl Event {
    pub fn add_message(message: Message) -> Self {
        Self::AddMessage {
            text: message.into(),
        }
    }

    pub fn error(err: &crate::error::Error) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

//! Error types for the session manager.

use serde::{Deserialize, Serialize};

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),
}

impl Error {
    /// Wire-level classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Internal,
            Self::Task(e) => e.kind(),
            Self::Git(GitError::ExtensionNotFound) => ErrorKind::GitExtensionNotFound,
            Self::Git(_) => ErrorKind::GitFailed,
            Self::Workspace(_) => ErrorKind::WorkspaceFailed,
            Self::Protocol(_) => ErrorKind::InvalidCommand,
            Self::Generation(_) => ErrorKind::GenerationFailed,
        }
    }
}

/// Error classification carried by the outbound `error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    NoActiveTask,
    InitializationFailed,
    GitExtensionNotFound,
    Unsupported,
    InvalidInput,
    InvalidCommand,
    GitFailed,
    WorkspaceFailed,
    GenerationFailed,
    Internal,
}

/// Task lifecycle errors.
///
/// Cloneable so a single in-flight initialization can hand the same
/// outcome to every caller awaiting it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("Task with id {id} not found")]
    NotFound { id: String },

    #[error("No active task")]
    NoActiveTask,

    #[error("Repository initialization failed: {reason}")]
    InitializationFailed { reason: String },

    #[error("Git extension not found")]
    GitExtensionNotFound,

    #[error("{operation} is not supported")]
    Unsupported { operation: String },

    #[error("Task title must not be empty")]
    InvalidTitle,
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::NoActiveTask => ErrorKind::NoActiveTask,
            Self::InitializationFailed { .. } => ErrorKind::InitializationFailed,
            Self::GitExtensionNotFound => ErrorKind::GitExtensionNotFound,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::InvalidTitle => ErrorKind::InvalidInput,
        }
    }
}

/// Version-control collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("Git extension not found")]
    ExtensionNotFound,

    #[error("git {args} exited with code {code}: {stderr}")]
    CommandFailed {
        args: String,
        code: i32,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Workspace enumeration errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkspaceError {
    #[error("File enumeration failed: {reason}")]
    EnumerationFailed { reason: String },

    #[error("Invalid glob {pattern}: {reason}")]
    InvalidGlob { pattern: String, reason: String },
}

/// Inbound protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid command: {reason}")]
    InvalidCommand { reason: String },
}

/// Backend generation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation failed: {reason}")]
    Failed { reason: String },
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the session manager.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_errors_map_to_wire_kinds() {
        let err = Error::from(TaskError::NotFound { id: "task_9".into() });
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Task error: Task with id task_9 not found");

        let err = Error::from(TaskError::Unsupported {
            operation: "resetTask".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn missing_git_backend_is_distinguished_from_command_failure() {
        assert_eq!(
            Error::from(GitError::ExtensionNotFound).kind(),
            ErrorKind::GitExtensionNotFound
        );
        let failed = GitError::CommandFailed {
            args: "checkout task/x".into(),
            code: 1,
            stderr: "pathspec did not match".into(),
        };
        assert_eq!(Error::from(failed).kind(), ErrorKind::GitFailed);
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::GitExtensionNotFound).unwrap();
        assert_eq!(json, "\"git_extension_not_found\"");
    }
}

//! Configuration types.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Capacity of the outbound event fan-out channel.
pub const EVENT_BUFFER_CAPACITY: usize = 256;

/// How the bridge talks to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// WebSocket server at `/ws`.
    WebSocket,
    /// One JSON command per stdin line, one JSON event per stdout line.
    Stdio,
}

impl std::str::FromStr for Transport {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ws" | "websocket" => Ok(Self::WebSocket),
            "stdio" => Ok(Self::Stdio),
            _ => Err(format!("Unknown transport: {}", s)),
        }
    }
}

/// Session manager configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory the editor has open; repository discovery starts here.
    pub workspace_root: PathBuf,
    /// WebSocket listen port.
    pub port: u16,
    /// Prefix prepended to every derived branch name.
    pub branch_prefix: String,
    /// Glob of files included in the workspace index.
    pub include_glob: String,
    /// Glob of files excluded from the workspace index.
    pub exclude_glob: String,
    /// Create (and check out) a branch when a task is created.
    pub create_branches: bool,
    /// Title of the task registered at startup, if any.
    pub default_task_title: Option<String>,
    /// Program used to open files; `None` only logs the request.
    pub editor_command: Option<String>,
    /// Git executable.
    pub git_program: String,
    pub transport: Transport,
    /// Directory for rolling log files (stderr only when unset).
    pub log_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            port: 8080,
            branch_prefix: "task/".to_string(),
            include_glob: "**/*".to_string(),
            exclude_glob: "**/node_modules/**".to_string(),
            create_branches: true,
            default_task_title: Some("task 1".to_string()),
            editor_command: None,
            git_program: "git".to_string(),
            transport: Transport::WebSocket,
            log_dir: None,
        }
    }
}

impl SessionConfig {
    /// Load configuration from `MELTY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.workspace_root = match lookup("MELTY_WORKSPACE") {
            Some(path) => PathBuf::from(path),
            None => std::env::current_dir()?,
        };

        if let Some(port) = lookup("MELTY_WS_PORT") {
            config.port = port.parse().map_err(|e| ConfigError::InvalidValue {
                key: "MELTY_WS_PORT".to_string(),
                message: format!("{}", e),
            })?;
        }

        if let Some(prefix) = lookup("MELTY_BRANCH_PREFIX") {
            config.branch_prefix = prefix;
        }
        if let Some(glob) = lookup("MELTY_INCLUDE_GLOB") {
            config.include_glob = glob;
        }
        if let Some(glob) = lookup("MELTY_EXCLUDE_GLOB") {
            config.exclude_glob = glob;
        }

        if let Some(flag) = lookup("MELTY_CREATE_BRANCHES") {
            config.create_branches = parse_bool("MELTY_CREATE_BRANCHES", &flag)?;
        }

        if let Some(title) = lookup("MELTY_DEFAULT_TASK") {
            let title = title.trim().to_string();
            config.default_task_title = (!title.is_empty()).then_some(title);
        }

        config.editor_command = lookup("MELTY_EDITOR").filter(|s| !s.trim().is_empty());

        if let Some(git) = lookup("MELTY_GIT") {
            config.git_program = git;
        }

        if let Some(transport) = lookup("MELTY_TRANSPORT") {
            config.transport = transport
                .parse()
                .map_err(|message| ConfigError::InvalidValue {
                    key: "MELTY_TRANSPORT".to_string(),
                    message,
                })?;
        }

        config.log_dir = lookup("MELTY_LOG_DIR").map(PathBuf::from);

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {:?}", other),
        }),
    }
}

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use melty::bridge::{MessageBridge, stdio, ws};
use melty::config::{SessionConfig, Transport};
use melty::context::FileContextSet;
use melty::editor::CommandEditor;
use melty::generator::EchoGenerator;
use melty::git::{GitBranchCoordinator, GitCliBackend};
use melty::task::TaskRegistry;
use melty::workspace::{FsFileEnumerator, WorkspaceFileIndex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SessionConfig::from_env().context("Failed to load configuration")?;

    // Initialize tracing; stdout carries protocol events in stdio mode, so logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let (file_layer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "melty.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    tracing::info!(
        workspace = %config.workspace_root.display(),
        transport = ?config.transport,
        "Starting melty"
    );

    let git = GitBranchCoordinator::new(Arc::new(GitCliBackend::new(config.git_program.clone())));
    let registry = Arc::new(TaskRegistry::new(&config, git));
    if let Some(title) = &config.default_task_title {
        let task_id = registry
            .seed_task(title)
            .await
            .context("Failed to register default task")?;
        tracing::info!(task_id = %task_id, "Default task registered");
    }

    let index = WorkspaceFileIndex::new(
        Arc::new(FsFileEnumerator::new(config.workspace_root.clone())),
        &config.include_glob,
        &config.exclude_glob,
    )
    .context("Invalid workspace glob")?;

    let bridge = Arc::new(MessageBridge::new(
        registry,
        Arc::new(FileContextSet::new()),
        Arc::new(index),
        Arc::new(CommandEditor::new(config.editor_command.clone())),
        Arc::new(EchoGenerator::default()),
    ));

    match config.transport {
        Transport::WebSocket => {
            let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
                .await
                .with_context(|| format!("Failed to bind port {}", config.port))?;
            ws::serve(bridge, listener).await?;
        }
        Transport::Stdio => stdio::run_stdio(bridge).await?,
    }

    Ok(())
}

//! Line-oriented transport: one JSON command per input line, one JSON event
//! per output line.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot};
use tracing::{error, info, warn};

use super::MessageBridge;
use super::protocol::Event;

async fn write_event<W: AsyncWrite + Unpin>(
    writer: &mut W,
    event: &Event,
) -> std::io::Result<()> {
    let mut line = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize event");
            return Ok(());
        }
    };
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

/// Replace a lagged stretch of the stream with a state snapshot.
async fn write_resync<W: AsyncWrite + Unpin>(
    bridge: &MessageBridge,
    rx: &mut broadcast::Receiver<Event>,
    writer: &mut W,
    missed: u64,
) -> std::io::Result<bool> {
    warn!(missed = missed, "Stdio writer lagged behind event stream, resyncing");
    let Some(snapshot) = bridge.resync(rx).await else {
        return Ok(false);
    };
    for event in &snapshot {
        write_event(writer, event).await?;
    }
    Ok(true)
}

async fn write_events<W: AsyncWrite + Unpin>(
    bridge: Arc<MessageBridge>,
    mut rx: broadcast::Receiver<Event>,
    mut writer: W,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = rx.recv() => match result {
                Ok(event) => {
                    if write_event(&mut writer, &event).await.is_err() {
                        return;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    if !matches!(write_resync(&bridge, &mut rx, &mut writer, n).await, Ok(true)) {
                        return;
                    }
                }
                Err(RecvError::Closed) => return,
            },
            _ = &mut shutdown => break,
        }
    }

    // Drain whatever was emitted before input ended.
    loop {
        match rx.try_recv() {
            Ok(event) => {
                if write_event(&mut writer, &event).await.is_err() {
                    return;
                }
            }
            Err(TryRecvError::Lagged(n)) => {
                if !matches!(write_resync(&bridge, &mut rx, &mut writer, n).await, Ok(true)) {
                    return;
                }
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return,
        }
    }
}

/// Run the bridge over a reader/writer pair until the reader hits EOF.
///
/// Events emitted by the time input ends are written before returning.
/// Generations still in flight at that point are not waited for.
pub async fn run<R, W>(bridge: Arc<MessageBridge>, reader: R, writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let writer_task = tokio::spawn(write_events(
        Arc::clone(&bridge),
        bridge.subscribe(),
        writer,
        shutdown_rx,
    ));

    let mut lines = reader.lines();
    let outcome = loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                bridge.handle_text(line).await;
            }
            Ok(None) => break Ok(()),
            Err(e) => {
                error!("Error reading command stream: {}", e);
                break Err(e);
            }
        }
    };

    info!("Command stream closed");
    let _ = shutdown_tx.send(());
    let _ = writer_task.await;
    outcome
}

/// Run over the process's stdin/stdout.
pub async fn run_stdio(bridge: Arc<MessageBridge>) -> std::io::Result<()> {
    run(
        bridge,
        tokio::io::BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

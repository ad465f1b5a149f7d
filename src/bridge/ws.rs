//! WebSocket transport for the bridge.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use super::MessageBridge;
use super::protocol::Event;

/// Build the router: `/ws` for the command protocol, `/health` for liveness checks.
pub fn bridge_routes(bridge: Arc<MessageBridge>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(bridge)
}

/// Serve the bridge on `listener` until the server stops.
pub async fn serve(bridge: Arc<MessageBridge>, listener: TcpListener) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Bridge WebSocket server started");
    }
    axum::serve(listener, bridge_routes(bridge)).await
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "melty"
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(bridge): State<Arc<MessageBridge>>,
) -> impl IntoResponse {
    info!("WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, bridge))
}

async fn send_event(socket: &mut WebSocket, event: &Event) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize event");
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, bridge: Arc<MessageBridge>) {
    info!("WebSocket client connected");
    let mut rx = bridge.subscribe();

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if !send_event(&mut socket, &event).await {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind event stream, resyncing");
                        let Some(snapshot) = bridge.resync(&mut rx).await else {
                            break;
                        };
                        let mut delivered = true;
                        for event in &snapshot {
                            if !send_event(&mut socket, event).await {
                                delivered = false;
                                break;
                            }
                        }
                        if !delivered {
                            debug!("Client disconnected during resync");
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Event channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        bridge.handle_text(&text).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

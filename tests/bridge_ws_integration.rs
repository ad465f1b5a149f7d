//! Integration tests for the WebSocket transport.
//!
//! Each test spins up an Axum server on a random port, connects via
//! tokio-tungstenite, and drives the real command protocol.

mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_tungstenite::tungstenite::Message;

use common::{Harness, ScriptedGenerator, StubGit, harness, harness_with};
use melty::bridge::ws;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Start the server on a random port, return the port.
async fn start_server(h: &Harness) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let bridge = h.bridge.clone();

    tokio::spawn(async move {
        ws::serve(bridge, listener).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;
    port
}

async fn connect(port: u16) -> Client {
    let (ws, _resp) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
        .await
        .expect("WS connect failed");
    // Let the server subscribe before commands are sent.
    tokio::time::sleep(Duration::from_millis(20)).await;
    ws
}

async fn send(ws: &mut Client, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Next text frame as JSON.
async fn recv(ws: &mut Client) -> Value {
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(txt) => {
                return serde_json::from_str(&txt).expect("invalid JSON from server");
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected Text frame, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn health_endpoint_responds() {
    timeout(TEST_TIMEOUT, async {
        let h = harness();
        let port = start_server(&h).await;

        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(r#""service":"melty""#));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_create_task_then_mind_round_trip() {
    timeout(TEST_TIMEOUT, async {
        let h = harness();
        let port = start_server(&h).await;
        let mut ws = connect(port).await;

        send(&mut ws, json!({"command": "createTask", "title": "Fix login bug"})).await;
        let active = recv(&mut ws).await;
        assert_eq!(active["command"], "activeTask");
        assert_eq!(active["branch"], "task/Fix-login-bug");
        assert_eq!(recv(&mut ws).await["command"], "listTasks");

        send(&mut ws, json!({"command": "addMeltyFile", "filePath": "a.ts"})).await;
        assert_eq!(recv(&mut ws).await["meltyFilePaths"], json!(["a.ts"]));

        send(&mut ws, json!({"command": "dropMeltyFile", "filePath": "a.ts"})).await;
        assert_eq!(recv(&mut ws).await["meltyFilePaths"], json!([]));

        send(&mut ws, json!({"command": "listMeltyFiles"})).await;
        let listed = recv(&mut ws).await;
        assert_eq!(listed["command"], "listMeltyFiles");
        assert_eq!(listed["meltyFilePaths"], json!([]));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_streams_partials_before_final_message() {
    timeout(TEST_TIMEOUT, async {
        let h = harness_with(
            StubGit::default(),
            ScriptedGenerator::replying(&["a", "a b", "a b c"], "a b c d"),
        );
        let port = start_server(&h).await;
        let mut ws = connect(port).await;

        send(&mut ws, json!({"command": "createTask", "title": "T1"})).await;
        recv(&mut ws).await;
        recv(&mut ws).await;

        send(&mut ws, json!({"command": "ask", "text": "hello"})).await;
        let user = recv(&mut ws).await;
        assert_eq!(
            user,
            json!({"command": "addMessage", "text": {"message": "hello", "sender": "user"}})
        );

        for partial in ["a", "a b", "a b c"] {
            let event = recv(&mut ws).await;
            assert_eq!(event["command"], "setPartialResponse");
            assert_eq!(event["joule"]["message"], partial);
        }

        let bot = recv(&mut ws).await;
        assert_eq!(bot["command"], "addMessage");
        assert_eq!(bot["text"]["sender"], "bot");
        assert_eq!(bot["text"]["message"], "a b c d");

        send(&mut ws, json!({"command": "loadMessages"})).await;
        let loaded = recv(&mut ws).await;
        assert_eq!(
            loaded["messages"],
            json!([
                {"text": "hello", "sender": "user"},
                {"text": "a b c d", "sender": "bot"}
            ])
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_errors_are_events_not_disconnects() {
    timeout(TEST_TIMEOUT, async {
        let h = harness();
        let port = start_server(&h).await;
        let mut ws = connect(port).await;

        ws.send(Message::Text("not json".into())).await.unwrap();
        let event = recv(&mut ws).await;
        assert_eq!(event["command"], "error");
        assert_eq!(event["kind"], "invalid_command");

        send(&mut ws, json!({"command": "switchTask", "taskId": "task_nope"})).await;
        let event = recv(&mut ws).await;
        assert_eq!(event["kind"], "not_found");

        send(&mut ws, json!({"command": "resetTask"})).await;
        let event = recv(&mut ws).await;
        assert_eq!(event["kind"], "unsupported");

        // Connection still usable.
        send(&mut ws, json!({"command": "listTasks"})).await;
        let event = recv(&mut ws).await;
        assert_eq!(event, json!({"command": "listTasks", "tasks": []}));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_events_fan_out_to_every_client() {
    timeout(TEST_TIMEOUT, async {
        let h = harness();
        let port = start_server(&h).await;
        let mut first = connect(port).await;
        let mut second = connect(port).await;

        send(&mut first, json!({"command": "addMeltyFile", "filePath": "b.ts"})).await;
        assert_eq!(recv(&mut first).await["meltyFilePaths"], json!(["b.ts"]));
        assert_eq!(recv(&mut second).await["meltyFilePaths"], json!(["b.ts"]));
    })
    .await
    .expect("test timed out");
}

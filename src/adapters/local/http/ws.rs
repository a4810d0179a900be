//! `GET /ws`: the flow protocol over a WebSocket.
//!
//! The server greets every connection with `{"type": "handshake"}`. Clients
//! send JSON messages carrying a `type` and an opaque `messageId`:
//!
//! - `handshake` is answered with `{"type": "handshake", "messageId"}`
//! - `flow` with a `path` locator streams job snapshots, each tagged with
//!   the request's `messageId`
//!
//! Failures are sent as `{"messageId", "type": "error", "message"}`.

use super::flow::follow;
use crate::application::FlowService;
use crate::ports::{ComputationEngine, DocumentStore, ObjectStore, VideoProber};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Request {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message_id: Value,
    path: Option<String>,
}

pub async fn upgrade<D, O, E, P>(
    State(service): State<FlowService<D, O, E, P>>,
    ws: WebSocketUpgrade,
) -> Response
where
    D: DocumentStore + 'static,
    O: ObjectStore + 'static,
    E: ComputationEngine + 'static,
    P: VideoProber + 'static,
{
    ws.on_upgrade(move |socket| session(service, socket))
}

async fn session<D, O, E, P>(service: FlowService<D, O, E, P>, socket: WebSocket)
where
    D: DocumentStore + 'static,
    O: ObjectStore + 'static,
    E: ComputationEngine + 'static,
    P: VideoProber + 'static,
{
    let (mut sink, mut incoming) = socket.split();
    let (frames, mut outgoing) = unbounded_channel::<Value>();

    // Flows answer concurrently; one writer owns the socket.
    tokio::spawn(async move {
        while let Some(frame) = outgoing.recv().await {
            if sink.send(Message::Text(frame.to_string())).await.is_err() {
                break;
            }
        }
    });

    let _ = frames.send(json!({ "type": "handshake" }));
    while let Some(Ok(message)) = incoming.next().await {
        match message {
            Message::Text(text) => respond(&service, &frames, &text),
            Message::Close(_) => break,
            _ => {}
        }
    }
    debug!("WebSocket session closed");
}

/// Answer one client message; `flow` requests continue in the background.
fn respond<D, O, E, P>(
    service: &FlowService<D, O, E, P>,
    frames: &UnboundedSender<Value>,
    text: &str,
) where
    D: DocumentStore + 'static,
    O: ObjectStore + 'static,
    E: ComputationEngine + 'static,
    P: VideoProber + 'static,
{
    let request: Request = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => {
            let _ = frames.send(json!({ "type": "error", "message": e.to_string() }));
            return;
        }
    };

    match (request.kind.as_str(), request.path) {
        ("handshake", _) => {
            let _ = frames.send(json!({ "type": "handshake", "messageId": request.message_id }));
        }
        ("flow", Some(path)) => {
            let service = service.clone();
            let frames = frames.clone();
            let message_id = request.message_id;
            tokio::spawn(async move {
                let snapshots = match follow(service, path.trim_start_matches('/')).await {
                    Ok(snapshots) => snapshots,
                    Err(e) => {
                        let _ = frames.send(error_frame(&message_id, &e.to_string()));
                        return;
                    }
                };
                snapshots
                    .for_each(|snapshot| {
                        let frame = match snapshot.and_then(|job| Ok(serde_json::to_value(job)?)) {
                            Ok(mut job) => {
                                job["messageId"] = message_id.clone();
                                job
                            }
                            Err(e) => error_frame(&message_id, &e.to_string()),
                        };
                        let _ = frames.send(frame);
                        async {}
                    })
                    .await;
            });
        }
        ("flow", None) => {
            let _ = frames.send(error_frame(&request.message_id, "Missing flow path"));
        }
        (other, _) => {
            warn!("Unknown WebSocket message type {:?}", other);
            let message = format!("Unknown message type: {}", other);
            let _ = frames.send(error_frame(&request.message_id, &message));
        }
    }
}

fn error_frame(message_id: &Value, message: &str) -> Value {
    json!({ "messageId": message_id, "type": "error", "message": message })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::service;
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    const LOCATOR: &str = "http/cdn.example.com/clip.mp4";

    fn channel() -> (UnboundedSender<Value>, UnboundedReceiver<Value>) {
        unbounded_channel()
    }

    #[tokio::test]
    async fn test_handshake_echoes_message_id() {
        let (frames, mut rx) = channel();
        respond(&service(10), &frames, r#"{"type": "handshake", "messageId": 7}"#);
        assert_eq!(
            rx.recv().await.unwrap(),
            json!({ "type": "handshake", "messageId": 7 })
        );
    }

    #[tokio::test]
    async fn test_flow_snapshots_are_tagged() {
        let (frames, mut rx) = channel();
        let request = json!({ "type": "flow", "messageId": "abc", "path": LOCATOR });
        respond(&service(900), &frames, &request.to_string());
        drop(frames);

        let mut received = Vec::new();
        while let Some(frame) = rx.recv().await {
            received.push(frame);
        }
        assert!(received.iter().all(|frame| frame["messageId"] == "abc"));
        assert_eq!(received.first().unwrap()["status"], "queued");
        let last = received.last().unwrap();
        assert_eq!(last["status"], "done");
        assert_eq!(last["nbBlocks"], 3);
    }

    #[tokio::test]
    async fn test_flow_failure_is_an_error_frame() {
        let (frames, mut rx) = channel();
        let request = json!({ "type": "flow", "messageId": 3, "path": "gopher/host/clip" });
        respond(&service(10), &frames, &request.to_string());

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame["type"], "error");
        assert_eq!(frame["messageId"], 3);
        assert!(frame["message"].as_str().unwrap().contains("Invalid source locator"));
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_messages() {
        let (frames, mut rx) = channel();
        let service = service(10);

        respond(&service, &frames, r#"{"type": "dance", "messageId": 1}"#);
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame["message"], "Unknown message type: dance");

        respond(&service, &frames, "not json");
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame["type"], "error");
        assert!(frame.get("messageId").is_none());

        respond(&service, &frames, r#"{"type": "flow", "messageId": 2}"#);
        assert_eq!(rx.recv().await.unwrap()["message"], "Missing flow path");
    }
}

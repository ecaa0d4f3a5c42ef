use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use matchcut_core::types::DbId;
use matchcut_events::{JobEvent, ProgressHub};

use crate::state::AppState;
use crate::ws::manager::{WsManager, WsSender};

/// Inbound client message: subscribe to one job's progress stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Subscribe { job_id: DbId },
}

/// HTTP handler that upgrades the connection to WebSocket.
///
/// After the upgrade the connection is registered with `WsManager` and
/// managed by two spawned tasks (sender + receiver).
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.ws_manager, state.progress))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with `WsManager`.
///   2. Spawns a sender task that forwards messages from the manager channel.
///   3. Processes inbound subscribe messages on the current task.
///   4. Cleans up on disconnect.
async fn handle_socket(socket: WebSocket, ws_manager: Arc<WsManager>, progress: Arc<ProgressHub>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    // Register and get the receiver for outbound messages.
    let mut rx = ws_manager.add(conn_id.clone()).await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Receiver loop: process inbound messages.
    let mut forwarders: Vec<tokio::task::JoinHandle<()>> = Vec::new();
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Subscribe { job_id }) => {
                    if let Some(sender) = ws_manager.sender(&conn_id).await {
                        forwarders.push(spawn_job_forwarder(
                            Arc::clone(&progress),
                            job_id,
                            sender,
                            conn_id.clone(),
                        ));
                    }
                }
                Err(e) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "Unparseable client message");
                }
            },
            Ok(_msg) => {
                // Binary and other frames carry no meaning in this protocol.
            }
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Clean up: remove connection and abort tasks.
    ws_manager.remove(&conn_id).await;
    send_task.abort();
    for task in forwarders {
        task.abort();
    }
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

/// Forward one job's progress stream to a connection: replay the log so
/// far, then live events until the terminal event or disconnect.
fn spawn_job_forwarder(
    progress: Arc<ProgressHub>,
    job_id: DbId,
    sender: WsSender,
    conn_id: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let Some((replay, mut live)) = progress.subscribe(job_id).await else {
            let payload = serde_json::json!({
                "type": "error",
                "message": format!("Unknown job id {job_id}"),
            });
            let _ = sender.send(Message::Text(payload.to_string().into()));
            return;
        };

        for event in &replay {
            if send_event(&sender, job_id, event).is_err() {
                return;
            }
        }
        if replay.iter().any(JobEvent::is_terminal) {
            return;
        }

        while let Ok(event) = live.recv().await {
            let terminal = event.is_terminal();
            if send_event(&sender, job_id, &event).is_err() || terminal {
                break;
            }
        }
        tracing::debug!(conn_id = %conn_id, job_id, "Job forwarder finished");
    })
}

/// Serialize a job event with its job id and push it to the connection.
fn send_event(
    sender: &WsSender,
    job_id: DbId,
    event: &JobEvent,
) -> Result<(), tokio::sync::mpsc::error::SendError<Message>> {
    let mut payload = serde_json::to_value(event).expect("JobEvent serializes");
    payload["job_id"] = serde_json::json!(job_id);
    sender.send(Message::Text(payload.to_string().into()))
}

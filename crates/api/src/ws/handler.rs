use std::sync::Arc;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use skyguard_store::distributor::{PushSession, PushSessionConfig, SessionMetadata};

use crate::state::AppState;

/// GET /ws/detections/{video_id}
///
/// Upgrades to a WebSocket push session delivering the job's accumulated
/// and live frame results per the streaming protocol (metadata, batches,
/// status heartbeats, final status).
pub async fn detections_ws_handler(
    ws: WebSocketUpgrade,
    Path(video_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, video_id))
}

/// Manage a single push session after upgrade.
///
/// Three tasks cooperate: the pump drives the `PushSession` and queues
/// protocol messages, the sender forwards queued messages to the socket
/// sink, and the current task watches for client close frames. Session
/// errors terminate this connection only; the underlying job is never
/// affected.
async fn handle_socket(socket: WebSocket, state: AppState, video_id: String) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, video_id = %video_id, "Detection stream connected");

    let (mut sink, mut stream) = socket.split();

    // Resolve the job before registering anything.
    let record = match state.catalog.find(&video_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            let error = serde_json::json!({
                "type": "error",
                "error": format!("Video {video_id} not found"),
            });
            let _ = sink.send(text_message(&error)).await;
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
        Err(e) => {
            tracing::error!(video_id = %video_id, error = %e, "Catalog lookup failed");
            let error = serde_json::json!({
                "type": "error",
                "error": "catalog unavailable",
            });
            let _ = sink.send(text_message(&error)).await;
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };

    let metadata = SessionMetadata {
        video_id: record.external_id.clone(),
        fps: record.fps,
        width: record.width,
        height: record.height,
        frame_count: (record.duration * record.fps).round() as i64,
        duration: record.duration,
    };

    let mut rx = state.ws_manager.add(conn_id.clone()).await;

    // Sender task: forward queued messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Pump task: drive the push session until it finishes.
    let pump_manager = Arc::clone(&state.ws_manager);
    let pump_conn_id = conn_id.clone();
    let pump_store = Arc::clone(&state.results);
    let pump_video_id = video_id.clone();
    let pump_task = tokio::spawn(async move {
        let mut session = PushSession::new(
            pump_store,
            pump_video_id,
            metadata,
            PushSessionConfig::default(),
        );
        while let Some(message) = session.next_message().await {
            let queued = match serde_json::to_value(&message) {
                Ok(value) => pump_manager.send_to(&pump_conn_id, text_message(&value)).await,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize stream message");
                    false
                }
            };
            if !queued {
                return;
            }
        }
        // Session complete: close the connection politely.
        let _ = pump_manager
            .send_to(&pump_conn_id, Message::Close(None))
            .await;
    });

    // Receiver loop: only close frames and errors matter here.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    state.ws_manager.remove(&conn_id).await;
    pump_task.abort();
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "Detection stream disconnected");
}

fn text_message(value: &serde_json::Value) -> Message {
    Message::Text(Utf8Bytes::from(value.to_string()))
}

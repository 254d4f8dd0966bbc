//! Event-bus WebSocket upgrade (spec §6 Event-bus transport).
//!
//! Grounded directly in the teacher's `websocket_handler` /
//! `handle_socket` pair: on upgrade, subscribe to the bus and forward
//! every published `Detection` as a JSON text frame until the client
//! disconnects or the bus is closed. No replay-on-connect (unlike the
//! teacher's signal backlog) — spec's bus is at-most-once fan-out, not
//! a durable stream; a client that wants history calls `GET
//! /detections` first.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use tracing::{info, warn};
use uuid::Uuid;

use crate::orchestrator::Orchestrator;

pub async fn events_handler(
    ws: WebSocketUpgrade,
    State(orchestrator): State<Arc<Orchestrator>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, orchestrator))
}

async fn handle_socket(mut socket: WebSocket, orchestrator: Arc<Orchestrator>) {
    let connection_id = Uuid::new_v4();
    let mut sub = orchestrator.bus().subscribe();
    info!(%connection_id, "event bus subscriber connected");

    loop {
        tokio::select! {
            detection = sub.recv() => {
                let Some(detection) = detection else {
                    break;
                };
                let msg = serde_json::to_string(&detection).unwrap_or_else(|e| {
                    warn!(%connection_id, error = %e, "failed to serialize detection for ws frame");
                    "{}".to_string()
                });
                if socket.send(Message::Text(msg)).await.is_err() {
                    break;
                }
            }
            Some(Ok(msg)) = socket.recv() => {
                if matches!(msg, Message::Close(_)) {
                    break;
                }
            }
        }
    }

    info!(%connection_id, "event bus subscriber disconnected");
}

//! WebSocket feed of relay events at `/api/ws/events`
//!
//! Clients subscribe to topics (`session.*`, `session.closed`, `*`). The
//! first subscription is answered with a snapshot of the active sessions.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::events::RelayEvent;
use crate::state::AppState;

/// Client-to-server message
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload")]
enum ClientMessage {
    #[serde(rename = "subscribe")]
    Subscribe { topics: Vec<String> },

    #[serde(rename = "unsubscribe")]
    Unsubscribe { topics: Vec<String> },

    #[serde(rename = "ping")]
    Ping,
}

pub async fn events_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut event_rx = state.events.subscribe();
    let mut topics: Vec<String> = vec![];
    let mut snapshot_sent = false;

    info!("Event client connected");

    let period = Duration::from_secs(30);
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = handle_client_message(&text, &mut topics) {
                            warn!("Invalid event client message: {}", e);
                        }

                        if !snapshot_sent && !topics.is_empty() {
                            let snapshot = sessions_snapshot(&state);
                            if sender.send(Message::Text(snapshot)).await.is_err() {
                                break;
                            }
                            snapshot_sent = true;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Event client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("Event client receive error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        if !should_send_event(&event, &topics) {
                            continue;
                        }
                        match serde_json::to_string(&event) {
                            Ok(json) => {
                                if sender.send(Message::Text(json)).await.is_err() {
                                    warn!("Failed to send event, disconnecting");
                                    break;
                                }
                            }
                            Err(e) => warn!("Failed to serialize event: {}", e),
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Event client lagged by {} events", n);
                        let error = RelayEvent::Error {
                            message: format!("Lagged by {} events", n),
                        };
                        if let Ok(json) = serde_json::to_string(&error) {
                            let _ = sender.send(Message::Text(json)).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    break;
                }
            }
        }
    }

    debug!("Event client handler exiting");
}

fn handle_client_message(text: &str, topics: &mut Vec<String>) -> Result<(), serde_json::Error> {
    match serde_json::from_str::<ClientMessage>(text)? {
        ClientMessage::Subscribe { topics: new_topics } => {
            debug!("Event client subscribed to {:?}", new_topics);
            *topics = new_topics;
        }
        ClientMessage::Unsubscribe { topics: removed } => {
            topics.retain(|t| !removed.contains(t));
        }
        ClientMessage::Ping => {}
    }
    Ok(())
}

fn should_send_event(event: &RelayEvent, topics: &[String]) -> bool {
    topics.iter().any(|topic| event.matches_topic(topic))
}

fn sessions_snapshot(state: &AppState) -> String {
    serde_json::json!({
        "event": "sessions.snapshot",
        "data": state.relay.sessions(),
    })
    .to_string()
}

//! Relay WebSocket endpoint
//!
//! `GET /?streamUrl=<descriptor>` upgrades to a binary WebSocket carrying
//! tagged frames from a dedicated transcoder.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

use crate::error::RelayError;
use crate::relay::{PeerClose, RelaySocket};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RelayQuery {
    #[serde(rename = "streamUrl")]
    stream_url: Option<String>,
}

/// Relay WebSocket upgrade handler
///
/// A missing or unparsable query still upgrades; the session then closes
/// the socket with a policy-violation code.
pub async fn relay_ws_handler(
    ws: Option<WebSocketUpgrade>,
    query: Option<Query<RelayQuery>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(ws) = ws else {
        return (
            StatusCode::UPGRADE_REQUIRED,
            "Connect with a WebSocket client: ws://<host>/?streamUrl=<source>",
        )
            .into_response();
    };

    let descriptor = query.and_then(|Query(q)| q.stream_url);
    let options = state.session_options();

    ws.on_upgrade(move |socket| async move {
        let outcome = state
            .relay
            .serve(socket, descriptor.as_deref(), options)
            .await;
        debug!("Relay connection finished: {:?}", outcome);
    })
}

#[async_trait]
impl RelaySocket for WebSocket {
    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), RelayError> {
        self.send(Message::Binary(frame))
            .await
            .map_err(|e| RelayError::TransportWrite(e.to_string()))
    }

    async fn ping(&mut self) -> Result<(), RelayError> {
        self.send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| RelayError::TransportWrite(e.to_string()))
    }

    async fn closed(&mut self) -> PeerClose {
        loop {
            match self.recv().await {
                Some(Ok(Message::Close(frame))) => return PeerClose::Closed(frame.map(|f| f.code)),
                // Clients have nothing to say; pings are answered by the transport
                Some(Ok(_)) => {}
                Some(Err(e)) => return PeerClose::Error(e.to_string()),
                None => return PeerClose::Closed(None),
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code,
            reason: Cow::Owned(reason.to_string()),
        };
        if let Err(e) = self.send(Message::Close(Some(frame))).await {
            debug!("Close frame not delivered: {}", e);
        }
    }
}

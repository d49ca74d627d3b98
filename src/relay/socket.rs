//! Outbound socket abstraction for relay sessions

use async_trait::async_trait;

use crate::error::RelayError;

/// Maximum close reason length allowed by the WebSocket protocol
const MAX_CLOSE_REASON: usize = 123;

/// How the peer side of a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerClose {
    /// Close frame received (with its code) or the stream ended
    Closed(Option<u16>),
    /// The connection failed while reading
    Error(String),
}

/// Message-oriented socket a relay session writes tagged frames to
///
/// All methods must be cancel-safe: the session supervisor races them
/// against transcoder output.
#[async_trait]
pub trait RelaySocket: Send {
    /// Send one tagged frame as a single binary message
    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), RelayError>;

    /// Transport-level keep-alive
    async fn ping(&mut self) -> Result<(), RelayError>;

    /// Resolve once the peer has gone away, discarding inbound traffic
    async fn closed(&mut self) -> PeerClose;

    /// Close with a status code; failures are ignored
    async fn close(&mut self, code: u16, reason: &str);
}

/// Truncate a close reason to what fits in a close frame
pub fn close_reason(reason: &str) -> String {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason.to_string();
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}

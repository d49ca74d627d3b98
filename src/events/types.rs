//! Relay event types
//!
//! Defines all event types that can be broadcast through the event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Relay event enumeration
///
/// Serialized as:
/// ```json
/// {
///   "event": "session.closed",
///   "data": { "session_id": "...", "reason": "client_closed", ... }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RelayEvent {
    /// Transcoder started and the session is forwarding frames
    #[serde(rename = "session.opened")]
    SessionOpened {
        session_id: Uuid,
        source: String,
        /// Transcoder process ID
        pid: Option<u32>,
    },

    /// Connection refused before any transcoder was started
    #[serde(rename = "session.rejected")]
    SessionRejected {
        session_id: Uuid,
        /// Error kind, e.g. "missing_source_descriptor", "launch_error"
        reason: String,
        message: String,
    },

    /// Session reached its terminal state
    #[serde(rename = "session.closed")]
    SessionClosed {
        session_id: Uuid,
        /// "client_closed", "upstream_terminated", "shutdown", or an error kind
        reason: String,
        /// Close code sent to the client, if a close frame was sent
        close_code: Option<u16>,
        frames: u64,
        bytes: u64,
        /// Whether the transcoder was confirmed dead before the session closed
        transcoder_terminated: bool,
        closed_at: DateTime<Utc>,
    },

    /// Error notification (e.g. a lagging subscriber)
    #[serde(rename = "error")]
    Error { message: String },
}

impl RelayEvent {
    /// Get the event name (for topic filtering)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::SessionOpened { .. } => "session.opened",
            Self::SessionRejected { .. } => "session.rejected",
            Self::SessionClosed { .. } => "session.closed",
            Self::Error { .. } => "error",
        }
    }

    /// Session this event belongs to, if any
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            Self::SessionOpened { session_id, .. }
            | Self::SessionRejected { session_id, .. }
            | Self::SessionClosed { session_id, .. } => Some(*session_id),
            Self::Error { .. } => None,
        }
    }

    /// Check if event matches a topic pattern
    ///
    /// Supports exact names, `prefix.*` wildcards and `*`.
    pub fn matches_topic(&self, topic: &str) -> bool {
        if topic == "*" {
            return true;
        }

        let name = self.event_name();
        match topic.strip_suffix(".*") {
            Some(prefix) => name
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.')),
            None => name == topic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_shape() {
        let event = RelayEvent::SessionRejected {
            session_id: Uuid::nil(),
            reason: "missing_source_descriptor".to_string(),
            message: "streamUrl query parameter required".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "session.rejected");
        assert_eq!(json["data"]["reason"], "missing_source_descriptor");
    }

    #[test]
    fn test_matches_topic() {
        let event = RelayEvent::SessionOpened {
            session_id: Uuid::nil(),
            source: "rtsp://cam1".to_string(),
            pid: Some(1),
        };

        assert!(event.matches_topic("*"));
        assert!(event.matches_topic("session.*"));
        assert!(event.matches_topic("session.opened"));
        assert!(!event.matches_topic("session.closed"));
        assert!(!event.matches_topic("sess.*"));
    }
}

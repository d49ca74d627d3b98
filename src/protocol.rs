//! Wire protocol between the relay and its clients
//!
//! Every server-to-client WebSocket message is a tagged frame:
//!
//! ```text
//! Bytes 0-7:   Origination time (f64 BE, milliseconds since UNIX epoch)
//! Bytes 8+:    Container bytes exactly as the transcoder wrote them
//! ```
//!
//! There are no sequence numbers, acknowledgements or heartbeats at this
//! level. A message carries whatever one read from the transcoder pipe
//! returned; reassembling the container is the decoder's job.

use bytes::{Buf, BufMut};
use thiserror::Error;

/// Size of the timestamp header in bytes
pub const TAG_LEN: usize = 8;

/// Normal closure (upstream ended)
pub const CLOSE_NORMAL: u16 = 1000;
/// Server going away (relay shutting down)
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Policy violation (missing or malformed streamUrl)
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Internal error (transcoder could not be started)
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Query parameter carrying the source descriptor
pub const STREAM_URL_PARAM: &str = "streamUrl";

#[derive(Error, Debug, PartialEq)]
pub enum FrameError {
    #[error("Frame too short: {0} bytes, need at least 8")]
    Truncated(usize),
}

/// A decoded frame borrowing its payload from the received message
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaggedFrame<'a> {
    /// Wall-clock time the relay read this chunk, in ms since the epoch
    pub origin_ms: f64,
    pub payload: &'a [u8],
}

impl TaggedFrame<'_> {
    /// Delay between origination and `received_at_ms`
    pub fn latency_ms(&self, received_at_ms: f64) -> f64 {
        received_at_ms - self.origin_ms
    }
}

/// Current wall-clock time in milliseconds since the UNIX epoch
pub fn now_millis() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1000.0
}

/// Tag a chunk with the current wall-clock time
pub fn tag(payload: &[u8]) -> Vec<u8> {
    tag_at(now_millis(), payload)
}

/// Tag a chunk with an explicit origination time
pub fn tag_at(origin_ms: f64, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TAG_LEN + payload.len());
    buf.put_f64(origin_ms);
    buf.extend_from_slice(payload);
    buf
}

/// Split a received message into timestamp and payload
pub fn decode(message: &[u8]) -> Result<TaggedFrame<'_>, FrameError> {
    if message.len() < TAG_LEN {
        return Err(FrameError::Truncated(message.len()));
    }
    let (mut header, payload) = message.split_at(TAG_LEN);
    Ok(TaggedFrame {
        origin_ms: header.get_f64(),
        payload,
    })
}

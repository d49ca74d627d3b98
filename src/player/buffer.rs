//! Decoder-side collaborators of the player
//!
//! The player never looks these up by itself; the caller hands them to
//! [`StreamClient::start_stream`](super::StreamClient::start_stream).

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Buffered span of the media timeline, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

/// Append failures. None of them end a stream.
#[derive(Debug, Error)]
pub enum BufferError {
    /// Decoder refused the chunk (malformed, incompatible or overflow)
    #[error("Decoder rejected chunk: {0}")]
    Rejected(String),

    /// Previous append still being processed
    #[error("Decoder buffer busy")]
    Busy,

    /// Buffer no longer attached to a playback surface
    #[error("Decoder buffer detached")]
    Detached,
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Playback start refused, e.g. by an autoplay policy
    #[error("Playback refused: {0}")]
    Refused(String),
}

/// Append-only, time-ranged buffer a media decoder consumes from
#[async_trait]
pub trait DecoderBuffer: Send + Sync {
    /// An append is still being processed by the decoder
    fn is_updating(&self) -> bool;

    /// Append one opaque chunk; resolves once the decoder has processed it
    async fn append(&self, chunk: Bytes) -> Result<(), BufferError>;

    /// Currently buffered ranges, in timeline order
    fn buffered(&self) -> Vec<TimeRange>;
}

/// Playback element bound to a [`DecoderBuffer`]
#[async_trait]
pub trait PlaybackSurface: Send + Sync {
    /// Playback position in seconds
    fn current_time(&self) -> f64;

    fn seek(&self, position: f64);

    fn is_paused(&self) -> bool;

    async fn play(&self) -> Result<(), PlaybackError>;

    /// Revoke the data source backing the decoder
    fn detach_source(&self);

    /// Last decoder error reported by the surface
    fn error(&self) -> Option<String> {
        None
    }
}

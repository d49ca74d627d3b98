//! Client side of the relay
//!
//! [`StreamClient`] reads tagged frames from the relay, [`BufferFeeder`]
//! pushes their payloads into a [`DecoderBuffer`] and
//! [`LiveEdgeCorrector`] keeps the [`PlaybackSurface`] at the live edge.

mod buffer;
mod client;
mod corrector;
mod feeder;
pub mod headless;

pub use buffer::{BufferError, DecoderBuffer, PlaybackError, PlaybackSurface, TimeRange};
pub use client::{ClientError, StreamClient, StreamEnd};
pub use corrector::{Correction, LiveEdgeCorrector, DEFAULT_DRIFT_THRESHOLD};
pub use feeder::{
    AppendPermit, AppendSlot, BufferFeeder, FeedDrop, FeedOutcome, FeederStats, LatencyWatch,
};
pub use headless::{HeadlessBuffer, HeadlessSurface};

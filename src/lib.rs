//! cam-relay - low-latency camera relay
//!
//! Relays live camera feeds (RTSP/RTMP/HTTP) to WebSocket clients through a
//! transcoder per connection. Every chunk of transcoder output is tagged
//! with its origination time so clients can measure latency and keep
//! playback at the live edge.

pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod player;
pub mod protocol;
pub mod relay;
pub mod state;
pub mod transcode;
pub mod utils;
pub mod web;

pub use error::{AppError, RelayError, Result};

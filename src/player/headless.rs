//! Decoder and surface stand-ins without any media stack
//!
//! Used by the `probe` command to measure relay latency from a terminal,
//! and by tests to script decoder behavior.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use super::buffer::{BufferError, DecoderBuffer, PlaybackError, PlaybackSurface, TimeRange};

#[derive(Default)]
struct BufferState {
    ranges: Vec<TimeRange>,
    chunks: Vec<Bytes>,
    reject: bool,
    keep_chunks: bool,
}

/// Buffer that accepts everything and counts it
#[derive(Default)]
pub struct HeadlessBuffer {
    state: Mutex<BufferState>,
    updating: AtomicBool,
    forced_updating: AtomicBool,
    appended_bytes: AtomicU64,
    appends: AtomicU64,
    append_delay: Option<Duration>,
}

/// Clears the updating flag even if the append is cancelled
struct UpdatingGuard<'a>(&'a AtomicBool);

impl Drop for UpdatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl HeadlessBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every append takes `delay` to complete
    pub fn with_append_delay(delay: Duration) -> Self {
        Self {
            append_delay: Some(delay),
            ..Default::default()
        }
    }

    /// Keep appended chunks for inspection
    pub fn keep_chunks(mut self) -> Self {
        self.state.get_mut().keep_chunks = true;
        self
    }

    pub fn set_ranges(&self, ranges: Vec<TimeRange>) {
        self.state.lock().ranges = ranges;
    }

    /// Reject every append as malformed
    pub fn reject_appends(&self, reject: bool) {
        self.state.lock().reject = reject;
    }

    /// Report busy regardless of appends in flight
    pub fn force_updating(&self, updating: bool) {
        self.forced_updating.store(updating, Ordering::Release);
    }

    pub fn appends(&self) -> u64 {
        self.appends.load(Ordering::Relaxed)
    }

    pub fn appended_bytes(&self) -> u64 {
        self.appended_bytes.load(Ordering::Relaxed)
    }

    pub fn chunks(&self) -> Vec<Bytes> {
        self.state.lock().chunks.clone()
    }
}

#[async_trait]
impl DecoderBuffer for HeadlessBuffer {
    fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire) || self.forced_updating.load(Ordering::Acquire)
    }

    async fn append(&self, chunk: Bytes) -> Result<(), BufferError> {
        if self.updating.swap(true, Ordering::AcqRel) {
            return Err(BufferError::Busy);
        }
        let _updating = UpdatingGuard(&self.updating);

        if let Some(delay) = self.append_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if state.reject {
            return Err(BufferError::Rejected(format!(
                "{} byte chunk is not a valid media segment",
                chunk.len()
            )));
        }
        self.appends.fetch_add(1, Ordering::Relaxed);
        self.appended_bytes
            .fetch_add(chunk.len() as u64, Ordering::Relaxed);
        if state.keep_chunks {
            state.chunks.push(chunk);
        }
        Ok(())
    }

    fn buffered(&self) -> Vec<TimeRange> {
        self.state.lock().ranges.clone()
    }
}

struct SurfaceState {
    position: f64,
    paused: bool,
    refuse_play: bool,
    detached: bool,
    error: Option<String>,
}

/// Playback surface with a manual clock
pub struct HeadlessSurface {
    state: Mutex<SurfaceState>,
    seeks: AtomicU64,
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self {
            state: Mutex::new(SurfaceState {
                position: 0.0,
                paused: false,
                refuse_play: false,
                detached: false,
                error: None,
            }),
            seeks: AtomicU64::new(0),
        }
    }
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.state.lock().paused = true;
    }

    /// Make `play` fail, like a browser blocking autoplay
    pub fn refuse_play(&self, refuse: bool) {
        self.state.lock().refuse_play = refuse;
    }

    pub fn set_error(&self, error: Option<String>) {
        self.state.lock().error = error;
    }

    pub fn is_detached(&self) -> bool {
        self.state.lock().detached
    }

    /// Number of seeks performed
    pub fn seeks(&self) -> u64 {
        self.seeks.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PlaybackSurface for HeadlessSurface {
    fn current_time(&self) -> f64 {
        self.state.lock().position
    }

    fn seek(&self, position: f64) {
        self.state.lock().position = position;
        self.seeks.fetch_add(1, Ordering::Relaxed);
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    async fn play(&self) -> Result<(), PlaybackError> {
        let mut state = self.state.lock();
        if state.refuse_play {
            return Err(PlaybackError::Refused("autoplay blocked".to_string()));
        }
        state.paused = false;
        Ok(())
    }

    fn detach_source(&self) {
        let mut state = self.state.lock();
        state.detached = true;
        state.paused = true;
    }

    fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }
}

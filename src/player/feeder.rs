//! Buffer Feeder
//!
//! Strips the timestamp from each received frame, publishes the latency and
//! hands the payload to the decoder buffer. Only one append is ever in
//! flight: a frame that arrives while the decoder is busy is dropped, never
//! queued.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::buffer::{DecoderBuffer, PlaybackSurface};
use super::corrector::LiveEdgeCorrector;
use crate::protocol::{self, TAG_LEN};
use crate::utils::LogThrottler;
use crate::warn_throttled;

/// Latest latency sample in milliseconds, `None` before the first frame
pub type LatencyWatch = watch::Receiver<Option<f64>>;

/// Why a frame was not appended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedDrop {
    /// Shorter than the timestamp header
    Malformed,
    /// Decoder still processing the previous append
    Busy,
    /// Feeder has been shut down
    Detached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Payload handed to the decoder buffer
    Accepted,
    Dropped(FeedDrop),
}

/// Single-slot gate for decoder appends
///
/// Acquisition is a compare-and-swap; a failed acquisition means the frame
/// is dropped.
#[derive(Debug, Default)]
pub struct AppendSlot {
    held: AtomicBool,
}

impl AppendSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<AppendPermit> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| AppendPermit { slot: self.clone() })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases the [`AppendSlot`] on drop
#[derive(Debug)]
pub struct AppendPermit {
    slot: Arc<AppendSlot>,
}

impl Drop for AppendPermit {
    fn drop(&mut self) {
        self.slot.held.store(false, Ordering::Release);
    }
}

/// Frame counters of one feeder
#[derive(Debug, Default)]
pub struct FeederStats {
    received: AtomicU64,
    appended: AtomicU64,
    dropped_busy: AtomicU64,
    dropped_malformed: AtomicU64,
    rejected: AtomicU64,
    seeks: AtomicU64,
}

impl FeederStats {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    pub fn dropped_busy(&self) -> u64 {
        self.dropped_busy.load(Ordering::Relaxed)
    }

    pub fn dropped_malformed(&self) -> u64 {
        self.dropped_malformed.load(Ordering::Relaxed)
    }

    /// Appends the decoder refused
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Live-edge seeks performed after appends
    pub fn seeks(&self) -> u64 {
        self.seeks.load(Ordering::Relaxed)
    }
}

pub struct BufferFeeder {
    buffer: Option<Arc<dyn DecoderBuffer>>,
    surface: Arc<dyn PlaybackSurface>,
    corrector: LiveEdgeCorrector,
    slot: Arc<AppendSlot>,
    latency: watch::Sender<Option<f64>>,
    stats: Arc<FeederStats>,
    throttler: Arc<LogThrottler>,
    inflight: Option<JoinHandle<()>>,
}

impl BufferFeeder {
    pub fn new(
        buffer: Arc<dyn DecoderBuffer>,
        surface: Arc<dyn PlaybackSurface>,
        corrector: LiveEdgeCorrector,
    ) -> Self {
        let (latency, _) = watch::channel(None);
        Self {
            buffer: Some(buffer),
            surface,
            corrector,
            slot: AppendSlot::new(),
            latency,
            stats: Arc::new(FeederStats::default()),
            throttler: Arc::new(LogThrottler::with_secs(5)),
            inflight: None,
        }
    }

    pub fn latency(&self) -> LatencyWatch {
        self.latency.subscribe()
    }

    pub fn stats(&self) -> Arc<FeederStats> {
        self.stats.clone()
    }

    /// Handle one binary message from the relay
    ///
    /// Must be called from within a tokio runtime; the append itself runs
    /// on a spawned task so the socket keeps being read.
    pub fn feed(&mut self, message: Bytes) -> FeedOutcome {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let latency = match protocol::decode(&message) {
            Ok(frame) => frame.latency_ms(protocol::now_millis()),
            Err(e) => {
                self.stats.dropped_malformed.fetch_add(1, Ordering::Relaxed);
                warn_throttled!(self.throttler, "malformed", "Dropping frame: {}", e);
                return FeedOutcome::Dropped(FeedDrop::Malformed);
            }
        };
        self.latency.send_replace(Some(latency));

        if let Some(error) = self.surface.error() {
            warn_throttled!(self.throttler, "surface_error", "Playback error: {}", error);
        }

        let Some(buffer) = self.buffer.clone() else {
            debug!("No decoder buffer, skipping chunk");
            return FeedOutcome::Dropped(FeedDrop::Detached);
        };

        let permit = match self.slot.try_acquire() {
            Some(permit) if !buffer.is_updating() => permit,
            _ => {
                self.stats.dropped_busy.fetch_add(1, Ordering::Relaxed);
                warn_throttled!(self.throttler, "busy", "Decoder buffer busy, dropping chunk");
                return FeedOutcome::Dropped(FeedDrop::Busy);
            }
        };

        let payload = message.slice(TAG_LEN..);
        let surface = self.surface.clone();
        let corrector = self.corrector;
        let stats = self.stats.clone();
        let throttler = self.throttler.clone();

        self.inflight = Some(tokio::spawn(async move {
            let _permit = permit;
            match buffer.append(payload).await {
                Ok(()) => {
                    stats.appended.fetch_add(1, Ordering::Relaxed);
                    let correction = corrector.correct(&*buffer, &*surface).await;
                    if correction.seeked_to.is_some() {
                        stats.seeks.fetch_add(1, Ordering::Relaxed);
                    }
                    trace!("Appended chunk, {:?}", correction);
                }
                Err(e) => {
                    stats.rejected.fetch_add(1, Ordering::Relaxed);
                    warn_throttled!(throttler, "rejected", "Append failed, dropping chunk: {}", e);
                }
            }
        }));

        FeedOutcome::Accepted
    }

    /// Wait for the in-flight append, if any
    pub async fn settle(&mut self) {
        if let Some(task) = self.inflight.take() {
            let _ = task.await;
        }
    }

    /// Abort any append in flight and release the decoder buffer
    pub async fn shutdown(&mut self) {
        if let Some(task) = self.inflight.take() {
            task.abort();
            let _ = task.await;
        }
        self.buffer = None;
    }

    pub fn is_attached(&self) -> bool {
        self.buffer.is_some()
    }
}

impl Drop for BufferFeeder {
    fn drop(&mut self) {
        if let Some(task) = self.inflight.take() {
            task.abort();
        }
    }
}

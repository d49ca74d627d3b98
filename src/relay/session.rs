//! Relay session state machine
//!
//! ```text
//! OPENING ──(descriptor missing/invalid)──────────────────────▶ CLOSED
//!    │
//!    ├──(launch failed)──────────────────────▶ CLOSING ──▶ CLOSED
//!    ▼                                            ▲
//! ACTIVE ──(peer closed | upstream ended | write failed |
//!           startup timeout | shutdown)───────────┘
//! ```
//!
//! The supervisor in [`RelaySession::supervise`] watches the socket and the
//! transcoder together; whichever side ends first decides the close reason,
//! and teardown always kills the transcoder and closes the socket before the
//! session is marked `Closed`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::pending;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::socket::{PeerClose, RelaySocket};
use crate::config::{AppConfig, TranscoderConfig};
use crate::error::RelayError;
use crate::protocol::{self, CLOSE_GOING_AWAY};
use crate::transcode::{Transcoder, UpstreamEvent};

/// Lifecycle state of a relay session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Opening,
    Active,
    Closing,
    Closed,
}

/// Why a session ended
#[derive(Debug)]
pub enum CloseReason {
    /// Client closed the socket or the connection dropped
    ClientClosed,
    /// Relay is shutting down
    Shutdown,
    /// Session-terminal error
    Failed(RelayError),
}

impl CloseReason {
    /// Close code to send, `None` when the socket can no longer carry one
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::ClientClosed => None,
            Self::Shutdown => Some(CLOSE_GOING_AWAY),
            Self::Failed(RelayError::TransportWrite(_)) => None,
            Self::Failed(e) => Some(e.close_code()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::Shutdown => "shutdown",
            Self::Failed(e) => e.kind(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::ClientClosed => "client disconnected".to_string(),
            Self::Shutdown => "relay shutting down".to_string(),
            Self::Failed(e) => e.to_string(),
        }
    }
}

/// Per-session settings, snapshotted from the configuration at connect time
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub transcoder: TranscoderConfig,
    pub startup_timeout: Option<Duration>,
    pub keepalive: Option<Duration>,
}

impl SessionOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            transcoder: config.transcoder.clone(),
            startup_timeout: config.relay.startup_timeout(),
            keepalive: config.relay.keepalive_interval(),
        }
    }
}

/// Forwarding counters
#[derive(Debug, Default)]
pub struct SessionStats {
    frames: AtomicU64,
    bytes: AtomicU64,
}

impl SessionStats {
    fn record(&self, payload_len: usize) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    /// Frames written to the socket
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Payload bytes written to the socket (headers excluded)
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// One client connection bound to one transcoder
pub struct RelaySession {
    id: Uuid,
    state: watch::Sender<SessionState>,
    stats: SessionStats,
    started_at: DateTime<Utc>,
}

impl RelaySession {
    pub fn new(id: Uuid) -> Self {
        let (state, _) = watch::channel(SessionState::Opening);
        Self {
            id,
            state,
            stats: SessionStats::default(),
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("[{}] {:?} -> {:?}", self.id, previous, state);
        }
    }

    /// Forward transcoder output to the socket until either side ends
    ///
    /// Each chunk is tagged and written as soon as it is read. Nothing is
    /// batched and a failed write is never retried.
    pub(crate) async fn supervise<S: RelaySocket + ?Sized>(
        &self,
        socket: &mut S,
        transcoder: &mut Transcoder,
        options: &SessionOptions,
        shutdown: &CancellationToken,
    ) -> CloseReason {
        let watchdog = startup_watchdog(options.startup_timeout.map(|t| Instant::now() + t));
        tokio::pin!(watchdog);

        let mut keepalive = options.keepalive.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => return CloseReason::Shutdown,

                peer = socket.closed() => {
                    match peer {
                        PeerClose::Closed(code) => {
                            info!("[{}] Client disconnected (code {:?})", self.id, code)
                        }
                        PeerClose::Error(e) => {
                            info!("[{}] Client connection failed: {}", self.id, e)
                        }
                    }
                    return CloseReason::ClientClosed;
                }

                event = transcoder.next_event() => match event {
                    UpstreamEvent::Chunk(chunk) => {
                        let frame = protocol::tag(&chunk);
                        if let Err(e) = socket.send_frame(frame).await {
                            return CloseReason::Failed(e);
                        }
                        self.stats.record(chunk.len());
                    }
                    UpstreamEvent::Ended(reason) => {
                        info!("[{}] Upstream ended: {}", self.id, reason);
                        return CloseReason::Failed(RelayError::UpstreamTerminated(reason));
                    }
                },

                _ = &mut watchdog, if self.stats.frames() == 0 => {
                    let timeout = options.startup_timeout.unwrap_or_default();
                    return CloseReason::Failed(RelayError::StartupTimeout(timeout));
                }

                _ = keepalive_tick(&mut keepalive) => {
                    if let Err(e) = socket.ping().await {
                        return CloseReason::Failed(e);
                    }
                }
            }
        }
    }
}

/// Completes at `deadline`, never when there is none
async fn startup_watchdog(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn keepalive_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

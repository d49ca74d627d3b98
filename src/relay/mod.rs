//! Relay sessions: one transcoder per client socket
//!
//! [`Relay::serve`] drives a connection from `OPENING` to `CLOSED`.
//! Sessions share nothing but the registry and the event bus, so any
//! number of them run side by side, each on its own task.

mod registry;
mod session;
mod socket;

pub use registry::{RegistryGuard, SessionInfo, SessionRegistry};
pub use session::{CloseReason, RelaySession, SessionOptions, SessionState, SessionStats};
pub use socket::{close_reason, PeerClose, RelaySocket};

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::RelayError;
use crate::events::{EventBus, RelayEvent};
use crate::protocol::CLOSE_GOING_AWAY;
use crate::transcode::{SourceDescriptor, TranscodeLauncher};

/// Final report of a session
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub id: Uuid,
    pub state: SessionState,
    /// "client_closed", "shutdown" or a [`RelayError`] kind
    pub reason: &'static str,
    pub close_code: Option<u16>,
    pub frames: u64,
    pub bytes: u64,
    pub transcoder_pid: Option<u32>,
    /// Transcoder confirmed dead before the session reached `Closed`
    pub transcoder_terminated: bool,
}

/// Relay service shared by all connections
pub struct Relay {
    registry: Arc<SessionRegistry>,
    events: Arc<EventBus>,
    launches: AtomicU64,
    shutdown: CancellationToken,
}

impl Relay {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            events,
            launches: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.registry.list()
    }

    /// Number of transcoder processes spawned since startup
    pub fn launch_count(&self) -> u64 {
        self.launches.load(Ordering::Relaxed)
    }

    /// Run one session on an accepted socket
    ///
    /// `raw_descriptor` is the `streamUrl` taken from the connection request.
    pub async fn serve<S: RelaySocket>(
        &self,
        mut socket: S,
        raw_descriptor: Option<&str>,
        options: SessionOptions,
    ) -> SessionOutcome {
        let session = Arc::new(RelaySession::new(Uuid::new_v4()));
        let id = session.id();

        // OPENING
        let parsed = raw_descriptor
            .map(SourceDescriptor::parse)
            .unwrap_or(Err(RelayError::MissingSourceDescriptor));
        let source = match parsed {
            Ok(source) => source,
            Err(e) => {
                warn!("[{}] Rejecting connection: {}", id, e);
                socket.close(e.close_code(), &close_reason(&e.to_string())).await;
                session.set_state(SessionState::Closed);
                return self.rejected(&session, e);
            }
        };

        info!("[{}] New connection, proxying stream: {}", id, source);

        if self.shutdown.is_cancelled() {
            socket.close(CLOSE_GOING_AWAY, "relay shutting down").await;
            session.set_state(SessionState::Closed);
            return self.outcome(
                &session,
                &CloseReason::Shutdown,
                Some(CLOSE_GOING_AWAY),
                None,
                true,
            );
        }

        let mut transcoder = match TranscodeLauncher::new(options.transcoder.clone())
            .start(&source, &id.to_string())
        {
            Ok(transcoder) => transcoder,
            Err(e) => {
                warn!("[{}] {}", id, e);
                session.set_state(SessionState::Closing);
                socket.close(e.close_code(), &close_reason(&e.to_string())).await;
                session.set_state(SessionState::Closed);
                return self.rejected(&session, e);
            }
        };
        self.launches.fetch_add(1, Ordering::Relaxed);

        let pid = transcoder.pid();
        let guard = self
            .registry
            .register(session.clone(), source.to_string(), pid);

        // ACTIVE
        session.set_state(SessionState::Active);
        self.events.publish(RelayEvent::SessionOpened {
            session_id: id,
            source: source.to_string(),
            pid,
        });

        let shutdown = self.shutdown.child_token();
        let reason = session
            .supervise(&mut socket, &mut transcoder, &options, &shutdown)
            .await;

        // CLOSING: kill first so no further output is produced, then close
        session.set_state(SessionState::Closing);
        let transcoder_terminated = match transcoder.kill().await {
            Ok(()) => true,
            Err(e) => {
                warn!("[{}] Failed to kill transcoder {:?}: {}", id, pid, e);
                transcoder.has_exited()
            }
        };

        let close_code = reason.close_code();
        if let Some(code) = close_code {
            socket.close(code, &close_reason(&reason.message())).await;
        }
        drop(socket);

        // CLOSED
        session.set_state(SessionState::Closed);
        drop(guard);

        info!(
            "[{}] Session closed ({}), {} frames / {} bytes forwarded",
            id,
            reason.kind(),
            session.stats().frames(),
            session.stats().bytes()
        );

        self.outcome(&session, &reason, close_code, pid, transcoder_terminated)
    }

    fn rejected(&self, session: &RelaySession, error: RelayError) -> SessionOutcome {
        self.events.publish(RelayEvent::SessionRejected {
            session_id: session.id(),
            reason: error.kind().to_string(),
            message: error.to_string(),
        });
        let close_code = Some(error.close_code());
        // No transcoder is running when a session is rejected
        self.outcome_without_event(session, &CloseReason::Failed(error), close_code, None, true)
    }

    fn outcome(
        &self,
        session: &RelaySession,
        reason: &CloseReason,
        close_code: Option<u16>,
        pid: Option<u32>,
        transcoder_terminated: bool,
    ) -> SessionOutcome {
        let outcome =
            self.outcome_without_event(session, reason, close_code, pid, transcoder_terminated);
        self.events.publish(RelayEvent::SessionClosed {
            session_id: outcome.id,
            reason: outcome.reason.to_string(),
            close_code: outcome.close_code,
            frames: outcome.frames,
            bytes: outcome.bytes,
            transcoder_terminated: outcome.transcoder_terminated,
            closed_at: Utc::now(),
        });
        outcome
    }

    fn outcome_without_event(
        &self,
        session: &RelaySession,
        reason: &CloseReason,
        close_code: Option<u16>,
        pid: Option<u32>,
        transcoder_terminated: bool,
    ) -> SessionOutcome {
        SessionOutcome {
            id: session.id(),
            state: session.state(),
            reason: reason.kind(),
            close_code,
            frames: session.stats().frames(),
            bytes: session.stats().bytes(),
            transcoder_pid: pid,
            transcoder_terminated,
        }
    }

    /// Stop all sessions and wait for them to finish tearing down
    ///
    /// Returns `false` if sessions were still registered after `grace`.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.shutdown.cancel();
        let active = self.registry.len();
        if active > 0 {
            info!("Closing {} relay session(s)", active);
        }
        tokio::time::timeout(grace, self.registry.wait_empty())
            .await
            .is_ok()
    }
}

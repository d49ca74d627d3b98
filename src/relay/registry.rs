//! Registry of active relay sessions

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

use super::session::{RelaySession, SessionState};

/// Snapshot of one session for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub source: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub pid: Option<u32>,
    pub frames: u64,
    pub bytes: u64,
}

struct SessionEntry {
    session: Arc<RelaySession>,
    source: String,
    pid: Option<u32>,
}

/// Sessions that own a running transcoder
///
/// Entries are added when the transcoder starts and removed when the
/// [`RegistryGuard`] is dropped at the end of the session.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
    drained: Notify,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        self: &Arc<Self>,
        session: Arc<RelaySession>,
        source: String,
        pid: Option<u32>,
    ) -> RegistryGuard {
        let id = session.id();
        self.sessions.write().insert(
            id,
            SessionEntry {
                session,
                source,
                pid,
            },
        );
        RegistryGuard {
            registry: self.clone(),
            id,
        }
    }

    fn remove(&self, id: &Uuid) {
        let empty = {
            let mut sessions = self.sessions.write();
            sessions.remove(id);
            sessions.is_empty()
        };
        if empty {
            self.drained.notify_waiters();
        }
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut list: Vec<SessionInfo> = self
            .sessions
            .read()
            .iter()
            .map(|(id, entry)| SessionInfo {
                id: *id,
                source: entry.source.clone(),
                state: entry.session.state(),
                started_at: entry.session.started_at(),
                pid: entry.pid,
                frames: entry.session.stats().frames(),
                bytes: entry.session.stats().bytes(),
            })
            .collect();
        list.sort_by_key(|info| info.started_at);
        list
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Wait until no session is registered
    pub async fn wait_empty(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

/// Removes its session from the registry when dropped
pub struct RegistryGuard {
    registry: Arc<SessionRegistry>,
    id: Uuid,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

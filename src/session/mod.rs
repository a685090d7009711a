//! Session management
//!
//! One [`Session`] per connected peer, plus the single pseudo-session that
//! represents the embedding host. A session tracks lifecycle state, the
//! negotiated heartbeat, the last-receive timestamp used for liveness
//! checks, and the timer handles armed after CONNECT. Subscriptions live in
//! the registry and point back here by session id only.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::heartbeat::Heartbeat;
use crate::transport::Transport;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport attached, CONNECT not yet processed
    Opening,
    /// CONNECT accepted; SEND/SUBSCRIBE/UNSUBSCRIBE permitted
    Connected,
    /// Teardown in progress
    Closing,
    /// Teardown complete
    Closed,
}

/// Per-connection state
pub struct Session {
    id: Arc<str>,
    transport: Option<Arc<dyn Transport>>,
    peer: Option<SocketAddr>,
    state: RwLock<SessionState>,
    heartbeat: RwLock<Heartbeat>,
    started: Instant,
    last_rx_ms: AtomicU64,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Create a session for a network peer.
    pub fn network(
        id: impl Into<Arc<str>>,
        transport: Arc<dyn Transport>,
        peer: Option<SocketAddr>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            transport: Some(transport),
            peer,
            state: RwLock::new(SessionState::Opening),
            heartbeat: RwLock::new(Heartbeat::default()),
            started: Instant::now(),
            last_rx_ms: AtomicU64::new(0),
            timers: Mutex::new(Vec::new()),
        })
    }

    /// Create the in-process pseudo-session. It has no transport and is
    /// connected from birth; delivery to it goes through host callbacks.
    pub fn pseudo(id: impl Into<Arc<str>>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            transport: None,
            peer: None,
            state: RwLock::new(SessionState::Connected),
            heartbeat: RwLock::new(Heartbeat::default()),
            started: Instant::now(),
            last_rx_ms: AtomicU64::new(0),
            timers: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    /// Whether this is the in-process pseudo-session.
    pub fn is_local(&self) -> bool {
        self.transport.is_none()
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Transition `Opening -> Connected`. Returns false if the session was
    /// already connected or is shutting down.
    pub fn mark_connected(&self) -> bool {
        let mut state = self.state.write();
        if *state == SessionState::Opening {
            *state = SessionState::Connected;
            true
        } else {
            false
        }
    }

    /// Claim teardown. Returns true exactly once; later callers see the
    /// session already closing and must not repeat teardown work.
    pub fn begin_teardown(&self) -> bool {
        let mut state = self.state.write();
        match *state {
            SessionState::Opening | SessionState::Connected => {
                *state = SessionState::Closing;
                true
            }
            SessionState::Closing | SessionState::Closed => false,
        }
    }

    pub fn mark_closed(&self) {
        *self.state.write() = SessionState::Closed;
    }

    /// Record inbound traffic. The timestamp is monotonically non-decreasing
    /// regardless of caller interleaving.
    pub fn touch(&self) {
        let now = self.started.elapsed().as_millis() as u64;
        self.last_rx_ms.fetch_max(now, Ordering::AcqRel);
    }

    /// Milliseconds since the session epoch of the last inbound traffic.
    pub fn last_rx_ms(&self) -> u64 {
        self.last_rx_ms.load(Ordering::Acquire)
    }

    /// Milliseconds of silence since the last inbound traffic.
    pub fn millis_since_last_rx(&self) -> u64 {
        let now = self.started.elapsed().as_millis() as u64;
        now.saturating_sub(self.last_rx_ms())
    }

    pub fn set_heartbeat(&self, heartbeat: Heartbeat) {
        *self.heartbeat.write() = heartbeat;
    }

    pub fn heartbeat(&self) -> Heartbeat {
        *self.heartbeat.read()
    }

    /// Track a timer task so teardown can cancel it.
    pub fn register_timer(&self, handle: JoinHandle<()>) {
        self.timers.lock().push(handle);
    }

    /// Abort all armed timers. Runs as the final teardown step.
    pub fn abort_timers(&self) {
        for handle in self.timers.lock().drain(..) {
            handle.abort();
        }
    }

    pub fn timer_count(&self) -> usize {
        self.timers.lock().len()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("local", &self.is_local())
            .field("peer", &self.peer)
            .finish()
    }
}

/// Thread-safe session table keyed by session id
pub struct SessionStore {
    sessions: DashMap<Arc<str>, Arc<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.insert(session.id().clone(), session);
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|r| r.clone())
    }

    pub fn remove(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn pseudo_session_is_connected_and_local() {
        let session = Session::pseudo("self_1");
        assert!(session.is_local());
        assert!(session.is_connected());
        assert!(session.transport().is_none());
    }

    #[test]
    fn network_session_state_transitions() {
        let session = Session::network("sess-1", Arc::new(MockTransport::new()), None);
        assert_eq!(session.state(), SessionState::Opening);
        assert!(!session.is_connected());

        assert!(session.mark_connected());
        assert!(session.is_connected());
        assert!(!session.mark_connected());

        assert!(session.begin_teardown());
        assert_eq!(session.state(), SessionState::Closing);
        assert!(!session.begin_teardown());

        session.mark_closed();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.begin_teardown());
    }

    #[test]
    fn touch_is_monotonic() {
        let session = Session::network("sess-2", Arc::new(MockTransport::new()), None);
        session.touch();
        let first = session.last_rx_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        session.touch();
        assert!(session.last_rx_ms() >= first);
    }

    #[test]
    fn store_insert_get_remove() {
        let store = SessionStore::new();
        let session = Session::pseudo("self_2");
        store.insert(session.clone());
        assert!(store.get("self_2").is_some());
        assert_eq!(store.len(), 1);
        store.remove("self_2");
        assert!(store.get("self_2").is_none());
        assert!(store.is_empty());
    }
}

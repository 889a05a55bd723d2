//! Live-connection bookkeeping. Sessions are created on connect, destroyed
//! on disconnect or error, and never persisted.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use rxgate_core::domain::now_rfc3339;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const SESSION_TIMEOUT: Duration = Duration::from_secs(90);

/// Unique identifier for one live connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl Default for SessionId {
    fn default() -> Self {
        Self(format!("sess_{}", Uuid::now_v7()))
    }
}

impl SessionId {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One live connection: outbound queue plus per-connection metadata.
pub struct Session {
    pub id: SessionId,
    pub remote_addr: Option<String>,
    pub connected_at: String,
    tx: mpsc::Sender<String>,
    connected: AtomicBool,
    last_pong: AtomicU64,
}

impl Session {
    fn new(id: SessionId, remote_addr: Option<String>, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            remote_addr,
            connected_at: now_rfc3339(),
            tx,
            connected: AtomicBool::new(true),
            last_pong: AtomicU64::new(now_secs()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    fn is_alive(&self) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < SESSION_TIMEOUT.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all live sessions. No cross-session state beyond membership.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    max_send_queue: usize,
}

impl SessionRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new session before its first message is processed.
    /// Returns the id and the receiving half of its outbound queue.
    pub fn register(&self, remote_addr: Option<String>) -> (SessionId, mpsc::Receiver<String>) {
        let id = SessionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let session = Arc::new(Session::new(id.clone(), remote_addr, tx));
        self.sessions.insert(id.clone(), session);
        (id, rx)
    }

    /// Remove a session. Idempotent: both the graceful close and the error
    /// path may call this for the same id.
    pub fn deregister(&self, id: &SessionId) {
        if let Some((_, session)) = self.sessions.remove(id) {
            session.connected.store(false, Ordering::Relaxed);
        }
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn list(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Queue a message for a session. A full queue drops the message with a
    /// warning instead of blocking the caller.
    pub fn send_to(&self, id: &SessionId, message: String) -> bool {
        let Some(session) = self.sessions.get(id) else {
            return false;
        };
        match session.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    session_id = %id,
                    msg_len = msg.len(),
                    "send queue full, dropping message"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn record_pong(&self, id: &SessionId) {
        if let Some(session) = self.sessions.get(id) {
            session.record_pong();
        }
    }

    /// Deregister sessions that stopped answering pings.
    pub fn sweep_dead_sessions(&self) -> usize {
        let dead: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| !entry.value().is_alive())
            .map(|entry| entry.key().clone())
            .collect();

        let removed = dead.len();
        for id in dead {
            self.deregister(&id);
            tracing::info!(session_id = %id, "swept dead session");
        }
        removed
    }
}

/// Background task that periodically sweeps dead sessions.
pub fn start_sweep_task(
    registry: Arc<SessionRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = registry.sweep_dead_sessions();
            if removed > 0 {
                tracing::info!(removed, "dead session sweep");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_unique_and_prefixed() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert!(a.0.starts_with("sess_"));
    }

    #[test]
    fn register_and_deregister() {
        let registry = SessionRegistry::new(32);
        assert_eq!(registry.count(), 0);

        let (id1, _rx1) = registry.register(Some("127.0.0.1:5000".into()));
        let (id2, _rx2) = registry.register(None);
        assert_eq!(registry.count(), 2);
        assert!(registry.contains(&id1));

        registry.deregister(&id1);
        assert_eq!(registry.count(), 1);
        assert!(!registry.contains(&id1));
        assert!(registry.contains(&id2));
    }

    #[test]
    fn deregister_is_idempotent() {
        let registry = SessionRegistry::new(32);
        let (id, _rx) = registry.register(None);

        registry.deregister(&id);
        // Second removal of an absent session is a no-op, not an error
        registry.deregister(&id);
        assert_eq!(registry.count(), 0);
        assert!(!registry.contains(&id));
    }

    #[test]
    fn list_reflects_membership() {
        let registry = SessionRegistry::new(32);
        let (id1, _rx1) = registry.register(None);
        let (id2, _rx2) = registry.register(None);

        let mut listed = registry.list();
        listed.sort_by(|a, b| a.0.cmp(&b.0));
        let mut expected = vec![id1.clone(), id2];
        expected.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(listed, expected);

        registry.deregister(&id1);
        assert_eq!(registry.list().len(), 1);
    }

    #[tokio::test]
    async fn send_to_delivers() {
        let registry = SessionRegistry::new(32);
        let (id, mut rx) = registry.register(None);

        assert!(registry.send_to(&id, "hello".into()));
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[test]
    fn send_to_unknown_session() {
        let registry = SessionRegistry::new(32);
        assert!(!registry.send_to(&SessionId::new(), "test".into()));
    }

    #[test]
    fn send_to_full_queue_drops() {
        let registry = SessionRegistry::new(2);
        let (id, _rx) = registry.register(None);

        assert!(registry.send_to(&id, "msg1".into()));
        assert!(registry.send_to(&id, "msg2".into()));
        assert!(!registry.send_to(&id, "msg3".into()));
    }

    #[test]
    fn sweep_removes_only_expired() {
        let registry = SessionRegistry::new(32);
        let (stale, _rx1) = registry.register(None);
        let (fresh, _rx2) = registry.register(None);

        if let Some(session) = registry.sessions.get(&stale) {
            session.last_pong.store(0, Ordering::Relaxed);
        }

        assert_eq!(registry.sweep_dead_sessions(), 1);
        assert!(!registry.contains(&stale));
        assert!(registry.contains(&fresh));
    }

    #[test]
    fn session_metadata_recorded() {
        let registry = SessionRegistry::new(32);
        let (id, _rx) = registry.register(Some("10.0.0.1:443".into()));
        let session = registry.sessions.get(&id).unwrap();
        assert_eq!(session.remote_addr.as_deref(), Some("10.0.0.1:443"));
        assert!(!session.connected_at.is_empty());
        assert!(session.is_connected());
    }
}

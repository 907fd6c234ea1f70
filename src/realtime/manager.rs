//! Live session bookkeeping

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{Sink, Stream};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::session::{CancelSignal, ClientFrame, CloseReason, LiveSession, SessionId, SessionStats};
use crate::storage::SharedStore;
use crate::types::{LiveConfig, StepId};

struct SessionEntry {
    connected_at: DateTime<Utc>,
    stats: Arc<SessionStats>,
    cancel: watch::Sender<bool>,
}

/// Point-in-time view of one live session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub connected_at: DateTime<Utc>,
    pub last_delivered_step: StepId,
    pub messages_sent: u64,
    pub messages_dropped: u64,
}

struct ManagerInner {
    store: Option<SharedStore>,
    config: LiveConfig,
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    shutdown: watch::Sender<bool>,
}

/// Owns every live session.
///
/// Each session gets its own poller, its own transport, and its own cancel
/// switch. Sessions only share the read-only store, so one session failing
/// cannot disturb another.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

/// Removes a session from the registry however its task ends
struct Registration {
    manager: SessionManager,
    id: SessionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.manager.inner.sessions.write().remove(&self.id);
    }
}

impl SessionManager {
    pub fn new(store: Option<SharedStore>, config: LiveConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(ManagerInner {
                store,
                config,
                sessions: RwLock::new(HashMap::new()),
                shutdown,
            }),
        }
    }

    pub fn config(&self) -> LiveConfig {
        self.inner.config
    }

    fn register(&self) -> (Registration, Arc<SessionStats>, CancelSignal) {
        let id = Uuid::new_v4().to_string();
        let stats = Arc::new(SessionStats::default());
        let (cancel, cancel_rx) = watch::channel(false);

        self.inner.sessions.write().insert(
            id.clone(),
            SessionEntry {
                connected_at: Utc::now(),
                stats: stats.clone(),
                cancel,
            },
        );

        let signal = CancelSignal::new(cancel_rx, self.inner.shutdown.subscribe());
        let registration = Registration {
            manager: self.clone(),
            id,
        };
        (registration, stats, signal)
    }

    /// Run a live session on the current task until it ends
    pub async fn open_session<S, R>(&self, sink: S, incoming: R) -> CloseReason
    where
        S: Sink<String> + Unpin,
        S::Error: Display,
        R: Stream<Item = ClientFrame> + Unpin,
    {
        let (registration, stats, signal) = self.register();
        run_registered(
            registration,
            self.inner.store.clone(),
            self.inner.config,
            stats,
            sink,
            incoming,
            signal,
        )
        .await
    }

    /// Run a live session on its own task. The session is registered before
    /// this returns.
    pub fn spawn_session<S, R>(&self, sink: S, incoming: R) -> (SessionId, JoinHandle<CloseReason>)
    where
        S: Sink<String> + Unpin + Send + 'static,
        S::Error: Display,
        R: Stream<Item = ClientFrame> + Unpin + Send + 'static,
    {
        let (registration, stats, signal) = self.register();
        let id = registration.id.clone();
        let store = self.inner.store.clone();
        let config = self.inner.config;

        let handle = tokio::spawn(run_registered(
            registration,
            store,
            config,
            stats,
            sink,
            incoming,
            signal,
        ));
        (id, handle)
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.inner.sessions.read().len()
    }

    /// Snapshot of all live sessions, oldest first
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .inner
            .sessions
            .read()
            .iter()
            .map(|(id, entry)| SessionInfo {
                id: id.clone(),
                connected_at: entry.connected_at,
                last_delivered_step: entry.stats.last_delivered_step(),
                messages_sent: entry.stats.messages_sent(),
                messages_dropped: entry.stats.messages_dropped(),
            })
            .collect();
        sessions.sort_by_key(|s| s.connected_at);
        sessions
    }

    /// Cancel one session. Returns false if it is not live.
    pub fn close_session(&self, id: &str) -> bool {
        match self.inner.sessions.read().get(id) {
            Some(entry) => {
                entry.cancel.send_replace(true);
                true
            }
            None => false,
        }
    }

    /// Cancel every session, current and future
    pub fn shutdown(&self) {
        let live = self.session_count();
        self.inner.shutdown.send_replace(true);
        tracing::info!("Live channel shutting down ({} sessions)", live);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }
}

async fn run_registered<S, R>(
    registration: Registration,
    store: Option<SharedStore>,
    config: LiveConfig,
    stats: Arc<SessionStats>,
    sink: S,
    incoming: R,
    signal: CancelSignal,
) -> CloseReason
where
    S: Sink<String> + Unpin,
    S::Error: Display,
    R: Stream<Item = ClientFrame> + Unpin,
{
    let id = registration.id.clone();
    tracing::info!(session = %id, "Live session opened");

    let session = LiveSession::new(id.clone(), store, config, sink, stats.clone());
    let reason = session.run(incoming, signal).await;

    match &reason {
        CloseReason::TransportFailed(e) => {
            tracing::info!(session = %id, delivered = stats.messages_sent(), "Live session lost: {}", e)
        }
        other => {
            tracing::info!(session = %id, delivered = stats.messages_sent(), "Live session closed: {:?}", other)
        }
    }

    drop(registration);
    reason
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_register_and_close() {
        let manager = SessionManager::new(None, LiveConfig::default());
        assert_eq!(manager.session_count(), 0);

        let (tx, _rx) = mpsc::channel::<String>(8);
        let (_frames_tx, frames) = mpsc::unbounded::<ClientFrame>();
        let (id, handle) = manager.spawn_session(tx, frames);
        assert_eq!(manager.session_count(), 1);
        assert_eq!(manager.sessions()[0].id, id);

        assert!(manager.close_session(&id));
        assert_eq!(handle.await.unwrap(), CloseReason::Cancelled);
        assert_eq!(manager.session_count(), 0);
        assert!(!manager.close_session(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_close_unregisters() {
        let manager = SessionManager::new(None, LiveConfig::default());
        let (tx, _rx) = mpsc::channel::<String>(8);
        let (frames_tx, frames) = mpsc::unbounded::<ClientFrame>();
        let (_, handle) = manager.spawn_session(tx, frames);

        frames_tx.unbounded_send(ClientFrame::Ignored).unwrap();
        frames_tx.unbounded_send(ClientFrame::Close).unwrap();
        assert_eq!(handle.await.unwrap(), CloseReason::PeerClosed);
        assert_eq!(manager.session_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sessions_after_shutdown_end_immediately() {
        let manager = SessionManager::new(None, LiveConfig::default());
        manager.shutdown();
        assert!(manager.is_shutting_down());

        let (tx, _rx) = mpsc::channel::<String>(8);
        let (_frames_tx, frames) = mpsc::unbounded::<ClientFrame>();
        let reason = manager.open_session(tx, frames).await;
        assert_eq!(reason, CloseReason::Cancelled);
        assert_eq!(manager.session_count(), 0);
    }
}

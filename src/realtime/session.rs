//! One live viewer: poll loop plus change notifier
//!
//! A session is generic over its transport so the same loop drives an axum
//! WebSocket in production and an in-process channel in tests.

use std::fmt::Display;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use super::events::encode_step;
use super::poller::{PollerState, SnapshotPoller};
use crate::error::{Result, ScopeError};
use crate::storage::{timed_out, SharedStore, StoreRead};
use crate::types::{LiveConfig, StepId, StepRecord};

/// Session identifier (UUID v4)
pub type SessionId = String;

/// What the viewer sent us, reduced to what the loop cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientFrame {
    /// The viewer asked to close, or its stream errored
    Close,
    /// Anything else; the protocol has no client messages
    Ignored,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    PeerClosed,
    TransportFailed(String),
    Cancelled,
}

/// Counters readable while the session runs
#[derive(Debug, Default)]
pub struct SessionStats {
    last_delivered_step: AtomicI64,
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl SessionStats {
    pub fn last_delivered_step(&self) -> StepId {
        self.last_delivered_step.load(Ordering::Relaxed)
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }
}

/// Cancellation for one session: its own switch plus the process-wide one
#[derive(Debug, Clone)]
pub struct CancelSignal {
    session: watch::Receiver<bool>,
    global: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new(session: watch::Receiver<bool>, global: watch::Receiver<bool>) -> Self {
        Self { session, global }
    }

    /// Resolves once either switch flips or its owner goes away
    pub async fn cancelled(&mut self) {
        tokio::select! {
            _ = self.session.wait_for(|cancelled| *cancelled) => {}
            _ = self.global.wait_for(|cancelled| *cancelled) => {}
        }
    }
}

/// Poll loop state for one connection
pub struct LiveSession<S> {
    id: SessionId,
    poller: SnapshotPoller,
    store: Option<SharedStore>,
    config: LiveConfig,
    sink: S,
    stats: Arc<SessionStats>,
    /// A read that outlived its timeout and may still be running
    stalled_read: Option<StoreRead<Vec<StepRecord>>>,
}

impl<S> LiveSession<S>
where
    S: Sink<String> + Unpin,
    S::Error: Display,
{
    pub fn new(
        id: SessionId,
        store: Option<SharedStore>,
        config: LiveConfig,
        sink: S,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self {
            id,
            poller: SnapshotPoller::new(),
            store,
            config,
            sink,
            stats,
            stalled_read: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> PollerState {
        self.poller.state()
    }

    /// One poll: read the window, deliver the freshest step if it is novel.
    ///
    /// Returns the delivered step id. A send that does not complete within the
    /// send timeout is dropped and counted as delivered, so a slow viewer can
    /// never receive the same step twice. Malformed records are skipped the
    /// same way.
    pub async fn tick(&mut self) -> Result<Option<StepId>> {
        let window = self.read_window().await?;

        let Some(snapshot) = self.poller.observe(&window) else {
            return Ok(None);
        };
        let step = snapshot.step;

        let text = match encode_step(snapshot) {
            Ok(text) => text,
            Err(e) => {
                self.advance(step);
                return Err(e);
            }
        };

        match tokio::time::timeout(self.config.send_timeout, self.sink.send(text)).await {
            Ok(Ok(())) => {
                self.advance(step);
                self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(session = %self.id, step, "Delivered step update");
                Ok(Some(step))
            }
            Ok(Err(e)) => Err(ScopeError::TransportClosed(e.to_string())),
            Err(_) => {
                self.advance(step);
                self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    session = %self.id,
                    step,
                    "Viewer not accepting messages, dropped step update"
                );
                Ok(None)
            }
        }
    }

    /// Read the poll window, with at most one store read in flight.
    ///
    /// A read that times out is kept; later ticks fail fast until it
    /// returns, and its late result is discarded.
    async fn read_window(&mut self) -> Result<Vec<StepRecord>> {
        let store = Arc::clone(self.store.as_ref().ok_or_else(ScopeError::no_collector)?);

        if let Some(read) = self.stalled_read.take() {
            if !read.is_finished() {
                self.stalled_read = Some(read);
                return Err(ScopeError::QueryFailed(
                    "previous read still running".to_string(),
                ));
            }
        }

        let read = StoreRead::<Vec<StepRecord>>::recent_steps(&store, self.config.poll_window);
        match read.wait(self.config.query_timeout).await {
            Ok(result) => result,
            Err(read) => {
                self.stalled_read = Some(read);
                Err(timed_out(self.config.query_timeout))
            }
        }
    }

    fn advance(&mut self, step: StepId) {
        self.poller.advance(step);
        self.stats
            .last_delivered_step
            .store(self.poller.last_delivered_step(), Ordering::Relaxed);
    }

    /// Drive the session until the viewer leaves, the transport fails, or it
    /// is cancelled. Cancellation is observed even in the middle of a tick.
    pub async fn run<R>(mut self, mut incoming: R, mut cancel: CancelSignal) -> CloseReason
    where
        R: Stream<Item = ClientFrame> + Unpin,
    {
        self.poller.start();

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let reason = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break CloseReason::Cancelled,

                frame = incoming.next() => match frame {
                    None | Some(ClientFrame::Close) => break CloseReason::PeerClosed,
                    Some(ClientFrame::Ignored) => {}
                },

                _ = ticker.tick() => {
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        outcome = self.tick() => Some(outcome),
                    };

                    match outcome {
                        None => break CloseReason::Cancelled,
                        Some(Ok(_)) => {}
                        Some(Err(e)) if e.is_session_fatal() => {
                            break CloseReason::TransportFailed(e.to_string());
                        }
                        Some(Err(ScopeError::AdapterUnavailable(msg))) => {
                            tracing::debug!(session = %self.id, "Skipping tick: {}", msg);
                        }
                        Some(Err(e)) => {
                            tracing::warn!(
                                session = %self.id,
                                kind = e.kind(),
                                "Live tick failed: {}",
                                e
                            );
                        }
                    }
                }
            }
        };

        self.poller.terminate();
        reason
    }
}

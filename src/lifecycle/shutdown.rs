//! Shutdown coordination for the proxy.
//!
//! # Responsibilities
//! - Track every active relay session (guard registered on accept)
//! - Refuse new upgrades once shutdown has begun (503)
//! - Signal sessions to close both sides, wait for them to drain
//! - Release the listeners last
//!
//! # Design Decisions
//! - Shutdown is an explicit method owned by the frontend's coordinator
//! - Sessions observe a watch channel; listeners observe a second one
//! - Draining is bounded by `drain_timeout`

use std::future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;

use crate::observability::metrics;
use crate::relay::SessionId;

/// Receiver side of the session shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// A signal that never fires, for sessions run outside a coordinator.
    pub fn detached() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered. Cancel-safe.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Sender gone without triggering: never fires.
                return future::pending().await;
            }
        }
    }
}

#[derive(Debug)]
struct SessionEntry {
    target: String,
    started: Instant,
}

/// Coordinator for graceful shutdown.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    closing: AtomicBool,
    sessions_tx: watch::Sender<bool>,
    listeners_tx: watch::Sender<bool>,
    sessions: DashMap<SessionId, SessionEntry>,
    drained: Notify,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(drain_timeout: Duration) -> Self {
        let (sessions_tx, _) = watch::channel(false);
        let (listeners_tx, _) = watch::channel(false);
        Self {
            closing: AtomicBool::new(false),
            sessions_tx,
            listeners_tx,
            sessions: DashMap::new(),
            drained: Notify::new(),
            drain_timeout,
        }
    }

    /// True once `shutdown` has been called.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Subscribe a session to the shutdown signal.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.sessions_tx.subscribe(),
        }
    }

    /// Register a session. Returns `None` once shutdown has begun.
    pub fn track(self: &Arc<Self>, target: &str) -> Option<SessionGuard> {
        if self.is_closing() {
            return None;
        }
        let id = SessionId::new();
        self.sessions.insert(
            id,
            SessionEntry {
                target: target.to_string(),
                started: Instant::now(),
            },
        );
        metrics::session_opened();
        Some(SessionGuard {
            id,
            coordinator: Arc::clone(self),
        })
    }

    /// Number of sessions not yet finished.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Stop accepting upgrades, close every session, then release listeners.
    ///
    /// Idempotent; later calls wait for the listeners to be released.
    pub async fn shutdown(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            self.listener_closed().await;
            return;
        }

        let active = self.active_sessions();
        tracing::info!(active_sessions = active, "Shutdown started");
        self.sessions_tx.send_replace(true);

        let drain = async {
            loop {
                let notified = self.drained.notified();
                if self.sessions.is_empty() {
                    break;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(self.drain_timeout, drain).await.is_err() {
            for entry in self.sessions.iter() {
                tracing::warn!(
                    session_id = %entry.key(),
                    target = %entry.target,
                    age_ms = entry.started.elapsed().as_millis() as u64,
                    "Session still open after drain timeout"
                );
            }
        }

        self.listeners_tx.send_replace(true);
        tracing::info!("Shutdown complete");
    }

    /// Resolves once listeners may stop accepting.
    pub async fn listener_closed(&self) {
        let mut rx = self.listeners_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    fn release(&self, id: SessionId) {
        if self.sessions.remove(&id).is_some() {
            metrics::session_closed();
        }
        if self.sessions.is_empty() {
            self.drained.notify_waiters();
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

/// Keeps a session registered; deregisters on drop.
#[derive(Debug)]
pub struct SessionGuard {
    id: SessionId,
    coordinator: Arc<ShutdownCoordinator>,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.coordinator.release(self.id);
        tracing::trace!(session_id = %self.id, "Session released");
    }
}

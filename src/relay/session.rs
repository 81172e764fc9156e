//! Relay session: one accepted client connection and its target(s).
//!
//! ```text
//! dial ──ok──▶ CONNECTED ──source closed / shutdown──▶ CLOSED
//!   │              │
//!   │              └──target lost──▶ (policy && (abnormal || reconnect_on_normal_close))
//!   │                                    ├── yes ▶ RECONNECTING ──ok──▶ CONNECTED
//!   │                                    │                  └──exhausted──▶ CLOSED (1011)
//!   │                                    └── no  ▶ CLOSED (close propagated)
//!   └──fail──▶ RECONNECTING (with policy) or CLOSED (1011)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::SinkExt;

use super::dial::{dial_with_timeout, DialParams, TargetDialer};
use super::frame::CloseInfo;
use super::heartbeat::HeartbeatMonitor;
use super::hooks::{HookRunner, HookSet};
use super::pump::{hold_source, ConnectionRelay, Held, PendingQueue, RelayEnd};
use super::reconnect::{ReconnectOutcome, ReconnectionController};
use super::{BoxSocket, ReconnectPolicy};
use crate::lifecycle::ShutdownSignal;

/// Relaxed ordering is enough: ids only need to be unique.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ws-{}", self.0)
    }
}

/// One client connection relayed to its backend.
pub struct RelaySession {
    id: SessionId,
    source: BoxSocket,
    params: DialParams,
    dialer: Arc<dyn TargetDialer>,
    policy: Option<ReconnectPolicy>,
    hooks: HookRunner,
    pending: PendingQueue,
    shutdown: ShutdownSignal,
    reconnections: u32,
}

impl RelaySession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: SessionId,
        source: BoxSocket,
        params: DialParams,
        dialer: Arc<dyn TargetDialer>,
        policy: Option<ReconnectPolicy>,
        hooks: HookSet,
        max_pending_frames: usize,
        shutdown: ShutdownSignal,
    ) -> Self {
        let hooks = HookRunner::new(hooks, id, params.url.clone());
        Self {
            id,
            source,
            params,
            dialer,
            policy,
            hooks,
            pending: PendingQueue::new(max_pending_frames),
            shutdown,
            reconnections: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Relay until both sides are closed. Fires `on_disconnect` last.
    pub async fn run(mut self) {
        tracing::debug!(session_id = %self.id, target = %self.params.url, "Relay session started");
        self.drive().await;
        self.hooks.disconnect();
        tracing::debug!(
            session_id = %self.id,
            reconnections = self.reconnections,
            "Relay session finished"
        );
    }

    fn logging_enabled(&self) -> bool {
        self.policy.as_ref().is_some_and(|p| p.logging_enabled)
    }

    async fn drive(&mut self) {
        let limit = self.policy.as_ref().and_then(ReconnectPolicy::dial_timeout);
        let dial = dial_with_timeout(self.dialer.as_ref(), &self.params, limit);

        let mut target = match hold_source(&mut self.source, &mut self.pending, &mut self.shutdown, dial).await {
            Held::Ready(Ok(target)) => target,
            Held::Ready(Err(err)) => {
                tracing::warn!(session_id = %self.id, target = %self.params.url, error = %err, "Target dial failed");
                if self.policy.is_none() {
                    self.close_source(CloseInfo::error(&err)).await;
                    return;
                }
                match self.reconnect().await {
                    Some(target) => target,
                    None => return,
                }
            }
            Held::SourceClosed(close) => {
                tracing::debug!(session_id = %self.id, code = close.code, "Source closed before target opened");
                let _ = self.source.close().await;
                return;
            }
            Held::Shutdown => {
                self.close_source(CloseInfo::going_away()).await;
                return;
            }
        };

        let mut outbox = if self.reconnections == 0 {
            self.hooks.connect()
        } else {
            self.hooks.reconnect()
        };

        loop {
            let mut heartbeat = HeartbeatMonitor::new(self.policy.as_ref().and_then(ReconnectPolicy::heartbeat_period));
            let logging_enabled = self.logging_enabled();
            let mut relay = ConnectionRelay::new(self.id, &mut self.source, &mut target, &self.hooks, logging_enabled);

            let end = match relay.flush(std::mem::take(&mut outbox), &mut self.pending).await {
                Ok(()) => {
                    heartbeat.arm();
                    let end = relay.run(&mut heartbeat, &mut self.shutdown).await;
                    heartbeat.stop();
                    end
                }
                Err(close) => RelayEnd::TargetClosed { close, abnormal: true },
            };

            match end {
                RelayEnd::SourceClosed(close) => {
                    tracing::debug!(session_id = %self.id, code = close.code, "Source closed");
                    let _ = target.send(close.to_message()).await;
                    let _ = target.close().await;
                    let _ = self.source.close().await;
                    return;
                }
                RelayEnd::Shutdown => {
                    let close = CloseInfo::going_away();
                    let _ = target.send(close.to_message()).await;
                    let _ = target.close().await;
                    self.close_source(close).await;
                    return;
                }
                RelayEnd::TargetClosed { close, abnormal } => {
                    let reconnect = self
                        .policy
                        .as_ref()
                        .is_some_and(|p| abnormal || p.reconnect_on_normal_close);
                    if !reconnect {
                        tracing::debug!(session_id = %self.id, code = close.code, abnormal, "Target closed");
                        let _ = target.close().await;
                        self.close_source(close).await;
                        return;
                    }
                    // The old target is gone before a new one is dialed.
                    drop(target);
                    target = match self.reconnect().await {
                        Some(target) => target,
                        None => return,
                    };
                    outbox = self.hooks.reconnect();
                }
            }
        }
    }

    /// Run a reconnection sequence; `None` means the session is over and
    /// the source has been dealt with.
    async fn reconnect(&mut self) -> Option<BoxSocket> {
        let policy = self.policy.as_ref()?;
        let controller = ReconnectionController::new(self.id, policy, self.dialer.as_ref(), &self.params);
        let outcome = controller
            .run(&mut self.source, &mut self.pending, &mut self.shutdown)
            .await;

        match outcome {
            ReconnectOutcome::Connected { target, .. } => {
                self.reconnections += 1;
                self.hooks.set_attempt(self.reconnections);
                Some(target)
            }
            ReconnectOutcome::SourceClosed(close) => {
                tracing::debug!(session_id = %self.id, code = close.code, "Source closed while reconnecting");
                let _ = self.source.close().await;
                None
            }
            ReconnectOutcome::Exhausted { .. } => {
                self.close_source(CloseInfo::new(Some(super::frame::INTERNAL_ERROR), "failed to reconnect"))
                    .await;
                None
            }
            ReconnectOutcome::Shutdown => {
                self.close_source(CloseInfo::going_away()).await;
                None
            }
        }
    }

    async fn close_source(&mut self, close: CloseInfo) {
        let _ = self.source.send(close.to_message()).await;
        let _ = self.source.close().await;
    }
}

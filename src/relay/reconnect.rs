//! Reconnection controller.
//!
//! Replaces a lost target while the source stays open:
//!
//! ```text
//! attempt = 0
//! loop:
//!     attempt >= max retries?  → Exhausted (source closed with 1011)
//!     wait delay(attempt)      (source still read into the pending queue)
//!     dial, bounded by connection timeout
//!         ok   → Connected
//!         fail → attempt += 1
//! source closes or shutdown at any point → abort
//! ```

use url::Url;

use super::dial::{dial_with_timeout, DialError, DialParams, TargetDialer};
use super::frame::CloseInfo;
use super::pump::{hold_source, Held, PendingQueue};
use super::{BoxSocket, ReconnectPolicy, SessionId};
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;

/// How a reconnection sequence ended.
pub enum ReconnectOutcome {
    Connected { target: BoxSocket, attempts: u32 },
    SourceClosed(CloseInfo),
    Exhausted { attempts: u32, last_error: Option<DialError> },
    Shutdown,
}

impl std::fmt::Debug for ReconnectOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconnectOutcome::Connected { attempts, .. } => {
                f.debug_struct("Connected").field("attempts", attempts).finish_non_exhaustive()
            }
            ReconnectOutcome::SourceClosed(close) => f.debug_tuple("SourceClosed").field(close).finish(),
            ReconnectOutcome::Exhausted { attempts, last_error } => f
                .debug_struct("Exhausted")
                .field("attempts", attempts)
                .field("last_error", last_error)
                .finish(),
            ReconnectOutcome::Shutdown => f.write_str("Shutdown"),
        }
    }
}

pub struct ReconnectionController<'a> {
    session_id: SessionId,
    policy: &'a ReconnectPolicy,
    dialer: &'a dyn TargetDialer,
    params: &'a DialParams,
}

impl<'a> ReconnectionController<'a> {
    pub fn new(
        session_id: SessionId,
        policy: &'a ReconnectPolicy,
        dialer: &'a dyn TargetDialer,
        params: &'a DialParams,
    ) -> Self {
        Self {
            session_id,
            policy,
            dialer,
            params,
        }
    }

    fn target(&self) -> &Url {
        &self.params.url
    }

    /// Run one reconnection sequence. The previous target must already be
    /// dropped.
    pub async fn run(
        &self,
        source: &mut BoxSocket,
        pending: &mut PendingQueue,
        shutdown: &mut ShutdownSignal,
    ) -> ReconnectOutcome {
        let mut attempt = 0;
        let mut last_error = None;

        loop {
            if self.policy.retries_exhausted(attempt) {
                tracing::error!(
                    session_id = %self.session_id,
                    target = %self.target(),
                    attempts = attempt,
                    "proxy ws failed to reconnect"
                );
                return ReconnectOutcome::Exhausted {
                    attempts: attempt,
                    last_error,
                };
            }

            let delay = self.policy.delay(attempt);
            if self.policy.logging_enabled {
                tracing::info!(
                    session_id = %self.session_id,
                    target = %self.target(),
                    attempt = attempt + 1,
                    "proxy ws reconnect in {} ms",
                    delay.as_millis()
                );
            }
            match hold_source(source, pending, shutdown, tokio::time::sleep(delay)).await {
                Held::Ready(()) => {}
                Held::SourceClosed(close) => return ReconnectOutcome::SourceClosed(close),
                Held::Shutdown => return ReconnectOutcome::Shutdown,
            }

            let dial = dial_with_timeout(self.dialer, self.params, self.policy.dial_timeout());
            match hold_source(source, pending, shutdown, dial).await {
                Held::Ready(Ok(target)) => {
                    metrics::record_reconnect_attempt("success");
                    if self.policy.logging_enabled {
                        tracing::info!(
                            session_id = %self.session_id,
                            target = %self.target(),
                            attempt = attempt + 1,
                            "proxy ws reconnected"
                        );
                    }
                    return ReconnectOutcome::Connected {
                        target,
                        attempts: attempt + 1,
                    };
                }
                Held::Ready(Err(err)) => {
                    metrics::record_reconnect_attempt("failure");
                    if self.policy.logging_enabled {
                        tracing::warn!(
                            session_id = %self.session_id,
                            target = %self.target(),
                            attempt = attempt + 1,
                            error = %err,
                            "proxy ws reconnect attempt failed"
                        );
                    }
                    last_error = Some(err);
                    attempt += 1;
                }
                Held::SourceClosed(close) => return ReconnectOutcome::SourceClosed(close),
                Held::Shutdown => return ReconnectOutcome::Shutdown,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::{source_pair, ScriptedDialer, Step};
    use futures_util::SinkExt;
    use std::time::Duration;
    use tokio::time::Instant;
    use tokio_tungstenite::tungstenite::Message;

    fn policy(retries: Option<u32>) -> ReconnectPolicy {
        ReconnectPolicy {
            reconnect_interval: Duration::from_millis(100),
            reconnect_decay: 2.0,
            max_reconnection_retries: retries,
            ..ReconnectPolicy::default()
        }
    }

    fn params() -> DialParams {
        DialParams::new(Url::parse("ws://127.0.0.1:1/").unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn waits_follow_the_backoff_schedule() {
        let (mut source, _client) = source_pair().await;
        let (dialer, _backends) = ScriptedDialer::new(vec![Step::Fail, Step::Fail, Step::Connect]);
        let policy = policy(None);
        let params = params();
        let controller = ReconnectionController::new(SessionId::new(), &policy, dialer.as_ref(), &params);

        let start = Instant::now();
        let outcome = controller
            .run(&mut source, &mut PendingQueue::new(8), &mut ShutdownSignal::detached())
            .await;

        assert!(matches!(outcome, ReconnectOutcome::Connected { attempts: 3, .. }));
        // 100 + 200 + 400 ms of waiting before attempts 1, 2 and 3.
        assert_eq!(start.elapsed(), Duration::from_millis(700));
        assert_eq!(dialer.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let (mut source, _client) = source_pair().await;
        let (dialer, _backends) = ScriptedDialer::new(vec![Step::Fail, Step::Connect]);
        let policy = policy(Some(1));
        let params = params();
        let controller = ReconnectionController::new(SessionId::new(), &policy, dialer.as_ref(), &params);

        let outcome = controller
            .run(&mut source, &mut PendingQueue::new(8), &mut ShutdownSignal::detached())
            .await;

        match outcome {
            ReconnectOutcome::Exhausted { attempts, last_error } => {
                assert_eq!(attempts, 1);
                assert!(last_error.is_some());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(dialer.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn source_close_aborts_the_sequence() {
        let (mut source, mut client) = source_pair().await;
        let (dialer, _backends) = ScriptedDialer::new(vec![]);
        let policy = policy(None);
        let params = params();
        let controller = ReconnectionController::new(SessionId::new(), &policy, dialer.as_ref(), &params);

        client.send(Message::Close(None)).await.unwrap();
        let outcome = controller
            .run(&mut source, &mut PendingQueue::new(8), &mut ShutdownSignal::detached())
            .await;

        assert!(matches!(outcome, ReconnectOutcome::SourceClosed(_)));
        assert_eq!(dialer.calls(), 0);
    }
}

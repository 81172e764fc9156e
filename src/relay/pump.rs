//! Bidirectional frame pump between a source and its current target.
//!
//! # Responsibilities
//! - Forward frames both ways, in order, keeping text/binary framing
//! - Run message hooks before each data frame is forwarded
//! - Report how the pair ended (`RelayEnd`); the session decides what follows
//! - Hold the source (queueing data frames) while no target is open
//!
//! # Design Decisions
//! - One `select!` loop per pair: a single task, no locks, no channels
//! - Sends are awaited inside the loop, so a slow peer slows its partner
//! - Heartbeat ticks are a third select branch

use std::collections::VecDeque;
use std::future::Future;

use futures_util::{SinkExt, StreamExt};

use super::frame::{self, CloseInfo};
use super::heartbeat::{HeartbeatMonitor, Tick};
use super::hooks::HookRunner;
use super::{BoxSocket, Message, SessionId};
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;

/// How a relayed pair stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEnd {
    /// The client closed, errored or vanished.
    SourceClosed(CloseInfo),
    /// The target went away. `abnormal` is false only for a close frame.
    TargetClosed { close: CloseInfo, abnormal: bool },
    /// The proxy is shutting down.
    Shutdown,
}

/// Data frames read from the source while no target is open.
#[derive(Debug)]
pub struct PendingQueue {
    frames: VecDeque<Message>,
    capacity: usize,
}

impl PendingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn has_room(&self) -> bool {
        self.frames.len() < self.capacity
    }

    pub fn push(&mut self, message: Message) {
        self.frames.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.frames.get(index)
    }

    /// Forget the first `count` frames.
    pub fn consume(&mut self, count: usize) {
        self.frames.drain(..count.min(self.frames.len()));
    }

    pub fn take(&mut self) -> VecDeque<Message> {
        std::mem::take(&mut self.frames)
    }
}

/// Result of holding the source while something else completes.
#[derive(Debug)]
pub(crate) enum Held<T> {
    Ready(T),
    SourceClosed(CloseInfo),
    Shutdown,
}

/// Drive `future` while still reading the source into `pending`.
///
/// The source is not read while the queue is full. Control frames have no
/// target to go to and are dropped.
pub(crate) async fn hold_source<F: Future>(
    source: &mut BoxSocket,
    pending: &mut PendingQueue,
    shutdown: &mut ShutdownSignal,
    future: F,
) -> Held<F::Output> {
    tokio::pin!(future);
    loop {
        tokio::select! {
            output = &mut future => return Held::Ready(output),
            message = source.next(), if pending.has_room() => match message {
                Some(Ok(Message::Close(close))) => {
                    return Held::SourceClosed(CloseInfo::from_frame(close.as_ref()));
                }
                Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => pending.push(message),
                Some(Ok(_)) => {}
                Some(Err(err)) => return Held::SourceClosed(CloseInfo::error(&err)),
                None => return Held::SourceClosed(CloseInfo::abnormal()),
            },
            _ = shutdown.wait() => return Held::Shutdown,
        }
    }
}

/// Relays frames between one source and one target connection.
pub struct ConnectionRelay<'a> {
    session_id: SessionId,
    source: &'a mut BoxSocket,
    target: &'a mut BoxSocket,
    hooks: &'a HookRunner,
    logging_enabled: bool,
}

impl<'a> ConnectionRelay<'a> {
    pub fn new(
        session_id: SessionId,
        source: &'a mut BoxSocket,
        target: &'a mut BoxSocket,
        hooks: &'a HookRunner,
        logging_enabled: bool,
    ) -> Self {
        Self {
            session_id,
            source,
            target,
            hooks,
            logging_enabled,
        }
    }

    /// Send hook output and queued frames to a freshly opened target.
    ///
    /// Queued frames leave `pending` only once the target flush succeeded,
    /// so a failed flush hands all of them to the next target.
    pub async fn flush(&mut self, outbox: Vec<Message>, pending: &mut PendingQueue) -> Result<(), CloseInfo> {
        for message in outbox {
            self.target
                .feed(message)
                .await
                .map_err(|e| CloseInfo::error(&e))?;
        }
        let mut fed = 0;
        while let Some(message) = pending.get(fed).cloned() {
            self.to_target(message).await?;
            fed += 1;
        }
        self.target.flush().await.map_err(|e| CloseInfo::error(&e))?;
        pending.consume(fed);
        Ok(())
    }

    /// Pump until either side ends or shutdown is signalled.
    pub async fn run(&mut self, heartbeat: &mut HeartbeatMonitor, shutdown: &mut ShutdownSignal) -> RelayEnd {
        loop {
            tokio::select! {
                message = self.source.next() => match message {
                    Some(Ok(Message::Close(close))) => {
                        return RelayEnd::SourceClosed(CloseInfo::from_frame(close.as_ref()));
                    }
                    Some(Ok(message)) => {
                        if let Err(close) = self.to_target(message).await {
                            return RelayEnd::TargetClosed { close, abnormal: true };
                        }
                        if let Err(err) = self.target.flush().await {
                            return RelayEnd::TargetClosed { close: CloseInfo::error(&err), abnormal: true };
                        }
                    }
                    Some(Err(err)) => return RelayEnd::SourceClosed(CloseInfo::error(&err)),
                    None => return RelayEnd::SourceClosed(CloseInfo::abnormal()),
                },
                message = self.target.next() => match message {
                    Some(Ok(Message::Close(close))) => {
                        return RelayEnd::TargetClosed {
                            close: CloseInfo::from_frame(close.as_ref()),
                            abnormal: false,
                        };
                    }
                    Some(Ok(message)) => {
                        heartbeat.record_activity();
                        if let Err(end) = self.to_source(message).await {
                            return end;
                        }
                    }
                    Some(Err(err)) => {
                        return RelayEnd::TargetClosed { close: CloseInfo::error(&err), abnormal: true };
                    }
                    None => return RelayEnd::TargetClosed { close: CloseInfo::abnormal(), abnormal: true },
                },
                tick = heartbeat.tick() => match tick {
                    Tick::Ping => {
                        if let Err(err) = self.target.send(Message::Ping(Default::default())).await {
                            return RelayEnd::TargetClosed { close: CloseInfo::error(&err), abnormal: true };
                        }
                    }
                    Tick::Broken => {
                        metrics::record_broken();
                        if self.logging_enabled {
                            tracing::warn!(session_id = %self.session_id, "proxy ws connection is broken");
                        }
                        return RelayEnd::TargetClosed { close: CloseInfo::abnormal(), abnormal: true };
                    }
                },
                _ = shutdown.wait() => return RelayEnd::Shutdown,
            }
        }
    }

    /// Client → target. Message hooks run first; their outbox goes out
    /// ahead of the frame.
    async fn to_target(&mut self, message: Message) -> Result<(), CloseInfo> {
        for extra in self.hooks.incoming(&message) {
            self.target.feed(extra).await.map_err(|e| CloseInfo::error(&e))?;
        }
        metrics::record_frame("client_to_target", frame::kind(&message));
        self.target
            .feed(message)
            .await
            .map_err(|e| CloseInfo::error(&e))
    }

    /// Target → client.
    ///
    /// Pongs are forwarded like any other frame, including those answering
    /// the heartbeat's own pings; each one also fires `on_pong`.
    async fn to_source(&mut self, message: Message) -> Result<(), RelayEnd> {
        let target_error = |err: &dyn std::fmt::Display| RelayEnd::TargetClosed {
            close: CloseInfo::error(err),
            abnormal: true,
        };

        let mut extra = self.hooks.outgoing(&message);
        if matches!(message, Message::Pong(_)) {
            extra.extend(self.hooks.pong());
        }
        if !extra.is_empty() {
            for message in extra {
                self.target.feed(message).await.map_err(|e| target_error(&e))?;
            }
            self.target.flush().await.map_err(|e| target_error(&e))?;
        }

        metrics::record_frame("target_to_client", frame::kind(&message));
        self.source
            .send(message)
            .await
            .map_err(|_| RelayEnd::SourceClosed(CloseInfo::abnormal()))
    }
}

//! Lifecycle hooks.
//!
//! Hooks run inline on the session task, before the frame they observe is
//! forwarded. A hook that returns an error or panics is logged and
//! otherwise ignored: the frame is still relayed.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use url::Url;

use super::{Message, SessionId};

/// Error returned by a hook.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for HookError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

pub type HookResult = Result<(), HookError>;

/// What a hook sees: the session identity and an outbox toward the target.
#[derive(Debug)]
pub struct HookContext {
    session_id: SessionId,
    target: Url,
    attempt: u32,
    outbox: Vec<Message>,
}

impl HookContext {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// URL of the current target connection.
    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Number of completed reconnections in this session.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Queue a frame for the target; sent right after the hook returns.
    pub fn send_to_target(&mut self, message: Message) {
        self.outbox.push(message);
    }
}

type LifecycleHook = Arc<dyn Fn(&mut HookContext) -> HookResult + Send + Sync>;
type MessageHook = Arc<dyn Fn(&mut HookContext, &[u8], bool) -> HookResult + Send + Sync>;

/// Optional callbacks invoked on session events.
#[derive(Clone, Default)]
pub struct HookSet {
    on_connect: Option<LifecycleHook>,
    on_disconnect: Option<LifecycleHook>,
    on_incoming_message: Option<MessageHook>,
    on_outgoing_message: Option<MessageHook>,
    on_pong: Option<LifecycleHook>,
    on_reconnect: Option<LifecycleHook>,
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSet")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_incoming_message", &self.on_incoming_message.is_some())
            .field("on_outgoing_message", &self.on_outgoing_message.is_some())
            .field("on_pong", &self.on_pong.is_some())
            .field("on_reconnect", &self.on_reconnect.is_some())
            .finish()
    }
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The target connection opened for the first time.
    pub fn on_connect(
        mut self,
        f: impl Fn(&mut HookContext) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Closure reached both sides; the session is over.
    pub fn on_disconnect(
        mut self,
        f: impl Fn(&mut HookContext) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// A data frame from the client, before it goes to the target.
    pub fn on_incoming_message(
        mut self,
        f: impl Fn(&mut HookContext, &[u8], bool) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.on_incoming_message = Some(Arc::new(f));
        self
    }

    /// A data frame from the target, before it goes to the client.
    pub fn on_outgoing_message(
        mut self,
        f: impl Fn(&mut HookContext, &[u8], bool) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.on_outgoing_message = Some(Arc::new(f));
        self
    }

    /// The target answered a ping.
    pub fn on_pong(mut self, f: impl Fn(&mut HookContext) -> HookResult + Send + Sync + 'static) -> Self {
        self.on_pong = Some(Arc::new(f));
        self
    }

    /// A replacement target connection opened.
    pub fn on_reconnect(
        mut self,
        f: impl Fn(&mut HookContext) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.on_reconnect = Some(Arc::new(f));
        self
    }
}

/// Invokes a session's hooks with failure containment.
#[derive(Debug, Clone)]
pub struct HookRunner {
    hooks: HookSet,
    session_id: SessionId,
    target: Url,
    attempt: u32,
}

impl HookRunner {
    pub(crate) fn new(hooks: HookSet, session_id: SessionId, target: Url) -> Self {
        Self {
            hooks,
            session_id,
            target,
            attempt: 0,
        }
    }

    pub(crate) fn set_attempt(&mut self, attempt: u32) {
        self.attempt = attempt;
    }

    pub(crate) fn connect(&self) -> Vec<Message> {
        self.lifecycle("on_connect", self.hooks.on_connect.as_ref())
    }

    pub(crate) fn reconnect(&self) -> Vec<Message> {
        self.lifecycle("on_reconnect", self.hooks.on_reconnect.as_ref())
    }

    pub(crate) fn pong(&self) -> Vec<Message> {
        self.lifecycle("on_pong", self.hooks.on_pong.as_ref())
    }

    pub(crate) fn disconnect(&self) {
        self.lifecycle("on_disconnect", self.hooks.on_disconnect.as_ref());
    }

    pub(crate) fn incoming(&self, message: &Message) -> Vec<Message> {
        self.message("on_incoming_message", self.hooks.on_incoming_message.as_ref(), message)
    }

    pub(crate) fn outgoing(&self, message: &Message) -> Vec<Message> {
        self.message("on_outgoing_message", self.hooks.on_outgoing_message.as_ref(), message)
    }

    fn lifecycle(&self, name: &'static str, hook: Option<&LifecycleHook>) -> Vec<Message> {
        match hook {
            Some(hook) => self.invoke(name, |ctx| hook(ctx)),
            None => Vec::new(),
        }
    }

    fn message(&self, name: &'static str, hook: Option<&MessageHook>, message: &Message) -> Vec<Message> {
        let (Some(hook), Some((payload, binary))) = (hook, super::frame::data_payload(message)) else {
            return Vec::new();
        };
        self.invoke(name, |ctx| hook(ctx, payload, binary))
    }

    fn invoke(&self, name: &'static str, f: impl FnOnce(&mut HookContext) -> HookResult) -> Vec<Message> {
        let mut ctx = HookContext {
            session_id: self.session_id,
            target: self.target.clone(),
            attempt: self.attempt,
            outbox: Vec::new(),
        };
        match catch_unwind(AssertUnwindSafe(|| f(&mut ctx))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!(session_id = %self.session_id, hook = name, error = %err, "proxy ws hook failed");
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(session_id = %self.session_id, hook = name, error = %message, "proxy ws hook panicked");
            }
        }
        ctx.outbox
    }
}

//! Socket relay subsystem.
//!
//! # Data Flow
//! ```text
//! accepted source socket
//!     → session.rs (one task per client connection)
//!     → dial.rs (open target, bounded by the policy timeout)
//!     → pump.rs (ConnectionRelay: frames both ways, close propagation)
//!         ⇄ heartbeat.rs (ping target, detect a dead peer)
//!         ⇄ hooks.rs (user callbacks, failures contained)
//!     → on abnormal target loss: reconnect.rs (backoff, redial, re-arm)
//! ```
//!
//! # Design Decisions
//! - Source and target are both `BoxSocket`, a tungstenite frame stream + sink
//! - Each session owns its sockets; nothing is shared between sessions
//! - Exactly one target is polled at a time; a replaced target is dropped
//!   before its successor is dialed
//! - Frames read while no target is open wait in a bounded queue; when it
//!   is full the source is not read (backpressure, never drops)

use futures_util::{Sink, Stream};
use tokio_tungstenite::tungstenite;

pub mod dial;
pub mod frame;
pub mod heartbeat;
pub mod hooks;
pub mod policy;
pub mod pump;
pub mod reconnect;
pub mod session;

pub use dial::{DialError, DialParams, TargetDialer, TungsteniteDialer};
pub use frame::{normalize, CloseInfo};
pub use heartbeat::{HeartbeatMonitor, HeartbeatState, Tick};
pub use hooks::{HookContext, HookError, HookResult, HookSet};
pub use policy::ReconnectPolicy;
pub use pump::{ConnectionRelay, RelayEnd};
pub use session::{RelaySession, SessionId};

pub use tungstenite::Message;

/// Error type of every relayed socket.
pub type WsError = tungstenite::Error;

/// A message socket: frames in, frames out.
pub trait Socket:
    Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + Unpin
{
}

impl<T> Socket for T where
    T: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + Unpin
{
}

/// Type-erased socket used for both sides of a session.
pub type BoxSocket = Box<dyn Socket>;

//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, per-listener ProxyFrontend)
//!     → tower-http request ID layers, request.rs (RequestContext)
//!     → routing layer resolves the upstream and rewritten path
//!     → upgrade request: websocket.rs (handshake, relay session)
//!     → plain request:   forward.rs (stream to upstream, rewrite Location)
//!     → Send to client
//! ```

pub mod forward;
pub mod request;
pub mod server;
pub mod websocket;

pub use forward::Forwarder;
pub use request::{RequestContext, UpgradeInfo, X_REQUEST_ID};
pub use server::{ListenerId, ProxyFrontend, ProxyServer};

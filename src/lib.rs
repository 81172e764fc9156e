//! Reverse proxy for plain HTTP and WebSocket traffic.
//!
//! Registrations map URL prefixes to upstream backends. Plain requests are
//! forwarded with their paths rewritten; upgrade requests become relay
//! sessions that survive backend restarts when a reconnection policy is set.

// Core subsystems
pub mod config;
pub mod http;
pub mod relay;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use http::{ProxyFrontend, ProxyServer};
pub use lifecycle::ShutdownCoordinator;
pub use relay::{HookSet, ReconnectPolicy};
pub use routing::{RouteOptions, UpstreamRegistry};

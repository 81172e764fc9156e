//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (RequestContext: host, path, headers, method)
//!     → registry.rs (longest matching prefix, dynamic resolver)
//!     → matcher.rs (methods, route patterns, constraints; plain requests only)
//!     → rewrite.rs (destination path + re-encoded query)
//!     → Return: Resolution or ResolveError (404 / 502)
//!
//! Route Compilation (at registration):
//!     RouteOptions[]
//!     → Validate, compile matchers and reconnection policy
//!     → Sort by prefix length, descending
//! ```
//!
//! # Design Decisions
//! - Routes compiled at registration, immutable at runtime
//! - No regex in hot path (segment matching only)
//! - Deterministic: same input always matches same route
//! - First match wins; equal prefix lengths keep registration order

pub mod matcher;
pub mod registry;
pub mod rewrite;

pub use registry::{
    Resolution, ResolveError, RouteOptions, UpstreamRegistry, UpstreamResolver, UpstreamRoute,
    UpstreamTarget,
};
pub use rewrite::{rewrite, PrefixPattern};

//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Target dial / upstream request:
//!     → timeouts.rs (optional deadline per dial or request)
//!     → On socket target loss: backoff.rs (delay before the next dial)
//! ```
//!
//! # Design Decisions
//! - Every external call can carry a deadline; zero in config means none
//! - The backoff schedule is deterministic (no jitter)
//! - Retries apply to socket targets only; plain requests are forwarded once

pub mod backoff;
pub mod timeouts;

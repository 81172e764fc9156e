//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     shutdown() → refuse upgrades (503) → close sessions (1001)
//!                → drain (bounded) → release listeners
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → ShutdownCoordinator::shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop upgrades, close sessions, close listeners
//! - Shutdown has timeout: listeners are released after the drain deadline
//!   even if some sessions are still open

pub mod shutdown;
pub mod signals;

pub use shutdown::{SessionGuard, ShutdownCoordinator, ShutdownSignal};

//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap target dials and upstream requests with an optional deadline
//! - Keep "no deadline" explicit (`None`) instead of a magic huge duration
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Timed-out plain requests return 504 Gateway Timeout; timed-out dials
//!   count as failed reconnection attempts

use std::future::Future;
use std::time::Duration;

pub use tokio::time::error::Elapsed;

/// Run `future` under `limit`, or unbounded when `limit` is `None`.
pub async fn with_deadline<F: Future>(limit: Option<Duration>, future: F) -> Result<F::Output, Elapsed> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future).await,
        None => Ok(future.await),
    }
}

/// Milliseconds of an optional limit, for error messages and logs.
pub fn as_millis(limit: Option<Duration>) -> u64 {
    limit.map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

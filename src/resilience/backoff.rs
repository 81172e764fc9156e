//! Reconnection backoff schedule.

use std::time::Duration;

/// Delay before reconnection attempt `attempt` (zero based).
///
/// `interval × (attempt == 0 ? 1 : decay × attempt)`. No jitter: the
/// schedule is observable and must be reproducible.
pub fn reconnect_delay(interval: Duration, decay: f64, attempt: u32) -> Duration {
    let factor = if attempt == 0 {
        1.0
    } else {
        decay * f64::from(attempt)
    };
    let nanos = (interval.as_nanos() as f64 * factor).round();
    if nanos.is_finite() && nanos < u64::MAX as f64 {
        Duration::from_nanos(nanos as u64)
    } else {
        Duration::MAX
    }
}

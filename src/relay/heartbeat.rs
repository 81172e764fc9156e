//! Heartbeat monitor for one target connection.
//!
//! ```text
//! Idle ──arm()──▶ Armed ──tick w/o activity──▶ Broken
//!                   │
//!                   └──stop()──▶ Stopped
//! ```
//!
//! Each tick either finds activity since the previous tick (clear the flag,
//! send a ping) or finds none (broken). Once broken or stopped the timer is
//! gone, so the same target is never pinged or marked broken again.

use std::future;
use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatState {
    Idle,
    Armed,
    Broken,
    Stopped,
}

/// Outcome of a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Still alive: send a ping.
    Ping,
    /// Nothing heard since the last ping: terminate the target.
    Broken,
}

#[derive(Debug)]
pub struct HeartbeatMonitor {
    period: Option<Duration>,
    interval: Option<Interval>,
    alive: bool,
    state: HeartbeatState,
}

impl HeartbeatMonitor {
    /// `None` disables the heartbeat; `tick` then never completes.
    pub fn new(period: Option<Duration>) -> Self {
        Self {
            period,
            interval: None,
            alive: false,
            state: HeartbeatState::Idle,
        }
    }

    /// Start the timer for a freshly opened target.
    pub fn arm(&mut self) {
        let Some(period) = self.period else {
            return;
        };
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        self.alive = true;
        self.state = HeartbeatState::Armed;
    }

    /// A pong or any other inbound frame.
    pub fn record_activity(&mut self) {
        self.alive = true;
    }

    /// Cancel the timer without marking the target broken.
    pub fn stop(&mut self) {
        self.interval = None;
        if self.state == HeartbeatState::Armed {
            self.state = HeartbeatState::Stopped;
        }
    }

    pub fn state(&self) -> HeartbeatState {
        self.state
    }

    /// Wait for the next tick. Cancel-safe.
    pub async fn tick(&mut self) -> Tick {
        let Some(interval) = self.interval.as_mut() else {
            return future::pending().await;
        };
        interval.tick().await;

        if self.alive {
            self.alive = false;
            Tick::Ping
        } else {
            self.interval = None;
            self.state = HeartbeatState::Broken;
            Tick::Broken
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn silent_target_is_broken_exactly_once() {
        let mut heartbeat = HeartbeatMonitor::new(Some(Duration::from_millis(100)));
        assert_eq!(heartbeat.state(), HeartbeatState::Idle);
        heartbeat.arm();
        assert_eq!(heartbeat.state(), HeartbeatState::Armed);

        let start = Instant::now();
        assert_eq!(heartbeat.tick().await, Tick::Ping);
        assert_eq!(start.elapsed(), Duration::from_millis(100));
        assert_eq!(heartbeat.tick().await, Tick::Broken);
        assert_eq!(heartbeat.state(), HeartbeatState::Broken);

        // No further pings or broken reports for this target.
        let next = time::timeout(Duration::from_secs(10), heartbeat.tick()).await;
        assert!(next.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn activity_keeps_target_alive() {
        let mut heartbeat = HeartbeatMonitor::new(Some(Duration::from_millis(100)));
        heartbeat.arm();
        for _ in 0..5 {
            assert_eq!(heartbeat.tick().await, Tick::Ping);
            heartbeat.record_activity();
        }
        assert_eq!(heartbeat.state(), HeartbeatState::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_without_breaking() {
        let mut heartbeat = HeartbeatMonitor::new(Some(Duration::from_millis(100)));
        heartbeat.arm();
        heartbeat.stop();
        assert_eq!(heartbeat.state(), HeartbeatState::Stopped);
        assert!(time::timeout(Duration::from_secs(1), heartbeat.tick()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_heartbeat_never_ticks() {
        let mut heartbeat = HeartbeatMonitor::new(None);
        heartbeat.arm();
        assert_eq!(heartbeat.state(), HeartbeatState::Idle);
        assert!(time::timeout(Duration::from_secs(60), heartbeat.tick()).await.is_err());
    }
}

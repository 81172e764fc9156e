//! Reconnection policy, validated once at registration.

use std::time::Duration;

use crate::config::{ConfigError, ReconnectConfig};
use crate::resilience::backoff::reconnect_delay;

/// How a session replaces a lost target connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Heartbeat period; zero disables the heartbeat.
    pub ping_interval: Duration,
    pub reconnect_interval: Duration,
    pub reconnect_decay: f64,
    /// `None` retries forever.
    pub max_reconnection_retries: Option<u32>,
    /// Bound on a single dial; zero means unbounded.
    pub connection_timeout: Duration,
    pub reconnect_on_normal_close: bool,
    pub logging_enabled: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_millis(30_000),
            reconnect_interval: Duration::from_millis(1_000),
            reconnect_decay: 1.5,
            max_reconnection_retries: None,
            connection_timeout: Duration::from_millis(5_000),
            reconnect_on_normal_close: false,
            logging_enabled: false,
        }
    }
}

impl ReconnectPolicy {
    /// Validate every field independently and fill in defaults.
    pub fn from_config(config: &ReconnectConfig) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            ping_interval: millis("ping_interval_ms", config.ping_interval_ms)?
                .unwrap_or(defaults.ping_interval),
            reconnect_interval: millis("reconnect_interval_ms", config.reconnect_interval_ms)?
                .unwrap_or(defaults.reconnect_interval),
            reconnect_decay: match config.reconnect_decay {
                Some(decay) if !(decay >= 1.0 && decay.is_finite()) => {
                    return Err(ConfigError::InvalidPolicy {
                        field: "reconnect_decay",
                        reason: "must be a number greater than or equal to 1",
                    })
                }
                Some(decay) => decay,
                None => defaults.reconnect_decay,
            },
            max_reconnection_retries: match config.max_reconnection_retries {
                Some(retries) if retries < 1 => {
                    return Err(ConfigError::InvalidPolicy {
                        field: "max_reconnection_retries",
                        reason: "must be a number greater than or equal to 1",
                    })
                }
                Some(retries) => Some(u32::try_from(retries).unwrap_or(u32::MAX)),
                None => defaults.max_reconnection_retries,
            },
            connection_timeout: millis("connection_timeout_ms", config.connection_timeout_ms)?
                .unwrap_or(defaults.connection_timeout),
            reconnect_on_normal_close: config
                .reconnect_on_normal_close
                .unwrap_or(defaults.reconnect_on_normal_close),
            logging_enabled: config.logs.unwrap_or(defaults.logging_enabled),
        })
    }

    /// Wait before reconnection attempt `attempt` (zero based).
    pub fn delay(&self, attempt: u32) -> Duration {
        reconnect_delay(self.reconnect_interval, self.reconnect_decay, attempt)
    }

    pub fn heartbeat_period(&self) -> Option<Duration> {
        (!self.ping_interval.is_zero()).then_some(self.ping_interval)
    }

    pub fn dial_timeout(&self) -> Option<Duration> {
        (!self.connection_timeout.is_zero()).then_some(self.connection_timeout)
    }

    pub fn retries_exhausted(&self, attempts: u32) -> bool {
        self.max_reconnection_retries
            .is_some_and(|max| attempts >= max)
    }
}

fn millis(field: &'static str, value: Option<i64>) -> Result<Option<Duration>, ConfigError> {
    match value {
        Some(ms) if ms < 0 => Err(ConfigError::InvalidPolicy {
            field,
            reason: "must be a non-negative number",
        }),
        Some(ms) => Ok(Some(Duration::from_millis(ms.unsigned_abs()))),
        None => Ok(None),
    }
}

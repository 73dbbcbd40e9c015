mod error;

use std::time::Duration;

pub use error::*;

pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-session knobs shared read-only by every session of a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Interval between two throughput lines.
    pub tick_period: Duration,
    /// Upper bound for dialing the remote target.
    pub connect_timeout: Option<Duration>,
    /// Upper bound for a read or write while neither direction moves a byte.
    pub idle_timeout: Option<Duration>,
    /// How long the remote may stay silent after the inbound side is done.
    pub drain_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            connect_timeout: None,
            idle_timeout: None,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub listen: String,
    pub remote: String,
    pub session: SessionOptions,
}

impl RelayConfig {
    pub fn new(listen: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            listen: listen.into(),
            remote: remote.into(),
            session: Default::default(),
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::EmptyAddress("listen"));
        }
        if self.remote.trim().is_empty() {
            return Err(ConfigError::EmptyAddress("remote"));
        }
        let SessionOptions {
            tick_period,
            connect_timeout,
            idle_timeout,
            drain_timeout,
        } = &self.session;
        if tick_period.is_zero() {
            return Err(ConfigError::ZeroTickPeriod);
        }
        if connect_timeout.map_or(false, |t| t.is_zero()) {
            return Err(ConfigError::ZeroTimeout("connect_timeout"));
        }
        if idle_timeout.map_or(false, |t| t.is_zero()) {
            return Err(ConfigError::ZeroTimeout("idle_timeout"));
        }
        if drain_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("drain_timeout"));
        }
        Ok(())
    }
}

//! Reconnect backoff for stream targets.

use std::time::Duration;

use opsdiag_core::config::ForwarderConfig;

/// Exponential reconnect delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl Backoff {
    /// Creates the default backoff.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backoff from forwarder configuration.
    #[must_use]
    pub fn from_config(config: &ForwarderConfig) -> Self {
        Self::new()
            .with_initial_delay(config.reconnect_initial)
            .with_max_delay(config.reconnect_max)
    }

    /// Sets the initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the multiplier.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Delay before reconnect attempt `attempt` (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64();
        #[allow(clippy::cast_possible_wrap)] // capped below i32::MAX
        let grown = base * self.multiplier.powi(attempt.min(64) as i32);
        Duration::from_secs_f64(grown.min(self.max_delay.as_secs_f64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let b = Backoff::default();
        assert_eq!(b.delay_for(0), Duration::from_millis(200));
        assert_eq!(b.delay_for(1), Duration::from_millis(400));
        assert_eq!(b.delay_for(2), Duration::from_millis(800));
        assert_eq!(b.delay_for(7), Duration::from_secs(25) + Duration::from_millis(600));
        assert_eq!(b.delay_for(8), Duration::from_secs(30));
        assert_eq!(b.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_from_config() {
        let config = ForwarderConfig {
            reconnect_initial: Duration::from_millis(50),
            reconnect_max: Duration::from_secs(1),
            ..ForwarderConfig::default()
        };
        let b = Backoff::from_config(&config);
        assert_eq!(b.delay_for(0), Duration::from_millis(50));
        assert_eq!(b.delay_for(10), Duration::from_secs(1));
    }
}

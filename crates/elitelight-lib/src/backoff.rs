//! Cooldown schedule for reachability probes.
//!
//! After a failed probe the device is left alone for a while; each further
//! consecutive failure lengthens the pause (exponential, capped) so an
//! offline strip is not hammered with connection attempts.

use std::time::Duration;

/// Configuration for the probe cooldown.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Cooldown after the first failure.
    pub initial_delay: Duration,
    /// Upper bound for the cooldown.
    pub max_delay: Duration,
    /// Multiplier applied per additional consecutive failure (typically 2.0).
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Cooldown after `consecutive_failures` failed probes in a row.
    ///
    /// Zero failures means no cooldown. The sequence is non-decreasing and
    /// never exceeds `max_delay`; multipliers below 1 are treated as 1.
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let multiplier = self.multiplier.max(1.0);
        let exponent = (consecutive_failures - 1).min(64) as i32;
        let secs = self.initial_delay.as_secs_f64() * multiplier.powi(exponent);
        let max = self.max_delay.max(self.initial_delay);
        if !secs.is_finite() || secs >= max.as_secs_f64() {
            return max;
        }
        Duration::from_secs_f64(secs).min(max)
    }
}

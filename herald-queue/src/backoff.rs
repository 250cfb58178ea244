//! Exponential backoff with jitter.
//!
//! Delay for attempt `n` is `base * multiplier^(n-1)`, jittered by up to
//! ±`jitter` and capped at `max_delay`. The defaults (60 s base, ×2,
//! ±25 %, 1 h cap) protect third-party providers during partial outages
//! while bounding worst-case latency for transient errors.

use std::time::Duration;

use herald_core::config::RetrySettings;

/// Backoff policy over the configured retry settings.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    settings: RetrySettings,
}

impl BackoffPolicy {
    /// Creates a policy from retry settings.
    #[must_use]
    pub fn new(settings: RetrySettings) -> Self {
        Self { settings }
    }

    /// Retry budget per record.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.settings.max_retries
    }

    /// Calculates the jittered delay before the given attempt (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.settings.base_delay.as_millis() as f64
            * self.settings.multiplier.powi(attempt as i32 - 1);
        let capped = base.min(self.settings.max_delay.as_millis() as f64);

        // Jitter in [-jitter, +jitter], derived from the clock the way the
        // rest of the codebase avoids pulling in a rand dependency for a
        // single call site.
        let spread = (rand_unit() * 2.0 - 1.0) * self.settings.jitter;
        let jittered = (capped * (1.0 + spread)).max(0.0);

        Duration::from_millis(jittered.min(self.settings.max_delay.as_millis() as f64) as u64)
    }

    /// The unjittered bounds for an attempt's delay, for assertions.
    #[must_use]
    pub fn delay_bounds(&self, attempt: u32) -> (Duration, Duration) {
        let base = self.settings.base_delay.as_millis() as f64
            * self.settings.multiplier.powi(attempt as i32 - 1);
        let capped = base.min(self.settings.max_delay.as_millis() as f64);
        let low = capped * (1.0 - self.settings.jitter);
        let high = capped * (1.0 + self.settings.jitter);
        (
            Duration::from_millis(low as u64),
            Duration::from_millis(high.min(self.settings.max_delay.as_millis() as f64) as u64),
        )
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(RetrySettings::default())
    }
}

/// Pseudo-random value in [0, 1) from the system clock.
fn rand_unit() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

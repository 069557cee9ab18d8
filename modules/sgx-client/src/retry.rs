use std::time::Duration;

/// Exponential backoff policy applied to every outbound call.
///
/// Delay before retry `n` (zero-based) is `base * multiplier^n`, clamped to
/// `[base, max_delay]`. Callers add sub-second random jitter at the sleep
/// site to avoid lockstep retries across workers.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, multiplier: u64, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_secs(1),
            multiplier,
            max_delay,
        }
    }

    /// Backoff duration before the given zero-based retry attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt);
        let delay = self
            .base_delay
            .saturating_mul(factor.min(u32::MAX as u64) as u32);
        delay.clamp(self.base_delay, self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, 2, Duration::from_secs(10))
    }
}

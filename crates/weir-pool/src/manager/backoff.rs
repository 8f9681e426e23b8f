//! Exponential backoff for initialization retries

use std::time::Duration;

/// Exponential backoff with a configurable multiplier and cap.
///
/// # Example
///
/// ```
/// use weir_pool::manager::BackoffStrategy;
/// use std::time::Duration;
///
/// let backoff = BackoffStrategy::new(100, 30_000);
///
/// assert_eq!(backoff.calculate_delay(0), Duration::from_millis(100));
/// assert_eq!(backoff.calculate_delay(1), Duration::from_millis(200));
///
/// // Delay grows exponentially but is capped at max
/// let delay = backoff.calculate_delay(20);
/// assert!(delay <= Duration::from_millis(30_000));
/// ```
#[derive(Debug, Clone)]
pub struct BackoffStrategy {
    /// Initial delay in milliseconds for the first retry
    initial_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential growth)
    max_ms: u64,
    /// Multiplier for exponential growth (default: 2.0)
    multiplier: f64,
}

impl BackoffStrategy {
    /// Create a new backoff strategy with the given initial and maximum
    /// delays.
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        Self {
            initial_ms: initial_ms.max(1),
            max_ms: max_ms.max(initial_ms),
            multiplier: 2.0,
        }
    }

    /// Set the multiplier for exponential growth.
    ///
    /// Default is 2.0 (delay doubles each attempt).
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Calculate the delay for a given attempt number.
    ///
    /// Attempt 0 returns the initial delay, with subsequent attempts
    /// growing exponentially up to the maximum.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.initial_ms as f64) * self.multiplier.powi(attempt as i32);
        let capped_ms = delay_ms.min(self.max_ms as f64) as u64;
        Duration::from_millis(capped_ms)
    }

    /// Get the initial delay.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    /// Get the maximum delay.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

impl Default for BackoffStrategy {
    /// Default backoff: 1 second initial, 30 seconds max, 2x multiplier
    fn default() -> Self {
        Self::new(1_000, 30_000)
    }
}

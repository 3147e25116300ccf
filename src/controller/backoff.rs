//! # Exponential Backoff
//!
//! Per-resource retry delays used by the error policy.
//!
//! The delay doubles after every failure, starting at `min` and capped at `max`.
//! A successful reconciliation resets the sequence.
//!
//! ## Usage
//!
//! ```rust
//! use logging_operator::controller::backoff::ExponentialBackoff;
//!
//! let mut backoff = ExponentialBackoff::new(5, 60);
//! assert_eq!(backoff.next_backoff_seconds(), 5);
//! assert_eq!(backoff.next_backoff_seconds(), 10);
//! assert_eq!(backoff.next_backoff_seconds(), 20);
//! assert_eq!(backoff.next_backoff_seconds(), 40);
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! ```

use std::time::Duration;

/// Exponential backoff calculator
///
/// Each delay is twice the previous one, capped at `max_secs`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Starting delay in seconds (for reset)
    min_secs: u64,
    /// Delay returned by the next call
    current_secs: u64,
    /// Upper bound in seconds
    max_secs: u64,
}

impl ExponentialBackoff {
    /// Create a backoff starting at `min_secs` and capped at `max_secs`
    ///
    /// A zero minimum is raised to one second so the sequence can grow.
    /// A maximum below the minimum is raised to the minimum.
    ///
    /// # Example
    ///
    /// ```
    /// use logging_operator::controller::backoff::ExponentialBackoff;
    ///
    /// let backoff = ExponentialBackoff::new(5, 300);
    /// ```
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        let min_secs = min_secs.max(1);
        Self {
            min_secs,
            current_secs: min_secs,
            max_secs: max_secs.max(min_secs),
        }
    }

    /// Get the next delay in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_secs;
        self.current_secs = self.current_secs.saturating_mul(2).min(self.max_secs);
        result
    }

    /// Get the next delay as a `Duration` and advance the sequence
    ///
    /// # Example
    ///
    /// ```
    /// use logging_operator::controller::backoff::ExponentialBackoff;
    /// use std::time::Duration;
    ///
    /// let mut backoff = ExponentialBackoff::new(1, 60);
    /// assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
    /// assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
    /// ```
    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    /// Reset the backoff to the starting delay
    pub fn reset(&mut self) {
        self.current_secs = self.min_secs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::new(5, 300);

        assert_eq!(backoff.next_backoff_seconds(), 5);
        assert_eq!(backoff.next_backoff_seconds(), 10);
        assert_eq!(backoff.next_backoff_seconds(), 20);
        assert_eq!(backoff.next_backoff_seconds(), 40);
        assert_eq!(backoff.next_backoff_seconds(), 80);
        assert_eq!(backoff.next_backoff_seconds(), 160);
        assert_eq!(backoff.next_backoff_seconds(), 300);
        assert_eq!(backoff.next_backoff_seconds(), 300);
    }

    #[test]
    fn test_exponential_backoff_reset() {
        let mut backoff = ExponentialBackoff::new(5, 300);
        backoff.next_backoff_seconds();
        backoff.next_backoff_seconds();
        backoff.next_backoff_seconds();

        backoff.reset();

        assert_eq!(backoff.next_backoff_seconds(), 5);
        assert_eq!(backoff.next_backoff_seconds(), 10);
    }

    #[test]
    fn test_degenerate_bounds() {
        let mut zero = ExponentialBackoff::new(0, 0);
        assert_eq!(zero.next_backoff_seconds(), 1);
        assert_eq!(zero.next_backoff_seconds(), 1);

        let mut inverted = ExponentialBackoff::new(30, 10);
        assert_eq!(inverted.next_backoff(), Duration::from_secs(30));
        assert_eq!(inverted.next_backoff(), Duration::from_secs(30));
    }

    #[test]
    fn test_no_overflow_near_max() {
        let mut backoff = ExponentialBackoff::new(u64::MAX / 2 + 1, u64::MAX);
        backoff.next_backoff_seconds();
        assert_eq!(backoff.next_backoff_seconds(), u64::MAX);
    }
}

//! Exponential backoff calculation.
//!
//! Pure function of its inputs; the retry transport decides *whether* to wait,
//! this module only decides *how long*.

use std::time::Duration;

/// Compute the backoff delay for a 1-based attempt number.
///
/// The delay grows as `min * coefficient^(attempt - 1)`, clamped to `max`.
/// The first attempt always waits exactly `min`; delays are monotone
/// non-decreasing in the attempt number for any `coefficient >= 1.0`.
///
/// No jitter is applied. Callers that want jitter must fold it in themselves.
pub fn exponential_backoff(attempt: u32, min: Duration, max: Duration, coefficient: f64) -> Duration {
    if attempt <= 1 {
        return min.min(max);
    }

    let min_ms = min.as_millis() as f64;
    let max_ms = max.as_millis() as f64;
    // The exponent is capped: growth has long since hit the clamp by then,
    // and a raw u32 -> i32 cast would wrap for attempts past i32::MAX.
    let exponent = attempt.saturating_sub(1).min(1_024) as i32;
    let scaled = min_ms * coefficient.powi(exponent);

    if !scaled.is_finite() || scaled >= max_ms {
        return max;
    }

    Duration::from_millis(scaled as u64).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The first attempt waits exactly the configured minimum.
    #[test]
    fn test_first_attempt_equals_min() {
        let delay = exponential_backoff(
            1,
            Duration::from_secs(10),
            Duration::from_secs(600),
            2.0,
        );
        assert_eq!(delay, Duration::from_secs(10));
    }

    /// Delays follow the closed form min * c^(attempt-1) until the clamp.
    #[test]
    fn test_closed_form_growth() {
        let min = Duration::from_millis(100);
        let max = Duration::from_secs(60);

        assert_eq!(exponential_backoff(2, min, max, 2.0), Duration::from_millis(200));
        assert_eq!(exponential_backoff(3, min, max, 2.0), Duration::from_millis(400));
        assert_eq!(exponential_backoff(4, min, max, 2.0), Duration::from_millis(800));
        assert_eq!(exponential_backoff(5, min, max, 3.0), Duration::from_millis(8100));
    }

    /// Large attempt numbers clamp to the maximum instead of overflowing.
    #[test]
    fn test_clamps_to_max() {
        let min = Duration::from_secs(10);
        let max = Duration::from_secs(600);

        assert_eq!(exponential_backoff(30, min, max, 2.0), max);
        assert_eq!(exponential_backoff(u32::MAX, min, max, 2.0), max);
    }

    /// Attempt numbers past the i32 range still clamp instead of wrapping
    /// or panicking on the exponent arithmetic.
    #[test]
    fn test_clamps_past_i32_range() {
        let min = Duration::from_secs(10);
        let max = Duration::from_secs(600);

        for attempt in [2_147_483_647, 2_147_483_648, 3_000_000_000, u32::MAX] {
            assert_eq!(exponential_backoff(attempt, min, max, 2.0), max, "attempt {attempt}");
        }
    }

    /// Delays never decrease as the attempt number grows.
    #[test]
    fn test_monotone_non_decreasing() {
        let min = Duration::from_millis(50);
        let max = Duration::from_secs(30);

        let mut previous = Duration::ZERO;
        for attempt in 1..=40 {
            let delay = exponential_backoff(attempt, min, max, 2.0);
            assert!(delay >= previous, "attempt {attempt} regressed");
            previous = delay;
        }
    }

    /// A coefficient of 1.0 keeps every delay at the minimum.
    #[test]
    fn test_flat_coefficient() {
        let min = Duration::from_secs(5);
        let max = Duration::from_secs(600);

        for attempt in 1..=10 {
            assert_eq!(exponential_backoff(attempt, min, max, 1.0), min);
        }
    }

    /// A zero attempt number (out of contract) degrades to the minimum.
    #[test]
    fn test_zero_attempt_degrades_to_min() {
        let delay = exponential_backoff(
            0,
            Duration::from_secs(1),
            Duration::from_secs(10),
            2.0,
        );
        assert_eq!(delay, Duration::from_secs(1));
    }
}

//! Exponential backoff schedule.

use std::time::Duration;

/// Delay to wait before `attempt` (1-based).
///
/// The first attempt runs immediately; attempt `k > 1` waits
/// `initial * multiplier^(k-2)`. Non-finite or negative results clamp to zero,
/// overflow saturates at `Duration::MAX`.
pub fn backoff_delay(attempt: u32, initial: Duration, multiplier: f64) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }

    let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
    let secs = initial.as_secs_f64() * multiplier.powi(exponent);
    if !secs.is_finite() {
        return if secs.is_nan() { Duration::ZERO } else { Duration::MAX };
    }
    if secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

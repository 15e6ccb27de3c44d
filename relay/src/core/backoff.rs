//! Retry delay schedule for bounded retries.

use std::time::Duration;

/// Delay before retry number `retry` (0-based): `initial * 2^retry`, capped at `max`.
pub fn backoff_delay(retry: u32, initial: Duration, max: Duration) -> Duration {
    let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
    initial.saturating_mul(factor).min(max)
}

/// Whole milliseconds in `delay`, saturating at `u64::MAX`.
pub fn delay_millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

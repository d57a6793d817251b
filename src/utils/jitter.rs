//! Jitter utility for poll and retry delays

use std::time::Duration;

/// Generate a random jitter between 0 and `max_jitter_ms` (inclusive)
///
/// # Examples
/// ```
/// use m3u_job_queue::utils::jitter::generate_jitter_ms;
///
/// let jitter = generate_jitter_ms(100);
/// assert!(jitter <= 100);
/// ```
pub fn generate_jitter_ms(max_jitter_ms: u64) -> u64 {
    if max_jitter_ms == 0 {
        return 0;
    }
    rand::random_range(0..=max_jitter_ms)
}

/// Generate jitter as a percentage of a base value
///
/// # Examples
/// ```
/// use m3u_job_queue::utils::jitter::generate_jitter_percent;
///
/// let jitter = generate_jitter_percent(1000, 25); // 0-250ms
/// assert!(jitter <= 250);
/// ```
pub fn generate_jitter_percent(base_value: u64, jitter_percent: u8) -> u64 {
    if jitter_percent == 0 || base_value == 0 {
        return 0;
    }

    let max_jitter = base_value.saturating_mul(jitter_percent as u64) / 100;
    generate_jitter_ms(max_jitter)
}

/// Add up to `jitter_percent` of `delay` on top of it
pub fn with_jitter(delay: Duration, jitter_percent: u8) -> Duration {
    let base_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    delay.saturating_add(Duration::from_millis(generate_jitter_percent(
        base_ms,
        jitter_percent,
    )))
}

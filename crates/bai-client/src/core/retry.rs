use std::time::Duration;

use crate::data::Backoff;

/// Exponential delay: `base * 2^retry_count`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use bai_client::core::retry_delay;
///
/// assert_eq!(retry_delay(0, Duration::from_millis(100)), Duration::from_millis(100));
/// assert_eq!(retry_delay(2, Duration::from_millis(100)), Duration::from_millis(400));
/// ```
pub fn retry_delay(retry_count: u32, base: Duration) -> Duration {
    let multiplier = 2_u32.saturating_pow(retry_count);
    base.saturating_mul(multiplier)
}

/// Delay to sleep before retry number `retry_count` (0-indexed) under `backoff`.
pub fn next_retry_delay(backoff: Backoff, retry_count: u32, base: Duration) -> Duration {
    match backoff {
        Backoff::Fixed => base,
        Backoff::Exponential => retry_delay(retry_count, base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_growth() {
        let base = Duration::from_millis(10);
        let delays: Vec<Duration> = (0..5).map(|i| retry_delay(i, base)).collect();
        for i in 1..delays.len() {
            assert_eq!(delays[i], delays[i - 1] * 2);
        }
    }

    #[test]
    fn test_retry_delay_saturates() {
        let base = Duration::from_secs(u64::MAX / 2);
        assert_eq!(retry_delay(40, base), Duration::MAX);
    }

    #[test]
    fn test_fixed_backoff_is_constant() {
        let base = Duration::from_millis(250);
        for retry in 0..4 {
            assert_eq!(next_retry_delay(Backoff::Fixed, retry, base), base);
        }
        assert_eq!(next_retry_delay(Backoff::Exponential, 3, base), Duration::from_secs(2));
    }
}

use std::time::Duration;

/// Upper bound on any single retry delay.
pub const MAX_DELAY: Duration = Duration::from_secs(60);

/// `base * 2^(attempt - 1)`, saturating and capped at [`MAX_DELAY`]. Attempts count from 1.
pub fn exponential(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_secs(1);
        assert_eq!(exponential(base, 1), Duration::from_secs(1));
        assert_eq!(exponential(base, 2), Duration::from_secs(2));
        assert_eq!(exponential(base, 3), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_caps_instead_of_overflowing() {
        let base = Duration::from_millis(500);
        assert_eq!(exponential(base, 8), MAX_DELAY);
        assert_eq!(exponential(base, 33), MAX_DELAY);
        assert_eq!(exponential(base, 40), MAX_DELAY);
        assert_eq!(exponential(Duration::MAX, u32::MAX), MAX_DELAY);
    }

    #[test]
    fn test_zeroth_attempt_waits_base() {
        assert_eq!(exponential(Duration::from_millis(10), 0), Duration::from_millis(10));
    }
}

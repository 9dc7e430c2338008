//! Retry delay calculation.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::RunPolicy;

/// Jitter applied on top of the capped exponential delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter; delays are exact.
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// Capped exponential delay before retry number `retry_index` (0-based).
///
/// `delay = min(base * 2^retry_index, max)`, then jitter.
#[must_use]
pub fn backoff_delay(policy: &RunPolicy, retry_index: u32) -> Duration {
    let base = policy.base_delay_ms;
    let max = policy.max_delay_ms;

    let delay = base
        .saturating_mul(2u64.saturating_pow(retry_index))
        .min(max);

    let jittered = match policy.jitter {
        JitterStrategy::None => delay,
        JitterStrategy::Full => {
            if delay == 0 {
                0
            } else {
                rand::thread_rng().gen_range(0..=delay)
            }
        }
        JitterStrategy::Equal => {
            let half = delay / 2;
            if half == 0 {
                delay
            } else {
                half + rand::thread_rng().gen_range(0..=half)
            }
        }
    };

    Duration::from_millis(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base: u64, max: u64) -> RunPolicy {
        RunPolicy::new()
            .with_base_delay_ms(base)
            .with_max_delay_ms(max)
    }

    #[test]
    fn test_exponential_growth() {
        let p = policy(100, 10_000);
        assert_eq!(backoff_delay(&p, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(&p, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(&p, 3), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_is_capped() {
        let p = policy(1000, 2500);
        assert_eq!(backoff_delay(&p, 5), Duration::from_millis(2500));
        assert_eq!(backoff_delay(&p, 63), Duration::from_millis(2500));
    }

    #[test]
    fn test_full_jitter_bounded() {
        let p = policy(400, 10_000).with_jitter(JitterStrategy::Full);
        for _ in 0..50 {
            assert!(backoff_delay(&p, 1) <= Duration::from_millis(800));
        }
    }

    #[test]
    fn test_equal_jitter_at_least_half() {
        let p = policy(400, 10_000).with_jitter(JitterStrategy::Equal);
        for _ in 0..50 {
            let d = backoff_delay(&p, 0);
            assert!(d >= Duration::from_millis(200));
            assert!(d <= Duration::from_millis(400));
        }
    }

    #[test]
    fn test_jitter_serde_names() {
        let json = serde_json::to_string(&JitterStrategy::Equal).unwrap();
        assert_eq!(json, "\"equal\"");
        assert_eq!(JitterStrategy::default(), JitterStrategy::None);
    }
}

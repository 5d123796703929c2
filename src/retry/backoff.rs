use crate::config::RetryPolicy;
use rand::Rng;
use std::time::Duration;

/// Exponential delay before retry number `retry` (1-based), without jitter.
pub fn exponential_delay_ms(policy: &RetryPolicy, retry: u32) -> u64 {
    let base = policy.base_delay_ms.max(1);
    let max = policy.max_delay_ms.max(base);
    let factor = 2u64.saturating_pow(retry.saturating_sub(1));
    base.saturating_mul(factor).min(max)
}

/// Delay with an explicit jitter sample in `[-1, 1]`, clamped to the policy bounds.
pub fn jittered_delay_ms(policy: &RetryPolicy, retry: u32, sample: f64) -> u64 {
    let delay = exponential_delay_ms(policy, retry) as f64;
    let sample = sample.clamp(-1.0, 1.0);
    let jittered = delay + delay * policy.jitter * sample;

    let min = policy.min_delay_ms.min(policy.max_delay_ms) as f64;
    let max = policy.max_delay_ms as f64;
    jittered.clamp(min, max).round() as u64
}

/// Randomized delay before retry number `retry`.
pub fn backoff_delay(policy: &RetryPolicy, retry: u32) -> Duration {
    let sample = rand::rng().random_range(-1.0..=1.0);
    Duration::from_millis(jittered_delay_ms(policy, retry, sample))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth_is_capped() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (1..=6)
            .map(|retry| exponential_delay_ms(&policy, retry))
            .collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 10_000, 10_000]);
    }

    #[test]
    fn test_jitter_extremes() {
        let policy = RetryPolicy::default();
        assert_eq!(jittered_delay_ms(&policy, 1, -1.0), 750);
        assert_eq!(jittered_delay_ms(&policy, 1, 1.0), 1_250);
        assert_eq!(jittered_delay_ms(&policy, 1, 0.0), 1_000);
        // Capped base plus positive jitter is clamped back to the ceiling.
        assert_eq!(jittered_delay_ms(&policy, 8, 1.0), 10_000);
    }

    #[test]
    fn test_floor_applies_after_jitter() {
        let policy = RetryPolicy {
            base_delay_ms: 100,
            max_delay_ms: 10_000,
            min_delay_ms: 100,
            jitter: 0.25,
        };
        assert_eq!(jittered_delay_ms(&policy, 1, -1.0), 100);
    }

    #[test]
    fn test_random_delays_stay_in_bounds() {
        let policy = RetryPolicy::default();
        for retry in 1..=10 {
            for _ in 0..50 {
                let delay = backoff_delay(&policy, retry).as_millis() as u64;
                assert!((100..=10_000).contains(&delay), "retry {retry}: {delay}");
            }
        }
    }
}

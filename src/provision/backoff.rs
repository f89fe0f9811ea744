use std::time::Duration;

use rand::Rng;

use super::engine::RetryPolicy;

/// Deterministic part of the inter-cycle delay:
/// `min(base · 2^min(attempts, cap) + jitter, max)`.
pub fn backoff_delay(policy: &RetryPolicy, attempts: u32, jitter: Duration) -> Duration {
    let exp = attempts.min(policy.max_backoff_attempts).min(31);
    let base = policy.base_backoff.saturating_mul(1u32 << exp);
    base.saturating_add(jitter).min(policy.max_backoff)
}

/// Decorrelated jitter: a uniform whole multiple of the jitter step, so
/// concurrent runs spread out instead of herding on the same boundary.
pub fn draw_jitter(policy: &RetryPolicy) -> Duration {
    policy.jitter_step * rand::thread_rng().gen_range(0..=policy.jitter_units)
}

/// Uniform pause between AD attempts within a cycle.
pub fn draw_inter_ad_pause(policy: &RetryPolicy) -> Duration {
    let min = policy.inter_ad_min.as_millis() as u64;
    let max = policy.inter_ad_max.as_millis() as u64;
    if max <= min {
        return policy.inter_ad_min;
    }
    Duration::from_millis(rand::thread_rng().gen_range(min..=max))
}

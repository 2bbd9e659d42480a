//! Pure retry-delay computation, kept separate from the HTTP client so it
//! can be tested without a network or a clock mock.

use rand::Rng;
use std::time::Duration;

const MAX_DELAY_SECS: f64 = 15.0;

/// Exponential backoff with additive jitter: `base * 2^attempt + uniform(0,
/// 0.25)`, capped at 15s. `attempt` is zero-indexed (the delay before the
/// *first* retry uses `attempt = 0`).
pub fn backoff_delay(base_secs: f64, attempt: u32) -> Duration {
    let exp = base_secs * 2f64.powi(attempt as i32);
    let jitter = rand::thread_rng().gen_range(0.0..0.25);
    Duration::from_secs_f64((exp + jitter).clamp(0.0, MAX_DELAY_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_with_attempt() {
        let d0 = backoff_delay(1.0, 0);
        let d3 = backoff_delay(1.0, 3);
        assert!(d3 > d0);
    }

    #[test]
    fn delay_is_never_negative() {
        assert!(backoff_delay(0.0, 0) >= Duration::ZERO);
    }

    #[test]
    fn jitter_keeps_delay_within_bounds() {
        for _ in 0..50 {
            let d = backoff_delay(1.0, 2);
            let secs = d.as_secs_f64();
            assert!((4.0..4.25).contains(&secs), "{secs} out of expected [4, 4.25) range with jitter");
        }
    }

    #[test]
    fn delay_is_capped_at_fifteen_seconds() {
        for _ in 0..20 {
            let d = backoff_delay(1.0, 10);
            assert!(d.as_secs_f64() <= MAX_DELAY_SECS);
        }
    }
}

//! Token bucket state and the refill/consume step shared by every store.
//!
//! Tokens are `f64` and fractional tokens are kept across refills. The Redis
//! script performs the same arithmetic with Lua doubles and writes them with
//! `%.17g`, which round-trips every double, so both stores agree exactly.

use crate::error::{ThrottlerError, ThrottlerResult};

/// Upper bound on a bucket's TTL (one year). Policies whose full refill takes
/// longer keep their buckets for this long at most.
pub const MAX_EXPIRY_SECS: u64 = 365 * 24 * 60 * 60;

/// Capacity and refill rate a bucket is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Policy {
    /// Maximum burst size.
    pub capacity: f64,
    /// Tokens granted per second.
    pub refill_rate: f64,
}

impl Policy {
    pub fn new(capacity: f64, refill_rate: f64) -> ThrottlerResult<Self> {
        let policy = Self {
            capacity,
            refill_rate,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// `count` requests per `period_secs`, with a burst of `count`.
    pub fn per_period(count: f64, period_secs: f64) -> ThrottlerResult<Self> {
        if !(period_secs.is_finite() && period_secs > 0.0) {
            return Err(ThrottlerError::InvalidPolicy(format!(
                "period must be a positive number of seconds, got {}",
                period_secs
            )));
        }
        Self::new(count, count / period_secs)
    }

    pub fn validate(&self) -> ThrottlerResult<()> {
        if !(self.capacity.is_finite() && self.capacity > 0.0) {
            return Err(ThrottlerError::InvalidPolicy(format!(
                "capacity must be a positive finite number, got {}",
                self.capacity
            )));
        }
        if !(self.refill_rate.is_finite() && self.refill_rate > 0.0) {
            return Err(ThrottlerError::InvalidPolicy(format!(
                "refill rate must be a positive finite number, got {}",
                self.refill_rate
            )));
        }
        Ok(())
    }

    /// Seconds for an empty bucket to refill completely, clamped to
    /// `1..=MAX_EXPIRY_SECS`; used as the key TTL.
    pub fn expiry_secs(&self) -> u64 {
        ((self.capacity / self.refill_rate).ceil() as u64).clamp(1, MAX_EXPIRY_SECS)
    }

    /// Seconds until `remaining` grows to one whole token.
    pub fn retry_after_secs(&self, remaining: f64) -> u64 {
        if remaining >= 1.0 {
            return 0;
        }
        (((1.0 - remaining) / self.refill_rate).ceil() as u64).max(1)
    }
}

/// Persisted bucket state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub tokens: f64,
    /// Unix seconds of the last update.
    pub timestamp: u64,
}

impl Bucket {
    pub fn full(policy: &Policy, now: u64) -> Self {
        Self {
            tokens: policy.capacity,
            timestamp: now,
        }
    }
}

/// Outcome of a single evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    /// Tokens left after this call's effect.
    pub remaining: f64,
}

/// Refill `bucket` up to `now`, then try to take one token.
///
/// A missing bucket starts full. Elapsed time is clamped at zero and the
/// stored timestamp never moves backwards.
pub fn evaluate(bucket: Option<Bucket>, policy: &Policy, now: u64) -> (Bucket, Decision) {
    let Bucket { tokens, timestamp } = bucket.unwrap_or_else(|| Bucket::full(policy, now));

    let delta = now.saturating_sub(timestamp) as f64;
    let mut tokens = (tokens + delta * policy.refill_rate).min(policy.capacity);

    let allowed = tokens >= 1.0;
    if allowed {
        tokens -= 1.0;
    }

    let updated = Bucket {
        tokens,
        timestamp: timestamp.max(now),
    };

    (
        updated,
        Decision {
            allowed,
            remaining: tokens,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn ten_per_minute() -> Policy {
        Policy::per_period(10.0, 60.0).unwrap()
    }

    #[test]
    fn test_cold_start_is_full() {
        let policy = Policy::new(5.0, 1.0).unwrap();
        let (bucket, decision) = evaluate(None, &policy, 1_000);

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4.0);
        assert_eq!(bucket.timestamp, 1_000);
    }

    #[test]
    fn test_exhaustion_and_refill() {
        let policy = ten_per_minute();
        let mut bucket = None;

        for expected in (0..10).rev() {
            let (next, decision) = evaluate(bucket, &policy, 100);
            assert!(decision.allowed);
            assert!((decision.remaining - expected as f64).abs() < EPS);
            bucket = Some(next);
        }

        let (next, decision) = evaluate(bucket, &policy, 100);
        assert!(!decision.allowed);
        assert!(decision.remaining < 1.0);
        bucket = Some(next);

        // 6s at 1/6 token per second is one token.
        let (_, decision) = evaluate(bucket, &policy, 106);
        assert!(decision.allowed);
        assert!(decision.remaining.abs() < EPS);
    }

    #[test]
    fn test_refill_caps_at_capacity() {
        let policy = Policy::new(3.0, 100.0).unwrap();
        let drained = Bucket {
            tokens: 0.0,
            timestamp: 0,
        };
        let (bucket, decision) = evaluate(Some(drained), &policy, 3_600);

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2.0);
        assert!(bucket.tokens <= policy.capacity);
    }

    #[test]
    fn test_fractional_tokens_accumulate() {
        let policy = Policy::new(2.0, 0.4).unwrap();
        let bucket = Bucket {
            tokens: 0.0,
            timestamp: 10,
        };

        let (bucket, decision) = evaluate(Some(bucket), &policy, 11);
        assert!(!decision.allowed);
        assert!((decision.remaining - 0.4).abs() < EPS);

        let (bucket, decision) = evaluate(Some(bucket), &policy, 12);
        assert!(!decision.allowed);
        assert!((decision.remaining - 0.8).abs() < EPS);

        let (_, decision) = evaluate(Some(bucket), &policy, 13);
        assert!(decision.allowed);
        assert!((decision.remaining - 0.2).abs() < EPS);
    }

    #[test]
    fn test_third_of_a_token_per_second_recovers_after_three_seconds() {
        let policy = Policy::new(1.0, 1.0 / 3.0).unwrap();
        let mut bucket = Some(Bucket {
            tokens: 0.0,
            timestamp: 0,
        });

        let mut allowed = Vec::new();
        for now in 1..=3 {
            let (next, decision) = evaluate(bucket, &policy, now);
            allowed.push(decision.allowed);
            bucket = Some(next);
        }
        assert_eq!(allowed, vec![false, false, true]);
    }

    #[test]
    fn test_clock_skew_does_not_drain_or_rewind() {
        let policy = Policy::new(5.0, 1.0).unwrap();
        let stored = Bucket {
            tokens: 2.5,
            timestamp: 500,
        };
        let (bucket, decision) = evaluate(Some(stored), &policy, 490);

        assert!(decision.allowed);
        assert!((decision.remaining - 1.5).abs() < EPS);
        assert_eq!(bucket.timestamp, 500);
    }

    #[test]
    fn test_fractional_capacity() {
        let policy = Policy::new(2.5, 1.0).unwrap();
        let (bucket, first) = evaluate(None, &policy, 0);
        let (bucket, second) = evaluate(Some(bucket), &policy, 0);
        let (_, third) = evaluate(Some(bucket), &policy, 0);

        assert!(first.allowed);
        assert!(second.allowed);
        assert!(!third.allowed);
        assert!((third.remaining - 0.5).abs() < EPS);
    }

    #[test]
    fn test_policy_validation() {
        assert!(Policy::new(10.0, 0.5).is_ok());
        assert!(Policy::new(0.0, 1.0).is_err());
        assert!(Policy::new(-1.0, 1.0).is_err());
        assert!(Policy::new(10.0, 0.0).is_err());
        assert!(Policy::new(f64::NAN, 1.0).is_err());
        assert!(Policy::new(10.0, f64::INFINITY).is_err());
        assert!(Policy::per_period(10.0, 0.0).is_err());
    }

    #[test]
    fn test_expiry_secs() {
        assert_eq!(ten_per_minute().expiry_secs(), 60);
        assert_eq!(Policy::new(5.0, 2.0).unwrap().expiry_secs(), 3);
        assert_eq!(Policy::new(1.0, 1000.0).unwrap().expiry_secs(), 1);
    }

    #[test]
    fn test_expiry_secs_is_capped() {
        let slow = Policy::new(1.0, 1e-20).unwrap();
        assert_eq!(slow.expiry_secs(), MAX_EXPIRY_SECS);

        let huge = Policy::new(f64::MAX, 1e-300).unwrap();
        assert_eq!(huge.expiry_secs(), MAX_EXPIRY_SECS);
    }

    #[test]
    fn test_retry_after_secs() {
        let policy = ten_per_minute();
        assert_eq!(policy.retry_after_secs(0.0), 6);
        assert_eq!(policy.retry_after_secs(0.5), 3);
        assert_eq!(policy.retry_after_secs(4.0), 0);
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::BucketStore;
use crate::clock::{Clock, SystemClock};
use crate::error::ThrottlerResult;
use crate::token_bucket::{self, Bucket, Decision, Policy};

/// Evaluations between sweeps of expired buckets.
pub const DEFAULT_PURGE_INTERVAL: u64 = 1024;

struct Entry {
    bucket: Bucket,
    expires_at: u64,
}

/// Single-process bucket store.
///
/// All evaluations go through one mutex, which gives the same per-key
/// atomicity the Redis script provides. An expired bucket is ignored when its
/// key is next touched, and every `purge_interval` evaluations all expired
/// buckets are swept, so idle keys do not accumulate. [`purge_expired`]
/// sweeps on demand.
///
/// [`purge_expired`]: InMemoryBucketStore::purge_expired
#[derive(Clone)]
pub struct InMemoryBucketStore {
    buckets: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
    evaluations: Arc<AtomicU64>,
    purge_interval: u64,
}

impl InMemoryBucketStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// `clock` is used only when a caller asks for store-side time.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            clock,
            evaluations: Arc::new(AtomicU64::new(0)),
            purge_interval: DEFAULT_PURGE_INTERVAL,
        }
    }

    /// Sweep expired buckets every `interval` evaluations (at least 1).
    pub fn with_purge_interval(mut self, interval: u64) -> Self {
        self.purge_interval = interval.max(1);
        self
    }

    /// Current state of a bucket, for inspection in tests and diagnostics.
    pub async fn peek(&self, key: &str) -> Option<Bucket> {
        let buckets = self.buckets.lock().await;
        buckets.get(key).map(|entry| entry.bucket)
    }

    pub async fn len(&self) -> usize {
        self.buckets.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.buckets.lock().await.is_empty()
    }

    /// Drop buckets whose expiry is at or before `now`; returns how many.
    pub async fn purge_expired(&self, now: u64) -> usize {
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        buckets.retain(|_, entry| entry.expires_at > now);
        before - buckets.len()
    }
}

impl Default for InMemoryBucketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BucketStore for InMemoryBucketStore {
    async fn evaluate(
        &self,
        key: &str,
        policy: &Policy,
        now: Option<u64>,
    ) -> ThrottlerResult<Decision> {
        let now = now.unwrap_or_else(|| self.clock.now_secs());
        let mut buckets = self.buckets.lock().await;

        let count = self.evaluations.fetch_add(1, Ordering::Relaxed) + 1;
        if count % self.purge_interval == 0 {
            buckets.retain(|_, entry| entry.expires_at > now);
        }

        let current = buckets
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.bucket);

        let (bucket, decision) = token_bucket::evaluate(current, policy, now);
        buckets.insert(
            key.to_string(),
            Entry {
                bucket,
                expires_at: now.saturating_add(policy.expiry_secs()),
            },
        );

        Ok(decision)
    }

    async fn ping(&self) -> ThrottlerResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_persists_between_calls() {
        let store = InMemoryBucketStore::new();
        let policy = Policy::new(3.0, 1.0).unwrap();

        store.evaluate("k", &policy, Some(10)).await.unwrap();
        let decision = store.evaluate("k", &policy, Some(10)).await.unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1.0);
        assert_eq!(
            store.peek("k").await,
            Some(Bucket {
                tokens: 1.0,
                timestamp: 10
            })
        );
    }

    #[tokio::test]
    async fn test_idle_bucket_expires() {
        let store = InMemoryBucketStore::new();
        let policy = Policy::new(2.0, 1.0).unwrap();

        store.evaluate("k", &policy, Some(0)).await.unwrap();
        store.evaluate("k", &policy, Some(0)).await.unwrap();
        assert_eq!(store.len().await, 1);

        assert_eq!(store.purge_expired(1).await, 0);
        assert_eq!(store.purge_expired(2).await, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_evaluate_sweeps_idle_buckets() {
        let store = InMemoryBucketStore::new().with_purge_interval(2);
        let policy = Policy::new(2.0, 1.0).unwrap();

        store.evaluate("a", &policy, Some(0)).await.unwrap();
        store.evaluate("b", &policy, Some(10)).await.unwrap();

        assert!(store.peek("a").await.is_none());
        assert!(store.peek("b").await.is_some());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_many_distinct_keys_stay_bounded() {
        let store = InMemoryBucketStore::new().with_purge_interval(16);
        let policy = Policy::new(1.0, 1.0).unwrap();

        for now in 0..1_000u64 {
            store.evaluate(&format!("k{}", now), &policy, Some(now)).await.unwrap();
        }
        assert!(store.len().await <= 16);
    }

    #[tokio::test]
    async fn test_very_slow_refill_near_epoch_end() {
        let store = InMemoryBucketStore::new();
        let policy = Policy::new(1.0, 1e-20).unwrap();

        assert!(store.evaluate("k", &policy, Some(1_700_000_000)).await.unwrap().allowed);
        assert!(!store.evaluate("k", &policy, Some(1_700_000_000)).await.unwrap().allowed);

        assert!(store.evaluate("late", &policy, Some(u64::MAX - 1)).await.unwrap().allowed);
        assert!(!store.evaluate("late", &policy, Some(u64::MAX - 1)).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_store_side_time_uses_clock() {
        let clock = ManualClock::new(1_000);
        let store = InMemoryBucketStore::with_clock(Arc::new(clock.clone()));
        let policy = Policy::new(1.0, 1.0).unwrap();

        assert!(store.evaluate("k", &policy, None).await.unwrap().allowed);
        assert!(!store.evaluate("k", &policy, None).await.unwrap().allowed);

        clock.advance(1);
        assert!(store.evaluate("k", &policy, None).await.unwrap().allowed);
        assert_eq!(store.peek("k").await.unwrap().timestamp, 1_001);
    }
}

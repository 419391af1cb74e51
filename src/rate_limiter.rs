use std::sync::Arc;

use tracing::{debug, instrument};

use crate::clock::{Clock, SystemClock};
use crate::config::TimeSource;
use crate::error::{ThrottlerError, ThrottlerResult};
use crate::key_generator::KeyGenerator;
use crate::store::BucketStore;
use crate::token_bucket::{Decision, Policy};

/// Stateless front of the bucket store: validates input, picks the time,
/// and runs one atomic evaluation per call.
///
/// Store errors are returned unchanged; the caller chooses whether a failed
/// check fails open or closed.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn BucketStore>,
    clock: Arc<dyn Clock>,
    time_source: TimeSource,
    keys: KeyGenerator,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn BucketStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            time_source: TimeSource::Caller,
            keys: KeyGenerator::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_time_source(mut self, time_source: TimeSource) -> Self {
        self.time_source = time_source;
        self
    }

    /// Take one token from the bucket at `key` if available.
    #[instrument(level = "debug", skip(self))]
    pub async fn check(
        &self,
        key: &str,
        capacity: f64,
        refill_rate: f64,
    ) -> ThrottlerResult<Decision> {
        if key.is_empty() {
            return Err(ThrottlerError::InvalidKey(
                "Rate limit key cannot be empty".to_string(),
            ));
        }
        let policy = Policy::new(capacity, refill_rate)?;

        let now = match self.time_source {
            TimeSource::Caller => Some(self.clock.now_secs()),
            TimeSource::Store => None,
        };

        let decision = self.store.evaluate(key, &policy, now).await?;
        debug!(
            key,
            allowed = decision.allowed,
            remaining = decision.remaining,
            "Evaluated token bucket"
        );

        Ok(decision)
    }

    /// Check `identity` against `policy` under the `scope` namespace.
    pub async fn check_policy(
        &self,
        scope: &str,
        identity: &str,
        policy: &Policy,
    ) -> ThrottlerResult<Decision> {
        let key = self.keys.bucket_key(scope, identity)?;
        self.check(&key, policy.capacity, policy.refill_rate).await
    }

    pub async fn ping(&self) -> ThrottlerResult<()> {
        self.store.ping().await
    }
}

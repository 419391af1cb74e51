//! Bucket store adapters.
//!
//! A store owns bucket state and applies [`token_bucket::evaluate`] to one key
//! as a single atomic unit. Callers never read or write buckets any other way.
//!
//! [`token_bucket::evaluate`]: crate::token_bucket::evaluate

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;

use crate::error::ThrottlerResult;
use crate::token_bucket::{Decision, Policy};

pub use memory::InMemoryBucketStore;
pub use redis_store::{RedisBucketStore, RedisStoreConfig};

#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Atomically refill the bucket at `key`, try to take one token, persist
    /// the result and refresh the key's expiry.
    ///
    /// `now` is Unix seconds supplied by the caller. `None` lets the store
    /// use its own clock.
    async fn evaluate(
        &self,
        key: &str,
        policy: &Policy,
        now: Option<u64>,
    ) -> ThrottlerResult<Decision>;

    /// Round trip to the backing store.
    async fn ping(&self) -> ThrottlerResult<()>;
}

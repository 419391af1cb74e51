//! Redis-backed bucket store.
//!
//! Every evaluation is one `EVALSHA` (falling back to `EVAL`) of
//! [`TOKEN_BUCKET_SCRIPT`], so concurrent callers on any number of hosts are
//! serialized per key by Redis itself.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, IntoConnectionInfo, Script};
use tokio::sync::OnceCell;
use tokio::time;
use tracing::{debug, info};

use super::BucketStore;
use crate::error::{ThrottlerError, ThrottlerResult};
use crate::token_bucket::{Decision, Policy};

/// KEYS[1] = bucket key
/// ARGV[1] = capacity, ARGV[2] = refill rate (tokens/s), ARGV[3] = now (s),
/// ARGV[4] = TTL (s)
///
/// An empty ARGV[3] makes the script read the server clock. Tokens are written
/// and returned with `%.17g`: `tostring` keeps only 14 digits, and a bare Lua
/// number in a reply is truncated to an integer.
pub const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])
if now == nil then
  now = tonumber(redis.call("TIME")[1])
end

local bucket = redis.call("HMGET", key, "tokens", "timestamp")
local tokens = tonumber(bucket[1])
local last = tonumber(bucket[2])

if tokens == nil or last == nil then
  tokens = capacity
  last = now
end

local delta = math.max(0, now - last)
tokens = math.min(capacity, tokens + delta * refill_rate)

local allowed = tokens >= 1
if allowed then
  tokens = tokens - 1
end

local encoded = string.format("%.17g", tokens)
redis.call("HSET", key, "tokens", encoded, "timestamp", math.max(last, now))
redis.call("EXPIRE", key, ttl)

return { allowed and 1 or 0, encoded }
"#;

#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub url: String,
    /// Overrides any password embedded in `url`.
    pub password: Option<String>,
    /// Bound on connecting and on each script round trip.
    pub timeout: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            password: None,
            timeout: Duration::from_millis(500),
        }
    }
}

/// Redis bucket store holding one shared multiplexed connection.
///
/// The connection is established by [`init`](Self::init). Until then every
/// operation fails with [`ThrottlerError::NotInitialized`]; once connected,
/// further `init` calls keep the existing connection.
pub struct RedisBucketStore {
    client: Client,
    timeout: Duration,
    script: Script,
    connection: OnceCell<MultiplexedConnection>,
}

impl RedisBucketStore {
    pub fn new(config: RedisStoreConfig) -> ThrottlerResult<Self> {
        let mut info = config.url.as_str().into_connection_info().map_err(|e| {
            ThrottlerError::Configuration(format!("Invalid Redis URL: {}", e))
        })?;
        if let Some(password) = config.password.filter(|p| !p.is_empty()) {
            info.redis.password = Some(password);
        }

        let client = Client::open(info).map_err(|e| {
            ThrottlerError::Configuration(format!("Failed to create Redis client: {}", e))
        })?;

        Ok(Self {
            client,
            timeout: config.timeout,
            script: Script::new(TOKEN_BUCKET_SCRIPT),
            connection: OnceCell::new(),
        })
    }

    /// Connect to Redis. Idempotent: concurrent and repeated calls share the
    /// first successful connection.
    pub async fn init(&self) -> ThrottlerResult<()> {
        if self.connection.initialized() {
            debug!("Redis bucket store already initialized");
            return Ok(());
        }

        self.connection
            .get_or_try_init(|| async {
                let conn = time::timeout(
                    self.timeout,
                    self.client.get_multiplexed_tokio_connection(),
                )
                .await
                .map_err(|_| {
                    ThrottlerError::StoreUnavailable(format!(
                        "Timed out connecting to Redis after {:?}",
                        self.timeout
                    ))
                })??;
                info!("Connected to Redis bucket store");
                Ok::<_, ThrottlerError>(conn)
            })
            .await?;

        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.connection.initialized()
    }

    fn connection(&self) -> ThrottlerResult<MultiplexedConnection> {
        self.connection
            .get()
            .cloned()
            .ok_or(ThrottlerError::NotInitialized)
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> ThrottlerResult<T>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        match time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| {
                ThrottlerError::StoreUnavailable(format!("{} failed: {}", what, e))
            }),
            Err(_) => Err(ThrottlerError::StoreUnavailable(format!(
                "{} timed out after {:?}",
                what, self.timeout
            ))),
        }
    }
}

#[async_trait]
impl BucketStore for RedisBucketStore {
    async fn evaluate(
        &self,
        key: &str,
        policy: &Policy,
        now: Option<u64>,
    ) -> ThrottlerResult<Decision> {
        let mut conn = self.connection()?;

        let mut invocation = self.script.key(key);
        invocation.arg(policy.capacity).arg(policy.refill_rate);
        match now {
            Some(now) => invocation.arg(now),
            None => invocation.arg(""),
        };
        invocation.arg(policy.expiry_secs());

        let (allowed, remaining): (i64, String) = self
            .bounded("Token bucket script", invocation.invoke_async(&mut conn))
            .await?;

        let remaining = remaining.parse::<f64>().map_err(|e| {
            ThrottlerError::StoreUnavailable(format!(
                "Malformed token count '{}' from Redis: {}",
                remaining, e
            ))
        })?;

        Ok(Decision {
            allowed: allowed == 1,
            remaining,
        })
    }

    async fn ping(&self) -> ThrottlerResult<()> {
        let mut conn = self.connection()?;
        let _: String = self
            .bounded("PING", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }
}

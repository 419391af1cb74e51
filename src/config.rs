use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

use crate::config_validator::ConfigValidator;
use crate::error::ThrottlerResult;
use crate::store::RedisStoreConfig;
use crate::token_bucket::Policy;

/// What to do with a request when the bucket store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FailMode {
    /// Let the request through and log the failure.
    Open,
    /// Answer as if the caller were rate limited.
    Closed,
}

/// Where the evaluation timestamp comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TimeSource {
    /// The calling process's clock.
    Caller,
    /// The store's clock (`TIME` inside the script).
    Store,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "throttler", version, about = "Distributed token-bucket rate limiter")]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Redis password, overrides one embedded in the URL
    #[arg(long, env = "REDIS_PASSWORD", hide_env_values = true)]
    pub redis_password: Option<String>,

    /// Bound on connecting to and each round trip with Redis
    #[arg(long, env = "STORE_TIMEOUT", default_value = "500ms", value_parser = parse_duration)]
    pub store_timeout: Duration,

    /// Burst size of the global per-client policy
    #[arg(long, env = "GLOBAL_CAPACITY", default_value_t = 10.0)]
    pub global_capacity: f64,

    /// Tokens per second granted by the global per-client policy
    #[arg(long, env = "GLOBAL_REFILL_RATE", default_value_t = 10.0 / 60.0)]
    pub global_refill_rate: f64,

    /// Behaviour when the store is unavailable
    #[arg(long, env = "FAIL_MODE", value_enum, default_value_t = FailMode::Closed)]
    pub fail_mode: FailMode,

    /// Clock used to timestamp bucket updates
    #[arg(long, env = "TIME_SOURCE", value_enum, default_value_t = TimeSource::Caller)]
    pub time_source: TimeSource,

    /// Derive client identity from X-Forwarded-For / X-Real-IP
    #[arg(long, env = "TRUST_PROXY_HEADERS", default_value_t = false)]
    pub trust_proxy_headers: bool,

    /// Log level for the throttler target
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

impl Config {
    /// Load configuration from command-line arguments and environment
    pub fn from_env() -> ThrottlerResult<Self> {
        let config = Config::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ThrottlerResult<()> {
        ConfigValidator::validate_redis_url(&self.redis_url)?;
        ConfigValidator::validate_timeout(self.store_timeout)?;
        ConfigValidator::validate_rate_limit(self.global_capacity, self.global_refill_rate)?;
        ConfigValidator::validate_log_level(&self.log_level)?;
        Ok(())
    }

    pub fn global_policy(&self) -> ThrottlerResult<Policy> {
        Policy::new(self.global_capacity, self.global_refill_rate)
    }

    pub fn redis_store_config(&self) -> RedisStoreConfig {
        RedisStoreConfig {
            url: self.redis_url.clone(),
            password: self.redis_password.clone(),
            timeout: self.store_timeout,
        }
    }
}

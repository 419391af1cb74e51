use anyhow::{Context, Result};
use std::sync::Arc;
use throttler::config::Config;
use throttler::rate_limiter::RateLimiter;
use throttler::server::Server;
use throttler::store::RedisBucketStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("throttler={},tower_http=debug", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting throttler service");
    tracing::info!(
        bind_addr = %config.bind_addr,
        fail_mode = ?config.fail_mode,
        time_source = ?config.time_source,
        capacity = config.global_capacity,
        refill_rate = config.global_refill_rate,
        "Configuration loaded"
    );

    // One store per process, connected once and shared by every request.
    let store = Arc::new(
        RedisBucketStore::new(config.redis_store_config())
            .context("Failed to create Redis bucket store")?,
    );
    store
        .init()
        .await
        .context("Failed to connect to Redis")?;

    let rate_limiter = RateLimiter::new(store).with_time_source(config.time_source);

    let server = Server::new(&config, rate_limiter).context("Failed to create server")?;

    server
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

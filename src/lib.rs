pub mod clock;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod handlers;
pub mod key_generator;
pub mod middleware;
pub mod rate_limiter;
pub mod response;
pub mod server;
pub mod store;
pub mod token_bucket;
pub mod validation;

pub use config::Config;
pub use error::{ThrottlerError, ThrottlerResult};
pub use rate_limiter::RateLimiter;
pub use server::create_app;
pub use token_bucket::{Decision, Policy};

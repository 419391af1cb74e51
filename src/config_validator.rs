use std::time::Duration;

use crate::error::ThrottlerError;
use crate::token_bucket::Policy;

/// Validates configuration values before the service starts
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a Redis URL
    pub fn validate_redis_url(url: &str) -> Result<(), ThrottlerError> {
        if url.is_empty() {
            return Err(ThrottlerError::Configuration(
                "Redis URL cannot be empty".to_string(),
            ));
        }

        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(ThrottlerError::Configuration(
                "Redis URL must start with 'redis://' or 'rediss://'".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates rate limit parameters
    pub fn validate_rate_limit(capacity: f64, refill_rate: f64) -> Result<(), ThrottlerError> {
        Policy {
            capacity,
            refill_rate,
        }
        .validate()
    }

    pub fn validate_timeout(timeout: Duration) -> Result<(), ThrottlerError> {
        if timeout.is_zero() {
            return Err(ThrottlerError::Configuration(
                "Store timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_log_level(level: &str) -> Result<(), ThrottlerError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level.to_lowercase().as_str()) {
            return Err(ThrottlerError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {:?}",
                level, valid_levels
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_redis_url() {
        assert!(ConfigValidator::validate_redis_url("redis://localhost:6379").is_ok());
        assert!(ConfigValidator::validate_redis_url("rediss://localhost:6379").is_ok());
    }

    #[test]
    fn test_invalid_redis_url() {
        assert!(ConfigValidator::validate_redis_url("").is_err());
        assert!(ConfigValidator::validate_redis_url("http://localhost:6379").is_err());
    }

    #[test]
    fn test_valid_rate_limit() {
        assert!(ConfigValidator::validate_rate_limit(10.0, 10.0 / 60.0).is_ok());
    }

    #[test]
    fn test_invalid_rate_limit() {
        assert!(ConfigValidator::validate_rate_limit(0.0, 10.0).is_err());
        assert!(ConfigValidator::validate_rate_limit(100.0, 0.0).is_err());
        assert!(ConfigValidator::validate_rate_limit(100.0, f64::NAN).is_err());
    }

    #[test]
    fn test_timeout() {
        assert!(ConfigValidator::validate_timeout(Duration::from_millis(1)).is_ok());
        assert!(ConfigValidator::validate_timeout(Duration::ZERO).is_err());
    }

    #[test]
    fn test_log_level() {
        assert!(ConfigValidator::validate_log_level("debug").is_ok());
        assert!(ConfigValidator::validate_log_level("WARN").is_ok());
        assert!(ConfigValidator::validate_log_level("verbose").is_err());
    }
}

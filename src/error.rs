use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ThrottlerError {
    /// The bucket store was used before `init()` connected it.
    #[error("Bucket store not initialized; call init() at startup")]
    NotInitialized,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded { remaining: f64, retry_after_secs: u64 },
}

pub type ThrottlerResult<T> = Result<T, ThrottlerError>;

impl From<redis::RedisError> for ThrottlerError {
    fn from(err: redis::RedisError) -> Self {
        ThrottlerError::StoreUnavailable(err.to_string())
    }
}

impl ThrottlerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ThrottlerError::NotInitialized => StatusCode::INTERNAL_SERVER_ERROR,
            ThrottlerError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ThrottlerError::InvalidPolicy(_)
            | ThrottlerError::InvalidKey(_)
            | ThrottlerError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ThrottlerError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ThrottlerError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_error(err: &ThrottlerError) -> Self {
        let code = err.status_code().as_u16();
        match err {
            ThrottlerError::NotInitialized => Self::new("not_initialized", &err.to_string(), code),
            ThrottlerError::StoreUnavailable(_) => {
                Self::new("service_unavailable", &err.to_string(), code)
            }
            ThrottlerError::InvalidPolicy(msg) => Self::new("invalid_policy", msg, code),
            ThrottlerError::InvalidKey(msg) => Self::new("invalid_key", msg, code),
            ThrottlerError::ValidationError(msg) => Self::new("validation_error", msg, code),
            ThrottlerError::Configuration(msg) => Self::new("configuration_error", msg, code),
            ThrottlerError::RateLimitExceeded { .. } => {
                Self::new("rate_limit_exceeded", "Too many requests", code)
            }
        }
    }
}

impl IntoResponse for ThrottlerError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_error(&self);
        let mut response = (self.status_code(), Json(body)).into_response();

        if let ThrottlerError::RateLimitExceeded { retry_after_secs, .. } = self {
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from(retry_after_secs));
        }

        response
    }
}

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::config::FailMode;
use crate::error::ThrottlerError;
use crate::rate_limiter::RateLimiter;
use crate::response::{HealthResponse, RateLimitResponse, ReadinessResponse};
use crate::token_bucket::{Decision, Policy};
use crate::validation::{validate_key_format, RequestValidator};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub rate_limiter: RateLimiter,
    /// Policy applied to every caller by the global middleware.
    pub global_policy: Policy,
    pub fail_mode: FailMode,
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckRequest {
    #[validate(length(min = 1, max = 512), custom(function = "validate_key_format"))]
    pub key: String,
    #[validate(range(exclusive_min = 0.0))]
    pub capacity: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub refill_rate: f64,
}

/// `X-RateLimit-*` headers describing a decision.
pub fn rate_limit_headers(decision: &Decision, policy: &Policy) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(limit) = HeaderValue::from_str(&policy.capacity.to_string()) {
        headers.insert("X-RateLimit-Limit", limit);
    }
    headers.insert(
        "X-RateLimit-Remaining",
        HeaderValue::from(decision.remaining.floor().max(0.0) as u64),
    );
    if !decision.allowed {
        headers.insert(
            "Retry-After",
            HeaderValue::from(policy.retry_after_secs(decision.remaining)),
        );
    }
    headers
}

/// Evaluate an arbitrary key against a caller-supplied policy
pub async fn check_rate_limit(
    State(state): State<AppState>,
    Json(payload): Json<CheckRequest>,
) -> Result<impl IntoResponse, ThrottlerError> {
    RequestValidator::validate(&payload)?;
    let policy = Policy::new(payload.capacity, payload.refill_rate)?;

    let decision = state
        .rate_limiter
        .check(&payload.key, policy.capacity, policy.refill_rate)
        .await?;

    let status = if decision.allowed {
        StatusCode::OK
    } else {
        StatusCode::TOO_MANY_REQUESTS
    };

    Ok((
        status,
        rate_limit_headers(&decision, &policy),
        Json(RateLimitResponse::from_decision(&decision, &policy)),
    ))
}

/// Liveness check
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse::healthy())
}

/// Readiness check; ready only when the store answers
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.rate_limiter.ping().await {
        Ok(()) => (StatusCode::OK, Json(ReadinessResponse::ready())),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse::not_ready(e.to_string())),
            )
        }
    }
}

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::FailMode;
use crate::error::ThrottlerError;
use crate::handlers::{rate_limit_headers, AppState};
use crate::key_generator::KeyGenerator;
use crate::token_bucket::{Decision, Policy};

/// Scope of the per-client policy applied to every limited route.
pub const GLOBAL_SCOPE: &str = "global";

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Logging middleware for request/response tracking
pub async fn logging_middleware(mut request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let request_id = match request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(id) => id.to_string(),
        None => {
            let id = Uuid::new_v4().to_string();
            if let Ok(value) = HeaderValue::from_str(&id) {
                request.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            id
        }
    };

    info!(
        target: "throttler::middleware",
        method = %method,
        uri = %uri,
        request_id = %request_id,
        "Incoming request"
    );

    let mut response = next.run(request).await;

    info!(
        target: "throttler::middleware",
        method = %method,
        uri = %uri,
        request_id = %request_id,
        status = %response.status(),
        "Request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Apply the global per-client token bucket.
///
/// A store failure is resolved by the configured [`FailMode`]; other errors
/// are returned to the client as-is.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let identity =
        KeyGenerator::client_identity(request.headers(), peer, state.trust_proxy_headers);
    let policy = state.global_policy;

    match state
        .rate_limiter
        .check_policy(GLOBAL_SCOPE, &identity, &policy)
        .await
    {
        Ok(decision) if decision.allowed => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .extend(rate_limit_headers(&decision, &policy));
            response
        }
        Ok(decision) => {
            info!(
                target: "throttler::middleware",
                client = %identity,
                remaining = decision.remaining,
                "Rate limit exceeded"
            );
            denied_response(&decision, &policy)
        }
        Err(ThrottlerError::StoreUnavailable(reason)) => match state.fail_mode {
            FailMode::Open => {
                warn!(
                    target: "throttler::middleware",
                    client = %identity,
                    reason = %reason,
                    "Rate limit store unavailable, failing open"
                );
                next.run(request).await
            }
            FailMode::Closed => {
                error!(
                    target: "throttler::middleware",
                    client = %identity,
                    reason = %reason,
                    "Rate limit store unavailable, failing closed"
                );
                let empty = Decision {
                    allowed: false,
                    remaining: 0.0,
                };
                denied_response(&empty, &policy)
            }
        },
        Err(e) => {
            error!(
                target: "throttler::middleware",
                client = %identity,
                error = %e,
                "Rate limit check failed"
            );
            e.into_response()
        }
    }
}

fn denied_response(decision: &Decision, policy: &Policy) -> Response {
    let mut response = ThrottlerError::RateLimitExceeded {
        remaining: decision.remaining,
        retry_after_secs: policy.retry_after_secs(decision.remaining),
    }
    .into_response();
    response
        .headers_mut()
        .extend(rate_limit_headers(decision, policy));
    response
}

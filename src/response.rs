use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::token_bucket::{Decision, Policy};

#[derive(Debug, Serialize)]
pub struct RateLimitResponse {
    pub allowed: bool,
    pub remaining: f64,
    pub limit: f64,
    pub retry_after: Option<u64>,
}

impl RateLimitResponse {
    pub fn from_decision(decision: &Decision, policy: &Policy) -> Self {
        Self {
            allowed: decision.allowed,
            remaining: decision.remaining,
            limit: policy.capacity,
            retry_after: (!decision.allowed).then(|| policy.retry_after_secs(decision.remaining)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReadinessResponse {
    pub fn ready() -> Self {
        Self {
            status: "ready".to_string(),
            store: "connected".to_string(),
            error: None,
        }
    }

    pub fn not_ready(error: String) -> Self {
        Self {
            status: "not_ready".to_string(),
            store: "unavailable".to_string(),
            error: Some(error),
        }
    }
}

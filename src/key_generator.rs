//! Bucket key construction and caller identity extraction.

use axum::http::HeaderMap;
use std::net::IpAddr;

use crate::error::{ThrottlerError, ThrottlerResult};

/// Namespace prefix shared by all bucket keys.
pub const KEY_PREFIX: &str = "rate";

/// Builds `rate:<scope>:<identity>` keys.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    prefix: String,
}

impl KeyGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn bucket_key(&self, scope: &str, identity: &str) -> ThrottlerResult<String> {
        if scope.trim().is_empty() {
            return Err(ThrottlerError::InvalidKey(
                "Rate limit scope cannot be empty".to_string(),
            ));
        }
        if identity.trim().is_empty() {
            return Err(ThrottlerError::InvalidKey(
                "Caller identity cannot be empty".to_string(),
            ));
        }

        Ok(format!(
            "{}:{}:{}",
            self.prefix,
            Self::sanitize_key(scope),
            Self::sanitize_key(identity)
        ))
    }

    /// Caller address: forwarding headers first when `trust_proxy_headers`,
    /// then the peer address, then `"unknown"`.
    pub fn client_identity(
        headers: &HeaderMap,
        peer: Option<IpAddr>,
        trust_proxy_headers: bool,
    ) -> String {
        if trust_proxy_headers {
            let forwarded = headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|xff| xff.split(',').next())
                .map(|ip| ip.trim())
                .filter(|ip| !ip.is_empty());

            let header_ip = forwarded.or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(|ip| ip.trim())
                    .filter(|ip| !ip.is_empty())
            });

            if let Some(ip) = header_ip {
                return ip.to_string();
            }
        }

        peer.map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Replace anything outside `[A-Za-z0-9:._-]` with `_`.
    pub fn sanitize_key(key: &str) -> String {
        key.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == ':' || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new(KEY_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn create_test_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("192.168.1.1, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.1"));
        headers
    }

    #[test]
    fn test_bucket_key() {
        let generator = KeyGenerator::default();
        let key = generator.bucket_key("global", "192.168.1.1").unwrap();
        assert_eq!(key, "rate:global:192.168.1.1");
    }

    #[test]
    fn test_ipv6_identity_keeps_colons() {
        let generator = KeyGenerator::default();
        let key = generator.bucket_key("global", "::1").unwrap();
        assert_eq!(key, "rate:global:::1");
    }

    #[test]
    fn test_empty_parts_rejected() {
        let generator = KeyGenerator::default();
        assert!(generator.bucket_key("", "1.2.3.4").is_err());
        assert!(generator.bucket_key("global", "  ").is_err());
    }

    #[test]
    fn test_identity_from_forwarded_header() {
        let headers = create_test_headers();
        let ip = KeyGenerator::client_identity(&headers, None, true);
        assert_eq!(ip, "192.168.1.1");
    }

    #[test]
    fn test_identity_from_real_ip_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.1"));
        let ip = KeyGenerator::client_identity(&headers, None, true);
        assert_eq!(ip, "203.0.113.1");
    }

    #[test]
    fn test_untrusted_headers_use_peer() {
        let headers = create_test_headers();
        let peer: IpAddr = "10.1.2.3".parse().unwrap();
        let ip = KeyGenerator::client_identity(&headers, Some(peer), false);
        assert_eq!(ip, "10.1.2.3");
    }

    #[test]
    fn test_identity_fallback() {
        let ip = KeyGenerator::client_identity(&HeaderMap::new(), None, true);
        assert_eq!(ip, "unknown");
    }

    #[test]
    fn test_sanitize_key() {
        let key = "test@key#with$special%chars";
        let sanitized = KeyGenerator::sanitize_key(key);
        assert_eq!(sanitized, "test_key_with_special_chars");
    }
}

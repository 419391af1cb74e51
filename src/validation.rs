use regex::Regex;
use std::sync::LazyLock;
use validator::{Validate, ValidationError};

use crate::error::ThrottlerError;

static KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9:._\-]+$").expect("key pattern is a valid regex")
});

/// Bucket keys may contain ASCII alphanumerics and `: . _ -`.
pub fn validate_key_format(key: &str) -> Result<(), ValidationError> {
    if KEY_PATTERN.is_match(key) {
        Ok(())
    } else {
        let mut err = ValidationError::new("key_format");
        err.message = Some(
            "key can only contain alphanumeric characters, ':', '.', '_' and '-'".into(),
        );
        Err(err)
    }
}

/// Request validation utilities
pub struct RequestValidator;

impl RequestValidator {
    /// Run `validator` rules and flatten failures into one error message.
    pub fn validate<T: Validate>(request: &T) -> Result<(), ThrottlerError> {
        request.validate().map_err(|errors| {
            let mut messages: Vec<String> = errors
                .field_errors()
                .iter()
                .flat_map(|(field, errs)| {
                    errs.iter().map(move |e| match &e.message {
                        Some(msg) => format!("{}: {}", field, msg),
                        None => format!("{}: {}", field, e.code),
                    })
                })
                .collect();
            messages.sort();
            ThrottlerError::ValidationError(messages.join("; "))
        })
    }
}

//! Request limits.
//!
//! # Responsibilities
//! - Enforce maximum header block, target and body sizes
//! - Enforce the accepted method set
//! - Reject request targets that could escape a document root
//!
//! # Design Decisions
//! - Limits checked before full parsing (early rejection)
//! - Oversized header block answers with the configured status (413 default)
//! - Oversized target is 414, oversized body 413

use crate::config::LimitsConfig;
use crate::error::{LimitKind, RequestError};

/// Methods whose requests carry a body the proxy forwards.
const BODY_METHODS: &[&str] = &["POST", "PUT", "PATCH"];

/// Limits applied by the request reader.
#[derive(Debug, Clone)]
pub struct RequestLimits {
    pub max_header_bytes: usize,
    pub max_target_bytes: usize,
    pub max_body_bytes: usize,
    pub allowed_methods: Vec<String>,
    pub header_overflow_status: u16,
}

impl RequestLimits {
    pub fn from_config(config: &LimitsConfig) -> Self {
        Self {
            max_header_bytes: config.max_header_bytes,
            max_target_bytes: config.max_target_bytes,
            max_body_bytes: config.max_body_bytes,
            allowed_methods: config.allowed_methods.clone(),
            header_overflow_status: config.header_overflow_status,
        }
    }

    /// Value of the `Allow` header sent with a 405.
    pub fn allow_header(&self) -> String {
        self.allowed_methods.join(", ")
    }

    pub fn check_method(&self, method: &str) -> Result<(), RequestError> {
        if self.allowed_methods.iter().any(|m| m == method) {
            Ok(())
        } else {
            Err(RequestError::MethodNotAllowed(method.to_string()))
        }
    }

    pub fn check_header_size(&self, size: usize) -> Result<(), RequestError> {
        if size > self.max_header_bytes {
            return Err(RequestError::TooLarge {
                what: LimitKind::Header,
                limit: self.max_header_bytes,
            });
        }
        Ok(())
    }

    /// Length, form and traversal checks on the request target.
    pub fn check_target(&self, method: &str, target: &str) -> Result<(), RequestError> {
        if target.len() > self.max_target_bytes {
            return Err(RequestError::TooLarge {
                what: LimitKind::Target,
                limit: self.max_target_bytes,
            });
        }
        if target == "*" && method == "OPTIONS" {
            return Ok(());
        }
        if !target.starts_with('/') {
            return Err(RequestError::Malformed(format!(
                "request target must be origin-form: '{target}'"
            )));
        }
        if has_dot_dot_segment(target) {
            return Err(RequestError::Malformed("'..' segment in request target".into()));
        }
        Ok(())
    }

    pub fn check_body_size(&self, declared: usize) -> Result<(), RequestError> {
        if declared > self.max_body_bytes {
            return Err(RequestError::TooLarge {
                what: LimitKind::Body,
                limit: self.max_body_bytes,
            });
        }
        Ok(())
    }
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self::from_config(&LimitsConfig::default())
    }
}

pub fn method_permits_body(method: &str) -> bool {
    BODY_METHODS.contains(&method)
}

/// True when the path (query excluded) has a `..` segment, raw or percent-encoded.
fn has_dot_dot_segment(target: &str) -> bool {
    let path = target.split(['?', '#']).next().unwrap_or_default();
    path.split('/').any(|segment| {
        let lower = segment.to_ascii_lowercase();
        matches!(lower.as_str(), ".." | "%2e%2e" | ".%2e" | "%2e.")
    })
}

//! Error taxonomy for the proxy.
//!
//! # Kinds
//! - [`RequestError`]: client-side faults, answered with a 4xx and a clean close
//! - [`UpstreamError`]: transport failures against a backend, fed to the retry loop
//! - [`ConfigError`] / [`StartupError`]: fatal, the process exits non-zero
//!
//! Exhaustion (every attempt used, or nothing healthy left) is not an error
//! value: the dispatcher answers it directly with a synthetic 502.

use std::fmt;
use std::path::PathBuf;

/// Which request limit was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Header,
    Target,
    Body,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKind::Header => f.write_str("header block"),
            LimitKind::Target => f.write_str("request target"),
            LimitKind::Body => f.write_str("request body"),
        }
    }
}

/// Failures while reading or validating a client request.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("{what} exceeds the limit of {limit} bytes")]
    TooLarge { what: LimitKind, limit: usize },

    #[error("method {0} is not allowed")]
    MethodNotAllowed(String),

    #[error("timed out waiting for the client")]
    Timeout,

    #[error("client closed the connection before sending a complete header")]
    ConnectionClosed,

    #[error("client closed the connection after {received} of {expected} body bytes")]
    UnexpectedEof { expected: usize, received: usize },

    #[error("client i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl RequestError {
    /// Status code answered to the client, or `None` when nobody is listening.
    ///
    /// `header_overflow_status` is the configured answer to an oversized header
    /// block (413 by default).
    pub fn status(&self, header_overflow_status: u16) -> Option<u16> {
        match self {
            RequestError::Malformed(_) | RequestError::UnexpectedEof { .. } => Some(400),
            RequestError::TooLarge { what: LimitKind::Header, .. } => Some(header_overflow_status),
            RequestError::TooLarge { what: LimitKind::Target, .. } => Some(414),
            RequestError::TooLarge { what: LimitKind::Body, .. } => Some(413),
            RequestError::MethodNotAllowed(_) => Some(405),
            RequestError::Timeout => Some(408),
            RequestError::ConnectionClosed | RequestError::Io(_) => None,
        }
    }
}

/// Transport failures against a single backend.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("connect failed: {0}")]
    ConnectFailed(std::io::Error),

    #[error("connect timed out")]
    ConnectTimeout,

    #[error("write failed: {0}")]
    WriteFailed(std::io::Error),

    #[error("upstream did not accept the request in time")]
    WriteTimeout,

    #[error("upstream closed without responding")]
    NoResponse,

    #[error("response read timed out after {received} bytes")]
    ReadTimeout { received: usize },

    #[error("response read failed after {received} bytes: {source}")]
    ReadFailed {
        received: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("upstream closed the connection mid-response")]
    ClosedEarly,

    #[error("response exceeds the limit of {limit} bytes")]
    ResponseTooLarge { limit: usize },

    #[error("overall request deadline elapsed")]
    OverallTimeout,
}

impl UpstreamError {
    /// True when no response byte has been observed, so another backend may be tried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpstreamError::ConnectFailed(_)
                | UpstreamError::ConnectTimeout
                | UpstreamError::WriteFailed(_)
                | UpstreamError::WriteTimeout
                | UpstreamError::NoResponse
        )
    }

    /// Machine-readable token carried in `X-Proxy-Error`.
    pub fn reason(&self) -> &'static str {
        match self {
            UpstreamError::ConnectFailed(_)
            | UpstreamError::ConnectTimeout
            | UpstreamError::WriteFailed(_)
            | UpstreamError::WriteTimeout
            | UpstreamError::NoResponse => "connect_failed",
            UpstreamError::ReadTimeout { .. } | UpstreamError::OverallTimeout => "upstream_timeout",
            UpstreamError::ReadFailed { .. } | UpstreamError::ClosedEarly => "upstream_closed_early",
            UpstreamError::ResponseTooLarge { .. } => "upstream_too_large",
        }
    }
}

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid backend spec '{0}' (expected host:port[:name])")]
    BackendSpec(String),

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// Fatal errors raised before the proxy starts serving.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no backends configured")]
    EmptyBackendList,

    #[error("failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start metrics exporter: {0}")]
    Metrics(String),
}

impl StartupError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            StartupError::Config(_) | StartupError::Metrics(_) => 1,
            StartupError::EmptyBackendList => 2,
            StartupError::BindFailed { .. } => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_map_to_statuses() {
        assert_eq!(RequestError::Malformed("x".into()).status(413), Some(400));
        assert_eq!(
            RequestError::TooLarge { what: LimitKind::Header, limit: 8 }.status(431),
            Some(431)
        );
        assert_eq!(
            RequestError::TooLarge { what: LimitKind::Target, limit: 8 }.status(413),
            Some(414)
        );
        assert_eq!(
            RequestError::TooLarge { what: LimitKind::Body, limit: 8 }.status(400),
            Some(413)
        );
        assert_eq!(RequestError::Timeout.status(413), Some(408));
        assert_eq!(RequestError::ConnectionClosed.status(413), None);
    }

    #[test]
    fn only_pre_response_failures_are_retryable() {
        assert!(UpstreamError::ConnectTimeout.is_retryable());
        assert!(UpstreamError::WriteTimeout.is_retryable());
        assert!(!UpstreamError::ReadTimeout { received: 10 }.is_retryable());
        assert!(!UpstreamError::ClosedEarly.is_retryable());
        assert_eq!(UpstreamError::ClosedEarly.reason(), "upstream_closed_early");
        assert_eq!(UpstreamError::ReadTimeout { received: 1 }.reason(), "upstream_timeout");
        let oversized = UpstreamError::ResponseTooLarge { limit: 16 };
        assert!(!oversized.is_retryable());
        assert_eq!(oversized.reason(), "upstream_too_large");
    }

    #[test]
    fn startup_errors_have_distinct_exit_codes() {
        assert_eq!(StartupError::EmptyBackendList.exit_code(), 2);
        let bind = StartupError::BindFailed {
            address: "127.0.0.1:1".into(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert_eq!(bind.exit_code(), 3);
    }
}

//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server's identity (host, port, name)
//! - Produce the `Host` value and connect address used upstream
//!
//! Health lives next to the identity in the registry, not here, so a
//! `Backend` can be shared freely without synchronisation.

use std::fmt;

use crate::config::BackendConfig;
use crate::error::ValidationError;

/// A single backend server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    /// Logical name reported in `X-Served-By`.
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl Backend {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }

    /// Build the backend at position `index` of the configured list.
    pub fn from_config(index: usize, config: &BackendConfig) -> Result<Self, ValidationError> {
        let (host, port) = config.host_port().ok_or_else(|| {
            ValidationError::new(
                format!("backends[{index}].address"),
                format!("'{}' is not host:port", config.address),
            )
        })?;
        Ok(Self::new(config.resolved_name(index), host, port))
    }

    /// `host:port`, as used for the upstream `Host` header and for connecting.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.authority())
    }
}

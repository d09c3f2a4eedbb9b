//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, in-flight bound).
    pub listener: ListenerConfig,

    /// Ordered backend list. Order is stable for the process lifetime.
    pub backends: Vec<BackendConfig>,

    /// Backend selection and retry bound.
    pub balancing: BalancingConfig,

    /// Passive failover cool-down shape.
    pub health: HealthConfig,

    /// Per-phase deadlines.
    pub timeouts: TimeoutConfig,

    /// Request size limits and accepted methods.
    pub limits: LimitsConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Protocol reported upstream in `X-Forwarded-Proto`.
    pub protocol: String,

    /// Maximum in-flight client connections (backpressure).
    pub max_connections: usize,

    /// Identification used in `Via` and on synthetic responses.
    pub proxy_name: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            protocol: "http".to_string(),
            max_connections: 256,
            proxy_name: "failover-proxy".to_string(),
        }
    }
}

/// Backend server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Logical name reported in `X-Served-By`. Defaults to `backend-A`, `backend-B`, ...
    #[serde(default)]
    pub name: Option<String>,

    /// Backend address as `host:port`.
    pub address: String,
}

impl BackendConfig {
    /// Split `address` into host and port.
    pub fn host_port(&self) -> Option<(&str, u16)> {
        let (host, port) = self.address.rsplit_once(':')?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return None;
        }
        port.parse().ok().map(|port| (host, port))
    }

    /// Name to use for the backend at `index` in the configured list.
    pub fn resolved_name(&self, index: usize) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => default_backend_name(index),
        }
    }
}

/// `backend-A`, `backend-B`, ... then `backend-27`, `backend-28` past the alphabet.
pub fn default_backend_name(index: usize) -> String {
    match u8::try_from(index).ok().filter(|i| *i < 26) {
        Some(i) => format!("backend-{}", char::from(b'A' + i)),
        None => format!("backend-{}", index + 1),
    }
}

impl FromStr for BackendConfig {
    type Err = ConfigError;

    /// Parse the CLI form `host:port[:name]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, ':');
        let host = parts.next().filter(|h| !h.is_empty());
        let port = parts.next().and_then(|p| p.parse::<u16>().ok());
        let name = parts.next().filter(|n| !n.is_empty()).map(str::to_string);

        match (host, port) {
            (Some(host), Some(port)) => Ok(Self {
                name,
                address: format!("{host}:{port}"),
            }),
            _ => Err(ConfigError::BackendSpec(s.to_string())),
        }
    }
}

/// Selector variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    #[default]
    RoundRobin,
    Random,
    ClientHash,
    StickyCookie,
}

/// Backend selection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BalancingConfig {
    /// Selection strategy.
    pub selector: SelectorKind,

    /// Upper bound on backends tried per request.
    pub max_attempts: u32,

    /// Cookie consulted by the `sticky_cookie` selector.
    pub sticky_cookie: String,
}

impl Default for BalancingConfig {
    fn default() -> Self {
        Self {
            selector: SelectorKind::RoundRobin,
            max_attempts: 3,
            sticky_cookie: "lb_sticky".to_string(),
        }
    }
}

/// Seconds to a `Duration`; negative or non-finite values collapse to zero
/// and are rejected by validation.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Passive failover configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Cool-down per consecutive failure, in seconds.
    pub cool_down_base_secs: f64,

    /// Longest cool-down a backend can receive, in seconds.
    pub cool_down_cap_secs: f64,
}

impl HealthConfig {
    pub fn cool_down_base(&self) -> Duration {
        seconds(self.cool_down_base_secs)
    }

    pub fn cool_down_cap(&self) -> Duration {
        seconds(self.cool_down_cap_secs)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            cool_down_base_secs: 2.0,
            cool_down_cap_secs: 30.0,
        }
    }
}

/// Timeout configuration for each phase of a request.
///
/// Values are seconds and may be fractional (`0.25`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed for the client to deliver each request phase.
    pub client_read_secs: f64,

    /// Upstream connection establishment.
    pub connect_secs: f64,

    /// Upstream write, up to the first response byte.
    pub write_secs: f64,

    /// Upstream response read after the first byte.
    pub read_secs: f64,

    /// Whole request, from accept to the last response byte.
    pub overall_secs: f64,

    /// How long shutdown waits for in-flight workers.
    pub shutdown_grace_secs: f64,
}

impl TimeoutConfig {
    pub fn client_read(&self) -> Duration {
        seconds(self.client_read_secs)
    }

    pub fn connect(&self) -> Duration {
        seconds(self.connect_secs)
    }

    pub fn write(&self) -> Duration {
        seconds(self.write_secs)
    }

    pub fn read(&self) -> Duration {
        seconds(self.read_secs)
    }

    pub fn overall(&self) -> Duration {
        seconds(self.overall_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        seconds(self.shutdown_grace_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            client_read_secs: 5.0,
            connect_secs: 2.0,
            write_secs: 5.0,
            read_secs: 10.0,
            overall_secs: 30.0,
            shutdown_grace_secs: 5.0,
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Request line plus headers plus the blank line.
    pub max_header_bytes: usize,

    /// Request target length.
    pub max_target_bytes: usize,

    /// Declared Content-Length.
    pub max_body_bytes: usize,

    /// Upstream response, head and body, buffered before it is relayed.
    pub max_response_bytes: usize,

    /// Accepted methods; everything else gets 405.
    pub allowed_methods: Vec<String>,

    /// Status answered to an oversized header block (400, 413 or 431).
    pub header_overflow_status: u16,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 8 * 1024,
            max_target_bytes: 2 * 1024,
            max_body_bytes: 1024 * 1024,
            max_response_bytes: 16 * 1024 * 1024,
            allowed_methods: vec!["GET".into(), "HEAD".into(), "POST".into()],
            header_overflow_status: 413,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` overrides it.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

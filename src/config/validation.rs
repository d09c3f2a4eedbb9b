//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0, attempts > 0)
//! - Check backend addresses and name uniqueness
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;
use crate::error::ValidationError;

/// Methods the proxy knows how to forward.
const KNOWN_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "DELETE", "PATCH", "OPTIONS",
];

/// Longest accepted duration (one day). Larger values overflow `Instant`
/// arithmetic when added to a request's arrival time.
const MAX_DURATION_SECS: f64 = 86_400.0;

/// Statuses allowed for an oversized header block.
const HEADER_OVERFLOW_STATUSES: &[u16] = &[400, 413, 431];

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_listener(config, &mut errors);
    validate_backends(config, &mut errors);
    validate_balancing(config, &mut errors);
    validate_durations(config, &mut errors);
    validate_limits(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_listener(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    let listener = &config.listener;
    if listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", listener.bind_address),
        ));
    }
    if listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be at least 1"));
    }
    if !matches!(listener.protocol.as_str(), "http" | "https") {
        errors.push(ValidationError::new(
            "listener.protocol",
            format!("'{}' is not http or https", listener.protocol),
        ));
    }
    if listener.proxy_name.trim().is_empty() {
        errors.push(ValidationError::new("listener.proxy_name", "must not be empty"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }
}

fn validate_backends(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    if config.backends.is_empty() {
        errors.push(ValidationError::new("backends", "at least one backend is required"));
        return;
    }

    let mut names = HashSet::new();
    for (index, backend) in config.backends.iter().enumerate() {
        let field = format!("backends[{index}]");
        if backend.host_port().is_none() {
            errors.push(ValidationError::new(
                format!("{field}.address"),
                format!("'{}' is not host:port", backend.address),
            ));
        }
        let name = backend.resolved_name(index);
        if name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{field}.name"), "must not be empty"));
        } else if !names.insert(name.clone()) {
            errors.push(ValidationError::new(
                format!("{field}.name"),
                format!("duplicate backend name '{name}'"),
            ));
        }
    }
}

fn validate_balancing(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    if config.balancing.max_attempts == 0 {
        errors.push(ValidationError::new("balancing.max_attempts", "must be at least 1"));
    }
    if config.balancing.sticky_cookie.trim().is_empty() {
        errors.push(ValidationError::new("balancing.sticky_cookie", "must not be empty"));
    }
}

fn validate_durations(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    let t = &config.timeouts;
    let h = &config.health;
    let durations = [
        ("timeouts.client_read_secs", t.client_read_secs),
        ("timeouts.connect_secs", t.connect_secs),
        ("timeouts.write_secs", t.write_secs),
        ("timeouts.read_secs", t.read_secs),
        ("timeouts.overall_secs", t.overall_secs),
        ("timeouts.shutdown_grace_secs", t.shutdown_grace_secs),
        ("health.cool_down_base_secs", h.cool_down_base_secs),
        ("health.cool_down_cap_secs", h.cool_down_cap_secs),
    ];
    for (field, value) in durations {
        if !value.is_finite() || value <= 0.0 {
            errors.push(ValidationError::new(field, "must be a positive number of seconds"));
        } else if value > MAX_DURATION_SECS {
            errors.push(ValidationError::new(
                field,
                format!("must not exceed {MAX_DURATION_SECS} seconds"),
            ));
        }
    }
    if h.cool_down_cap_secs < h.cool_down_base_secs {
        errors.push(ValidationError::new(
            "health.cool_down_cap_secs",
            "must not be smaller than cool_down_base_secs",
        ));
    }
}

fn validate_limits(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    let limits = &config.limits;
    for (field, value) in [
        ("limits.max_header_bytes", limits.max_header_bytes),
        ("limits.max_target_bytes", limits.max_target_bytes),
        ("limits.max_body_bytes", limits.max_body_bytes),
        ("limits.max_response_bytes", limits.max_response_bytes),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if limits.allowed_methods.is_empty() {
        errors.push(ValidationError::new("limits.allowed_methods", "must not be empty"));
    }
    for method in &limits.allowed_methods {
        if !KNOWN_METHODS.contains(&method.as_str()) {
            errors.push(ValidationError::new(
                "limits.allowed_methods",
                format!("unsupported method '{method}'"),
            ));
        }
    }

    if !HEADER_OVERFLOW_STATUSES.contains(&limits.header_overflow_status) {
        errors.push(ValidationError::new(
            "limits.header_overflow_status",
            format!("{} is not one of 400, 413, 431", limits.header_overflow_status),
        ));
    }
}

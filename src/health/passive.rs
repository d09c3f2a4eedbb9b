//! Passive health accounting.
//!
//! # Responsibilities
//! - Describe the health transitions the registry performs
//! - Report them (logs, `proxy_backend_healthy` gauge) outside the registry lock
//!
//! # Design Decisions
//! - Only transport failures count; HTTP status codes are never inspected
//! - Timeouts are failures
//! - Registry operations return transitions instead of logging under the mutex

use std::time::Duration;

use crate::observability::metrics;

/// A change in a backend's health, produced under the registry lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthTransition {
    /// An upstream failure was observed.
    MarkedUnhealthy {
        backend: String,
        reason: &'static str,
        failures: u32,
        cool_down: Duration,
    },
    /// The cool-down elapsed; the next request to the backend tests it.
    Restored { backend: String },
    /// A request succeeded against a backend that had failures on record.
    Recovered { backend: String },
}

impl HealthTransition {
    /// Emit the log line and gauge update for this transition.
    pub fn report(&self) {
        match self {
            HealthTransition::MarkedUnhealthy {
                backend,
                reason,
                failures,
                cool_down,
            } => {
                tracing::warn!(
                    backend = %backend,
                    reason = %reason,
                    failures = *failures,
                    cool_down_ms = cool_down.as_millis() as u64,
                    "Backend marked unhealthy"
                );
                metrics::record_upstream_failure(backend, *reason);
                metrics::set_backend_healthy(backend, false);
            }
            HealthTransition::Restored { backend } => {
                tracing::info!(backend = %backend, "Backend cool-down expired, restored");
                metrics::set_backend_healthy(backend, true);
            }
            HealthTransition::Recovered { backend } => {
                tracing::info!(backend = %backend, "Backend recovered");
                metrics::set_backend_healthy(backend, true);
            }
        }
    }
}

/// Report a batch of transitions in order.
pub fn report_all(transitions: &[HealthTransition]) {
    for transition in transitions {
        transition.report();
    }
}

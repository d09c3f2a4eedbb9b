//! Backend health record.
//!
//! # States
//! - Healthy: backend receives traffic
//! - Unhealthy: backend skipped by selectors until its cool-down expires
//!
//! # State Transitions
//! ```text
//! Healthy   → Unhealthy: any observed upstream failure (cool-down scheduled)
//! Unhealthy → Healthy:   cool-down deadline passed (optimistic restore),
//!                        or a request to it succeeded
//! ```
//!
//! # Design Decisions
//! - No hysteresis: one failure is enough, the cool-down absorbs flapping
//! - The restored backend keeps its failure count, so failing again after
//!   restore earns a longer cool-down than the first failure did
//! - Records are plain data; the registry mutex guards them

use std::time::Duration;

use tokio::time::Instant;

use crate::resilience::backoff::CoolDownPolicy;

/// Mutable health of one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthRecord {
    pub healthy: bool,
    pub failure_count: u32,
    pub last_failure: Option<Instant>,
    pub cool_down_until: Option<Instant>,
}

impl HealthRecord {
    pub fn new() -> Self {
        Self {
            healthy: true,
            failure_count: 0,
            last_failure: None,
            cool_down_until: None,
        }
    }

    /// Record a failure at `now` and return the scheduled cool-down.
    pub fn mark_failure(&mut self, now: Instant, policy: &CoolDownPolicy) -> Duration {
        self.healthy = false;
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure = Some(now);
        let cool_down = policy.cool_down(self.failure_count);
        self.cool_down_until = Some(now + cool_down);
        cool_down
    }

    /// Reset after a successful exchange. Returns true if the backend had failures.
    pub fn mark_success(&mut self) -> bool {
        let had_failures = self.failure_count > 0 || !self.healthy;
        self.healthy = true;
        self.failure_count = 0;
        self.cool_down_until = None;
        had_failures
    }

    /// Flip back to healthy when the cool-down has passed. Returns true on flip.
    pub fn restore_if_expired(&mut self, now: Instant) -> bool {
        match self.cool_down_until {
            Some(deadline) if !self.healthy && deadline <= now => {
                self.healthy = true;
                self.cool_down_until = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self::new()
    }
}

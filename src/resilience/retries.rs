//! Retry policy.
//!
//! # Responsibilities
//! - Bound the number of backends tried per request
//! - Decide whether a failed attempt may move on to another backend
//! - Name the reason reported when every attempt is used up
//!
//! # Design Decisions
//! - Failover happens only before the first response byte; after that the
//!   response may already be partially observed and is never replayed
//! - No delay between attempts: each retry goes to a different backend
//! - The method is not consulted; an unsent request is safe to resend

use crate::error::UpstreamError;
use crate::load_balancer::BackendRegistry;

/// Reason token when no backend could be used at all.
pub const ALL_UNHEALTHY: &str = "all_unhealthy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Whether another attempt may start after `attempts` have been made.
    pub fn may_attempt(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Whether the dispatcher should fail over after `error`.
    pub fn should_retry(&self, error: &UpstreamError, attempts: u32) -> bool {
        error.is_retryable() && self.may_attempt(attempts)
    }
}

/// `X-Proxy-Error` token for a request that ran out of attempts.
///
/// `last_error` is the failure of the final attempt, if one was made.
pub fn exhaustion_reason(registry: &BackendRegistry, last_error: Option<&UpstreamError>) -> &'static str {
    match last_error {
        Some(_) if registry.all_unhealthy() => ALL_UNHEALTHY,
        Some(error) => error.reason(),
        None => ALL_UNHEALTHY,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::load_balancer::Backend;
    use crate::resilience::backoff::CoolDownPolicy;

    #[test]
    fn attempts_are_bounded() {
        let policy = RetryPolicy::new(3);
        let refused = UpstreamError::ConnectTimeout;
        assert!(policy.should_retry(&refused, 1));
        assert!(policy.should_retry(&refused, 2));
        assert!(!policy.should_retry(&refused, 3));
        assert!(!policy.should_retry(&UpstreamError::ClosedEarly, 1));
        let floor = RetryPolicy::new(0);
        assert!(floor.may_attempt(0));
        assert!(!floor.may_attempt(1));
    }

    #[test]
    fn exhaustion_reason_reflects_registry() {
        let registry = BackendRegistry::new(
            vec![Backend::new("a", "127.0.0.1", 1), Backend::new("b", "127.0.0.1", 2)],
            CoolDownPolicy::new(Duration::from_secs(1), Duration::from_secs(5)),
        );
        let error = UpstreamError::ConnectTimeout;

        registry.mark_failure(0, "connect_failed");
        assert_eq!(exhaustion_reason(&registry, Some(&error)), "connect_failed");

        registry.mark_failure(1, "connect_failed");
        assert_eq!(exhaustion_reason(&registry, Some(&error)), ALL_UNHEALTHY);
        assert_eq!(exhaustion_reason(&registry, None), ALL_UNHEALTHY);
    }
}

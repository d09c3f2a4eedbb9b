//! Cool-down backoff for failed backends.

use std::time::Duration;

use crate::config::HealthConfig;

/// Linear, capped cool-down: each consecutive failure adds `base`, up to `cap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoolDownPolicy {
    base: Duration,
    cap: Duration,
}

impl CoolDownPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    pub fn from_config(config: &HealthConfig) -> Self {
        Self::new(config.cool_down_base(), config.cool_down_cap())
    }

    /// Cool-down for a backend that has now failed `failures` times in a row.
    pub fn cool_down(&self, failures: u32) -> Duration {
        self.base.saturating_mul(failures).min(self.cap)
    }
}

impl Default for CoolDownPolicy {
    fn default() -> Self {
        Self::from_config(&HealthConfig::default())
    }
}

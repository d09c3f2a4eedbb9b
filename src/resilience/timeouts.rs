//! Timeout enforcement.
//!
//! # Responsibilities
//! - Turn the configured per-phase timeouts into absolute deadlines
//! - Clamp every phase deadline to the overall request deadline
//! - Wrap socket operations with `tokio::time::timeout_at`
//!
//! # Design Decisions
//! - Deadlines are absolute `Instant`s so a slow phase eats into later ones
//! - Timeout errors are distinct from other errors

use std::future::Future;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};

use crate::config::TimeoutConfig;

/// Deadlines for one request, anchored at its arrival.
#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    overall: Instant,
    client_read: Duration,
    connect: Duration,
    write: Duration,
    read: Duration,
}

impl Deadlines {
    pub fn new(arrival: Instant, config: &TimeoutConfig) -> Self {
        Self {
            overall: arrival + config.overall(),
            client_read: config.client_read(),
            connect: config.connect(),
            write: config.write(),
            read: config.read(),
        }
    }

    pub fn client_read(&self) -> Instant {
        self.phase(self.client_read)
    }

    pub fn connect(&self) -> Instant {
        self.phase(self.connect)
    }

    pub fn write(&self) -> Instant {
        self.phase(self.write)
    }

    pub fn read(&self) -> Instant {
        self.phase(self.read)
    }

    /// True when the overall deadline has passed.
    pub fn expired(&self) -> bool {
        Instant::now() >= self.overall
    }

    /// True when `deadline` is the overall deadline rather than a phase one.
    pub fn is_overall(&self, deadline: Instant) -> bool {
        deadline >= self.overall
    }

    fn phase(&self, timeout: Duration) -> Instant {
        (Instant::now() + timeout).min(self.overall)
    }
}

/// Await `future` until `deadline`, mapping expiry to `on_timeout`.
pub async fn within<F, T, E>(deadline: Instant, future: F, on_timeout: E) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match timeout_at(deadline, future).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout),
    }
}

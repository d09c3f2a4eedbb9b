//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher asks for a backend
//!     → registry.rs (one lock: restore expired cool-downs, build a PoolView)
//!     → Apply the configured selector:
//!         - round_robin.rs (rotate through backends)
//!         - random.rs (uniform over healthy, untried backends)
//!         - client_hash.rs (client address → fixed backend)
//!         - sticky_cookie.rs (cookie value → fixed backend)
//!     → last resort: oldest failure when nothing is healthy
//!     → Selection returned, lock released before any I/O
//! ```
//!
//! # Design Decisions
//! - Selectors are stateless; the round-robin counter lives in the registry
//!   so it is read and advanced under the same lock as the health records
//! - Unhealthy and already-tried backends are never chosen by a selector

pub mod backend;
pub mod client_hash;
pub mod random;
pub mod registry;
pub mod round_robin;
pub mod sticky_cookie;

use std::fmt::Debug;
use std::sync::Arc;

use crate::config::SelectorKind;
use crate::health::HealthRecord;
use crate::http::context::ForwardingContext;

pub use backend::Backend;
pub use registry::{BackendRegistry, BackendStatus, Selection};

/// Registry state visible to a selector for the duration of one pick.
#[derive(Debug)]
pub struct PoolView<'a> {
    health: &'a [HealthRecord],
    counter: &'a mut usize,
}

impl<'a> PoolView<'a> {
    pub fn new(health: &'a [HealthRecord], counter: &'a mut usize) -> Self {
        Self { health, counter }
    }

    pub fn len(&self) -> usize {
        self.health.len()
    }

    pub fn is_empty(&self) -> bool {
        self.health.is_empty()
    }

    pub fn is_healthy(&self, index: usize) -> bool {
        self.health.get(index).is_some_and(|h| h.healthy)
    }

    /// Healthy and not yet tried for this request.
    pub fn is_candidate(&self, index: usize, ctx: &ForwardingContext) -> bool {
        self.is_healthy(index) && !ctx.is_excluded(index)
    }

    /// Current rotation position; advances the counter by one.
    pub fn advance(&mut self) -> usize {
        let len = self.len().max(1);
        let position = *self.counter % len;
        *self.counter = (position + 1) % len;
        position
    }
}

/// Backend selection strategy.
pub trait Selector: Send + Sync + Debug {
    /// Index of the backend to try next, or `None` when no candidate remains.
    fn select(&self, view: &mut PoolView<'_>, ctx: &ForwardingContext) -> Option<usize>;
}

/// Selector for the configured strategy.
pub fn build_selector(kind: SelectorKind) -> Arc<dyn Selector> {
    match kind {
        SelectorKind::RoundRobin => Arc::new(round_robin::RoundRobin),
        SelectorKind::Random => Arc::new(random::Random),
        SelectorKind::ClientHash => Arc::new(client_hash::ClientHash),
        SelectorKind::StickyCookie => Arc::new(sticky_cookie::StickyCookie),
    }
}

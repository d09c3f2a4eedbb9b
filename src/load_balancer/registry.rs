//! Backend registry.
//!
//! # Responsibilities
//! - Own the fixed, ordered backend list and each backend's health record
//! - Run selectors atomically with the round-robin counter
//! - Apply passive failover: mark failures, schedule cool-downs, restore
//!
//! # Design Decisions
//! - A single `std::sync::Mutex` guards every health record and the counter
//! - Every critical section is a few field reads/writes; no I/O, no `.await`
//! - Transitions are reported after the guard is dropped

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

use crate::config::ProxyConfig;
use crate::error::ValidationError;
use crate::health::{passive, HealthRecord, HealthTransition};
use crate::http::context::ForwardingContext;
use crate::load_balancer::{Backend, PoolView, Selector};
use crate::resilience::backoff::CoolDownPolicy;

/// A backend chosen for one attempt.
#[derive(Debug, Clone)]
pub struct Selection {
    pub index: usize,
    pub backend: Arc<Backend>,
    /// Chosen although unhealthy because nothing healthy was left.
    pub last_resort: bool,
}

/// Point-in-time view of one backend, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStatus {
    pub backend: Arc<Backend>,
    pub health: HealthRecord,
}

#[derive(Debug)]
struct PoolState {
    health: Vec<HealthRecord>,
    counter: usize,
}

/// Shared, ordered set of backends with their health.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
    state: Mutex<PoolState>,
    policy: CoolDownPolicy,
}

impl BackendRegistry {
    /// Build a registry. Callers reject an empty list before getting here.
    pub fn new(backends: Vec<Backend>, policy: CoolDownPolicy) -> Self {
        let health = vec![HealthRecord::new(); backends.len()];
        Self {
            backends: backends.into_iter().map(Arc::new).collect(),
            state: Mutex::new(PoolState { health, counter: 0 }),
            policy,
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self, ValidationError> {
        let backends = config
            .backends
            .iter()
            .enumerate()
            .map(|(index, backend)| Backend::from_config(index, backend))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(backends, CoolDownPolicy::from_config(&config.health)))
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    // A panic while holding the guard cannot leave a record half-written,
    // so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Next backend to try for `ctx`, or `None` when nothing is left.
    pub fn next_for(&self, selector: &dyn Selector, ctx: &ForwardingContext) -> Option<Selection> {
        self.next_for_at(selector, ctx, Instant::now())
    }

    pub(crate) fn next_for_at(
        &self,
        selector: &dyn Selector,
        ctx: &ForwardingContext,
        now: Instant,
    ) -> Option<Selection> {
        let mut transitions = Vec::new();
        let picked = {
            let mut guard = self.lock();
            let state = &mut *guard;

            for (index, record) in state.health.iter_mut().enumerate() {
                if record.restore_if_expired(now) {
                    transitions.push(HealthTransition::Restored {
                        backend: self.backends[index].name.clone(),
                    });
                }
            }

            let mut view = PoolView::new(&state.health, &mut state.counter);
            match selector.select(&mut view, ctx) {
                Some(index) => Some((index, false)),
                None if state.health.iter().all(|h| !h.healthy) => {
                    Self::oldest_failure(&state.health, ctx).map(|index| (index, true))
                }
                None => None,
            }
        };

        passive::report_all(&transitions);
        picked.map(|(index, last_resort)| Selection {
            index,
            backend: Arc::clone(&self.backends[index]),
            last_resort,
        })
    }

    /// Untried backend whose last failure is the oldest.
    fn oldest_failure(health: &[HealthRecord], ctx: &ForwardingContext) -> Option<usize> {
        health
            .iter()
            .enumerate()
            .filter(|(index, _)| !ctx.is_excluded(*index))
            .min_by_key(|(_, record)| record.last_failure)
            .map(|(index, _)| index)
    }

    /// Record an upstream failure and schedule the cool-down.
    pub fn mark_failure(&self, index: usize, reason: &'static str) {
        self.mark_failure_at(index, reason, Instant::now());
    }

    pub(crate) fn mark_failure_at(&self, index: usize, reason: &'static str, now: Instant) {
        let Some(backend) = self.backends.get(index) else {
            return;
        };
        let transition = {
            let mut state = self.lock();
            let record = &mut state.health[index];
            let cool_down = record.mark_failure(now, &self.policy);
            HealthTransition::MarkedUnhealthy {
                backend: backend.name.clone(),
                reason,
                failures: record.failure_count,
                cool_down,
            }
        };
        transition.report();
    }

    /// Record a successful exchange.
    pub fn mark_success(&self, index: usize) {
        let Some(backend) = self.backends.get(index) else {
            return;
        };
        let recovered = self.lock().health[index].mark_success();
        if recovered {
            HealthTransition::Recovered {
                backend: backend.name.clone(),
            }
            .report();
        }
    }

    /// Every backend with a copy of its health record.
    pub fn snapshot(&self) -> Vec<BackendStatus> {
        let state = self.lock();
        self.backends
            .iter()
            .zip(state.health.iter())
            .map(|(backend, health)| BackendStatus {
                backend: Arc::clone(backend),
                health: health.clone(),
            })
            .collect()
    }

    pub fn all_unhealthy(&self) -> bool {
        self.lock().health.iter().all(|h| !h.healthy)
    }
}

//! Round-robin load balancing strategy.

use crate::http::context::ForwardingContext;
use crate::load_balancer::{PoolView, Selector};

/// Round-robin selector.
/// Rotates through backends using the registry's shared counter.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobin;

impl Selector for RoundRobin {
    fn select(&self, view: &mut PoolView<'_>, ctx: &ForwardingContext) -> Option<usize> {
        next_in_rotation(view, ctx)
    }
}

/// First candidate at or after the counter position.
///
/// The counter advances by exactly one per call, whatever is skipped.
/// Also the fallback for the hashing selectors.
pub fn next_in_rotation(view: &mut PoolView<'_>, ctx: &ForwardingContext) -> Option<usize> {
    if view.is_empty() {
        return None;
    }

    let start = view.advance();
    let len = view.len();
    (0..len)
        .map(|i| (start + i) % len)
        .find(|&index| view.is_candidate(index, ctx))
}

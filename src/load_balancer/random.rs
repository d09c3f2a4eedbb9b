//! Uniform random selection.

use rand::seq::SliceRandom;

use crate::http::context::ForwardingContext;
use crate::load_balancer::{PoolView, Selector};

/// Uniform choice over healthy, untried backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct Random;

impl Selector for Random {
    fn select(&self, view: &mut PoolView<'_>, ctx: &ForwardingContext) -> Option<usize> {
        let candidates: Vec<usize> = (0..view.len())
            .filter(|&index| view.is_candidate(index, ctx))
            .collect();
        candidates.choose(&mut rand::thread_rng()).copied()
    }
}

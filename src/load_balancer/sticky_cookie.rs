//! Cookie-based stickiness.
//!
//! The server extracts the configured cookie into
//! [`ForwardingContext::sticky_key`]; its value is hashed onto the backend
//! list the same way [`ClientHash`](super::client_hash::ClientHash) hashes
//! addresses. No cookie, or a down backend, falls back to round-robin.
//! The proxy never issues the cookie itself.

use crate::http::context::ForwardingContext;
use crate::load_balancer::client_hash::hashed_index;
use crate::load_balancer::round_robin::next_in_rotation;
use crate::load_balancer::{PoolView, Selector};

#[derive(Debug, Default, Clone, Copy)]
pub struct StickyCookie;

impl Selector for StickyCookie {
    fn select(&self, view: &mut PoolView<'_>, ctx: &ForwardingContext) -> Option<usize> {
        let hashed = ctx
            .sticky_key
            .as_deref()
            .and_then(|key| hashed_index(key, view.len()));
        match hashed {
            Some(index) if view.is_candidate(index, ctx) => Some(index),
            _ => next_in_rotation(view, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::test_support::{ctx, records};

    #[test]
    fn cookie_pins_backend() {
        let health = records(4, &[]);
        let mut counter = 0;
        let mut ctx = ctx("127.0.0.1:1000");
        ctx.sticky_key = Some("user-42".into());
        let expected = hashed_index("user-42", 4);

        for _ in 0..5 {
            let pick = StickyCookie.select(&mut PoolView::new(&health, &mut counter), &ctx);
            assert_eq!(pick, expected);
        }
    }

    #[test]
    fn missing_cookie_rotates() {
        let health = records(3, &[]);
        let mut counter = 0;
        let ctx = ctx("127.0.0.1:1000");

        let picks: Vec<_> = (0..3)
            .map(|_| StickyCookie.select(&mut PoolView::new(&health, &mut counter), &ctx))
            .collect();
        assert_eq!(picks, [Some(0), Some(1), Some(2)]);
    }
}

//! Client-address hashing (sticky by source IP).

use crate::http::context::ForwardingContext;
use crate::load_balancer::round_robin::next_in_rotation;
use crate::load_balancer::{PoolView, Selector};

const FNV_OFFSET: u64 = 14695981039346656037;
const FNV_PRIME: u64 = 1099511628211;

/// FNV-1a over `bytes`. Stable across processes and platforms.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Registry index `key` hashes to.
pub fn hashed_index(key: &str, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some((fnv1a(key.as_bytes()) % len as u64) as usize)
}

/// Same client IP, same backend, while that backend is healthy.
///
/// Only the address is hashed; the source port changes per connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientHash;

impl Selector for ClientHash {
    fn select(&self, view: &mut PoolView<'_>, ctx: &ForwardingContext) -> Option<usize> {
        let key = ctx.client_addr.ip().to_string();
        match hashed_index(&key, view.len()) {
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
    fn fnv1a_reference_values() {
        assert_eq!(fnv1a(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn same_ip_same_backend_across_ports() {
        let health = records(5, &[]);
        let mut counter = 0;

        let first = ClientHash
            .select(&mut PoolView::new(&health, &mut counter), &ctx("10.1.2.3:40000"))
            .unwrap();
        for port in 40001..40020 {
            let client = format!("10.1.2.3:{port}");
            let pick = ClientHash.select(&mut PoolView::new(&health, &mut counter), &ctx(&client));
            assert_eq!(pick, Some(first));
        }
        assert_eq!(counter, 0);
    }

    #[test]
    fn falls_back_when_hashed_backend_is_down() {
        let ctx = ctx("10.1.2.3:40000");
        let hashed = hashed_index("10.1.2.3", 3).unwrap();
        let health = records(3, &[hashed]);
        let mut counter = 0;

        let pick = ClientHash
            .select(&mut PoolView::new(&health, &mut counter), &ctx)
            .unwrap();
        assert_ne!(pick, hashed);
        assert_eq!(counter, 1);
    }
}

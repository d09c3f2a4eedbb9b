//! Per-request forwarding context.

use std::collections::BTreeSet;
use std::net::SocketAddr;

use tokio::time::Instant;

use crate::observability::tracing::generate_correlation_id;

/// State one worker carries for one request.
///
/// Created when the connection is accepted, read by the rewriter and the
/// dispatcher, dropped once the response has been written.
#[derive(Debug, Clone)]
pub struct ForwardingContext {
    pub client_addr: SocketAddr,
    /// Monotonic arrival time; the overall deadline counts from here.
    pub arrival: Instant,
    /// Short id returned in `X-Request-Id` and logged with every event.
    pub correlation_id: String,
    /// Backends attempted so far.
    pub attempts: u32,
    /// Registry indices already tried for this request.
    pub tried: BTreeSet<usize>,
    /// Value of the sticky cookie, when the request carried one.
    pub sticky_key: Option<String>,
}

impl ForwardingContext {
    pub fn new(client_addr: SocketAddr) -> Self {
        Self::with_id(client_addr, generate_correlation_id())
    }

    pub fn with_id(client_addr: SocketAddr, correlation_id: impl Into<String>) -> Self {
        Self {
            client_addr,
            arrival: Instant::now(),
            correlation_id: correlation_id.into(),
            attempts: 0,
            tried: BTreeSet::new(),
            sticky_key: None,
        }
    }

    /// Record that the backend at `index` is about to be attempted.
    pub fn begin_attempt(&mut self, index: usize) {
        self.tried.insert(index);
        self.attempts += 1;
    }

    pub fn is_excluded(&self, index: usize) -> bool {
        self.tried.contains(&index)
    }
}

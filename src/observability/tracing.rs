//! Request correlation.
//!
//! # Responsibilities
//! - Generate the short correlation id attached to every request
//! - Create the per-request span that carries it through all log events
//!
//! # Design Decisions
//! - Ids are the first 8 hex characters of a UUID v4: short enough to read
//!   in a log, unique enough for a proxy's in-flight set
//! - The id is the same value logged and returned in `X-Request-Id`

use std::net::SocketAddr;

use uuid::Uuid;

/// Length of a correlation id.
pub const CORRELATION_ID_LEN: usize = 8;

/// Fresh correlation id.
pub fn generate_correlation_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(CORRELATION_ID_LEN);
    id
}

/// Span wrapping all work done for one request.
pub fn request_span(request_id: &str, client: SocketAddr) -> tracing::Span {
    tracing::info_span!("request", request_id = %request_id, client = %client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_short_hex_and_distinct() {
        let a = generate_correlation_id();
        let b = generate_correlation_id();
        assert_eq!(a.len(), CORRELATION_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}

//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → limits.rs (method allow-list, header/target/body sizes, path traversal)
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-*, Via, X-Request-Id)
//!     → Pass to the dispatcher
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any limit violation before a backend is contacted
//! - No trust in client input; forwarding headers are appended, never replaced wholesale

pub mod headers;
pub mod limits;

pub use headers::HeaderRewriter;
pub use limits::RequestLimits;

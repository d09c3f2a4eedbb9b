//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → timeouts.rs (per-phase deadlines clamped to the overall deadline)
//!     → On failure: retries.rs (fail over if no response byte was seen)
//!     → backoff.rs (cool-down applied to the failed backend)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every socket operation has a deadline
//! - Retries go to a different backend, never the same one twice
//! - Cool-down grows linearly with consecutive failures, capped

pub mod backoff;
pub mod retries;
pub mod timeouts;

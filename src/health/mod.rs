//! Health tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream failure observed by the dispatcher
//!     → registry marks the backend (state.rs), cool-down scheduled
//!     → passive.rs reports the transition after the lock is released
//!
//! Next selection
//!     → registry restores backends whose cool-down expired
//!     → the next request to a restored backend tests it
//! ```
//!
//! # Design Decisions
//! - Passive only: no synthetic health-check traffic
//! - Health state is per-backend and lives in the registry

pub mod passive;
pub mod state;

pub use passive::HealthTransition;
pub use state::HealthRecord;

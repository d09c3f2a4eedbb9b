//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)           command line (clap)
//!     → loader.rs (parse)          → ConfigOverrides
//!              ↘                 ↙
//!               overrides applied
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no runtime reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigOverrides};
pub use schema::{
    BackendConfig, BalancingConfig, HealthConfig, LimitsConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, ProxyConfig, SelectorKind, TimeoutConfig,
};
pub use validation::validate_config;

//! failover-proxy library
//!
//! HTTP/1.1 reverse proxy with health-aware backend selection and passive
//! failover. The binary in `main.rs` is a thin CLI over [`lifecycle::startup`].

pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::{ProxyHandle, Shutdown};
pub use load_balancer::BackendRegistry;

//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration and build the backend registry
//! - Start the metrics exporter when enabled
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and maps to an exit code
//! - Subsystems initialize in order, not concurrently
//! - The listener binds last (traffic only when ready)

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::{validate_config, ProxyConfig};
use crate::error::{ConfigError, StartupError};
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::load_balancer::BackendRegistry;
use crate::net::Listener;
use crate::observability::metrics;

/// A running proxy.
#[derive(Debug)]
pub struct ProxyHandle {
    local_addr: SocketAddr,
    registry: Arc<BackendRegistry>,
    shutdown: Shutdown,
    task: JoinHandle<io::Result<()>>,
}

impl ProxyHandle {
    /// Address the listener is bound to (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Stop accepting and wait for the drain to finish.
    pub async fn shutdown(self) -> io::Result<()> {
        self.shutdown.trigger();
        self.stopped().await
    }

    /// Wait for the server to stop on its own (after a trigger elsewhere).
    pub async fn stopped(self) -> io::Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(io::Error::other(e)),
        }
    }
}

/// Check a configuration and build its registry.
pub fn prepare(config: &ProxyConfig) -> Result<Arc<BackendRegistry>, StartupError> {
    if config.backends.is_empty() {
        return Err(StartupError::EmptyBackendList);
    }
    validate_config(config).map_err(ConfigError::Validation)?;
    let registry = BackendRegistry::from_config(config)
        .map_err(|e| ConfigError::Validation(vec![e]))?;
    Ok(Arc::new(registry))
}

/// Start serving `config` in the background.
pub async fn start(config: ProxyConfig) -> Result<ProxyHandle, StartupError> {
    let registry = prepare(&config)?;

    for backend in registry.backends() {
        tracing::info!(backend = %backend.name, address = %backend.authority(), "Backend registered");
        metrics::set_backend_healthy(&backend.name, true);
    }
    tracing::info!(
        selector = ?config.balancing.selector,
        max_attempts = config.balancing.max_attempts,
        backends = registry.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|e: std::net::AddrParseError| StartupError::Metrics(e.to_string()))?;
        metrics::init_metrics(addr)?;
    }

    let listener = Listener::bind(&config.listener).await?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| StartupError::BindFailed {
            address: config.listener.bind_address.clone(),
            source,
        })?;

    let server = HttpServer::new(&config, Arc::clone(&registry));
    let shutdown = Shutdown::new();
    let task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    Ok(ProxyHandle {
        local_addr,
        registry,
        shutdown,
        task,
    })
}

/// Run until SIGINT/SIGTERM, then shut down gracefully.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    let handle = start(config).await?;
    tracing::info!(address = %handle.local_addr(), "Proxy ready");

    signals::spawn_signal_handler(handle.shutdown_handle());
    if let Err(e) = handle.stopped().await {
        tracing::error!(error = %e, "Server stopped with an error");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

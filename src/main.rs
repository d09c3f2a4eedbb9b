//! failover-proxy
//!
//! HTTP/1.1 reverse proxy that spreads requests over a fixed set of
//! backends and fails over when one stops answering.
//!
//! ```text
//!     Client ──▶ net::Listener ──▶ http::server ──▶ http::dispatcher ──▶ Backend
//!                  (permits)      (parse, limits)   (select, rewrite,
//!                                                     forward, retry)
//!                                                         │
//!                                       load_balancer::registry + health
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use failover_proxy::config::{BackendConfig, ConfigOverrides, LogFormat, SelectorKind};
use failover_proxy::error::StartupError;
use failover_proxy::lifecycle::startup;
use failover_proxy::observability::logging::init_logging;

#[derive(Debug, Parser)]
#[command(name = "failover-proxy", version, about = "HTTP reverse proxy with passive failover")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "FAILOVER_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:8080.
    #[arg(short, long)]
    listen: Option<String>,

    /// Backend as host:port[:name]. Repeat for several; replaces the file list.
    #[arg(short, long = "backend", value_name = "HOST:PORT[:NAME]")]
    backends: Vec<BackendConfig>,

    /// Backend selection strategy.
    #[arg(long, value_enum)]
    selector: Option<SelectorKind>,

    /// Attempts per request, the first one included.
    #[arg(long)]
    max_attempts: Option<u32>,

    #[arg(long)]
    log_level: Option<String>,

    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl From<Cli> for ConfigOverrides {
    fn from(cli: Cli) -> Self {
        Self {
            config_path: cli.config,
            listen: cli.listen,
            backends: cli.backends,
            selector: cli.selector,
            max_attempts: cli.max_attempts,
            log_level: cli.log_level,
            log_format: cli.log_format,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ConfigOverrides::from(cli).resolve() {
        Ok(config) => config,
        Err(e) => {
            // Logging is configured from this file, so nothing is installed yet.
            eprintln!("failover-proxy: {e}");
            return ExitCode::from(StartupError::from(e).exit_code());
        }
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "failover-proxy starting");

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build the async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(startup::run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            ExitCode::from(e.exit_code())
        }
    }
}

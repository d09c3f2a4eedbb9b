//! Accept loop and per-connection worker.
//!
//! # Responsibilities
//! - Accept connections under the in-flight bound and spawn one worker each
//! - Drive Reader → Dispatcher → write-to-client → close for a single request
//! - Answer client faults with 4xx, upstream faults with 502
//! - Stop accepting on shutdown and drain in-flight workers, bounded
//!
//! # Design Decisions
//! - One request per connection; every response carries `Connection: close`
//! - A worker never propagates an error: everything becomes a response or a log line
//! - Error responses are followed by a lingering close so the client sees them

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{timeout, Instant};
use tracing::Instrument;

use crate::config::{ProxyConfig, TimeoutConfig};
use crate::error::RequestError;
use crate::http::context::ForwardingContext;
use crate::http::dispatcher::Dispatcher;
use crate::http::request::read_request;
use crate::http::response::client_error;
use crate::load_balancer::BackendRegistry;
use crate::net::{ConnectionTracker, Listener};
use crate::observability::metrics;
use crate::observability::tracing::request_span;
use crate::resilience::timeouts::Deadlines;
use crate::security::limits::RequestLimits;

/// How long unread client input is drained after an error response.
const LINGER: Duration = Duration::from_millis(500);
const LINGER_MAX_BYTES: usize = 256 * 1024;

/// Pause after a failed `accept` (e.g. out of descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Everything a worker needs, shared by all workers.
#[derive(Debug)]
struct ServerState {
    dispatcher: Dispatcher,
    limits: RequestLimits,
    timeouts: TimeoutConfig,
    proxy_name: String,
    sticky_cookie: String,
}

/// HTTP server for the proxy.
#[derive(Debug)]
pub struct HttpServer {
    state: Arc<ServerState>,
    tracker: ConnectionTracker,
    shutdown_grace: Duration,
}

impl HttpServer {
    pub fn new(config: &ProxyConfig, registry: Arc<BackendRegistry>) -> Self {
        let state = ServerState {
            dispatcher: Dispatcher::from_config(config, registry),
            limits: RequestLimits::from_config(&config.limits),
            timeouts: config.timeouts.clone(),
            proxy_name: config.listener.proxy_name.clone(),
            sticky_cookie: config.balancing.sticky_cookie.clone(),
        };
        Self {
            state: Arc::new(state),
            tracker: ConnectionTracker::new(),
            shutdown_grace: config.timeouts.shutdown_grace(),
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        self.state.dispatcher.registry()
    }

    /// Serve until `shutdown` fires, then drain in-flight workers.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, client, permit)) => {
                        let guard = self.tracker.track();
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            handle_connection(stream, client, &state).await;
                            drop(guard);
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                _ = shutdown.recv() => break,
            }
        }

        drop(listener);
        let in_flight = self.tracker.active_count();
        tracing::info!(in_flight, "Listener closed, draining connections");

        if self.tracker.wait_idle(self.shutdown_grace).await {
            tracing::info!("HTTP server stopped");
        } else {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                grace_ms = self.shutdown_grace.as_millis() as u64,
                "Grace period elapsed with connections still in flight"
            );
        }
        Ok(())
    }
}

/// Serve one request on `stream` and close it.
async fn handle_connection(mut stream: TcpStream, client: SocketAddr, state: &ServerState) {
    let mut ctx = ForwardingContext::new(client);
    let span = request_span(&ctx.correlation_id, client);

    async move {
        let deadlines = Deadlines::new(ctx.arrival, &state.timeouts);

        let request = match read_request(&mut stream, &state.limits, &deadlines).await {
            Ok(request) => request,
            Err(err) => {
                reject(&mut stream, &ctx, state, &err).await;
                return;
            }
        };

        ctx.sticky_key = request.headers.cookie(&state.sticky_cookie).map(str::to_string);
        let dispatched = state.dispatcher.dispatch(&request, &mut ctx, &deadlines).await;

        let written = write_response(&mut stream, &dispatched.bytes, &state.timeouts).await;
        let elapsed = ctx.arrival.elapsed();
        metrics::record_request(dispatched.status, elapsed);

        tracing::info!(
            request_id = %ctx.correlation_id,
            method = %request.method,
            target = %request.target,
            status = dispatched.status,
            backend = dispatched.served_by.as_ref().map_or("-", |b| b.name.as_str()),
            attempts = ctx.attempts,
            error = dispatched.error.unwrap_or("-"),
            elapsed_ms = elapsed.as_millis() as u64,
            "Request completed"
        );
        if let Err(e) = written {
            tracing::debug!(error = %e, "Client write failed");
        }

        if dispatched.error.is_some() {
            linger_close(&mut stream).await;
        } else {
            let _ = stream.shutdown().await;
        }
    }
    .instrument(span)
    .await;
}

/// Answer a request that failed before dispatch.
async fn reject(stream: &mut TcpStream, ctx: &ForwardingContext, state: &ServerState, err: &RequestError) {
    let Some(status) = err.status(state.limits.header_overflow_status) else {
        tracing::debug!(request_id = %ctx.correlation_id, error = %err, "Client went away");
        return;
    };

    let mut response = client_error(status, &err.to_string());
    if matches!(err, RequestError::MethodNotAllowed(_)) {
        response = response.header("Allow", state.limits.allow_header());
    }
    let bytes = response.to_bytes(&state.proxy_name, &ctx.correlation_id);
    let written = write_response(stream, &bytes, &state.timeouts).await;

    let elapsed = ctx.arrival.elapsed();
    metrics::record_request(status, elapsed);
    tracing::info!(
        request_id = %ctx.correlation_id,
        status,
        error = %err,
        elapsed_ms = elapsed.as_millis() as u64,
        "Request rejected"
    );
    if written.is_ok() {
        linger_close(stream).await;
    }
}

async fn write_response(
    stream: &mut TcpStream,
    bytes: &[u8],
    timeouts: &TimeoutConfig,
) -> std::io::Result<()> {
    let deadline = Instant::now() + timeouts.write();
    match tokio::time::timeout_at(deadline, async {
        stream.write_all(bytes).await?;
        stream.flush().await
    })
    .await
    {
        Ok(result) => result,
        Err(_) => Err(std::io::ErrorKind::TimedOut.into()),
    }
}

/// Half-close, then discard whatever the client is still sending, briefly.
///
/// Closing with unread input makes the kernel send RST, which can destroy
/// the response before the client reads it.
async fn linger_close(stream: &mut TcpStream) {
    if stream.shutdown().await.is_err() {
        return;
    }
    let mut sink = [0u8; 4096];
    let mut drained = 0;
    let _ = timeout(LINGER, async {
        while drained < LINGER_MAX_BYTES {
            match stream.read(&mut sink).await {
                Ok(0) | Err(_) => break,
                Ok(n) => drained += n,
            }
        }
    })
    .await;
}

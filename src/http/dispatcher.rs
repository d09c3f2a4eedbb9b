//! Upstream dispatch with passive failover.
//!
//! # Data Flow
//! ```text
//! ParsedRequest + ForwardingContext
//!     → registry.next_for(selector)          (one lock, no I/O)
//!     → connect          [connect deadline]
//!     → write request    [write deadline]
//!     → first byte       [write deadline]    ← failures so far: retry elsewhere
//!     → rest of response [read deadline]     ← failures now: 502, no retry
//!     → inject X-Served-By / X-Request-Id
//! ```
//!
//! # Design Decisions
//! - Every failure marks the backend and schedules its cool-down
//! - Success clears the backend's failure state
//! - The response is complete at Content-Length, or when the backend closes
//! - The response is buffered whole before it is relayed, so its size is
//!   capped by `limits.max_response_bytes`

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::config::ProxyConfig;
use crate::error::UpstreamError;
use crate::http::context::ForwardingContext;
use crate::http::request::{find_head_end, ParsedRequest};
use crate::http::response::{bad_gateway, inject_headers, ResponseHead};
use crate::load_balancer::{build_selector, Backend, BackendRegistry, Selector};
use crate::resilience::retries::{exhaustion_reason, RetryPolicy};
use crate::resilience::timeouts::{within, Deadlines};
use crate::security::headers::HeaderRewriter;

const READ_CHUNK: usize = 8192;

/// Result of dispatching one request.
#[derive(Debug)]
pub struct Dispatched {
    /// Status sent to the client; 0 when the backend's reply had no status line.
    pub status: u16,
    /// Bytes to write to the client.
    pub bytes: Vec<u8>,
    pub served_by: Option<Arc<Backend>>,
    /// `X-Proxy-Error` token when the proxy answered itself.
    pub error: Option<&'static str>,
}

/// Forwards requests to backends, failing over between them.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<BackendRegistry>,
    selector: Arc<dyn Selector>,
    rewriter: HeaderRewriter,
    retry: RetryPolicy,
    proxy_name: String,
    max_response_bytes: usize,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<BackendRegistry>,
        selector: Arc<dyn Selector>,
        rewriter: HeaderRewriter,
        retry: RetryPolicy,
        proxy_name: impl Into<String>,
        max_response_bytes: usize,
    ) -> Self {
        Self {
            registry,
            selector,
            rewriter,
            retry,
            proxy_name: proxy_name.into(),
            max_response_bytes,
        }
    }

    pub fn from_config(config: &ProxyConfig, registry: Arc<BackendRegistry>) -> Self {
        Self::new(
            registry,
            build_selector(config.balancing.selector),
            HeaderRewriter::from_config(&config.listener),
            RetryPolicy::new(config.balancing.max_attempts),
            &config.listener.proxy_name,
            config.limits.max_response_bytes,
        )
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Forward `request`, trying up to `max_attempts` distinct backends.
    pub async fn dispatch(
        &self,
        request: &ParsedRequest,
        ctx: &mut ForwardingContext,
        deadlines: &Deadlines,
    ) -> Dispatched {
        let mut last_error: Option<UpstreamError> = None;

        while self.retry.may_attempt(ctx.attempts) {
            if deadlines.expired() {
                return self.fail(ctx, "upstream_timeout");
            }
            let Some(selection) = self.registry.next_for(self.selector.as_ref(), ctx) else {
                break;
            };
            ctx.begin_attempt(selection.index);
            let backend = selection.backend;

            tracing::debug!(
                backend = %backend.name,
                attempt = ctx.attempts,
                last_resort = selection.last_resort,
                "Forwarding to backend"
            );

            match self.attempt(&backend, request, ctx, deadlines).await {
                Ok(response) => {
                    self.registry.mark_success(selection.index);
                    let status = ResponseHead::parse(&response).map_or(0, |head| head.status);
                    return Dispatched {
                        status,
                        bytes: inject_headers(&response, &backend.name, &ctx.correlation_id),
                        served_by: Some(backend),
                        error: None,
                    };
                }
                Err(err) => {
                    tracing::warn!(
                        backend = %backend.name,
                        attempt = ctx.attempts,
                        error = %err,
                        retryable = err.is_retryable(),
                        "Upstream attempt failed"
                    );
                    self.registry.mark_failure(selection.index, err.reason());
                    if self.retry.should_retry(&err, ctx.attempts) {
                        last_error = Some(err);
                        continue;
                    }
                    let reason = if err.is_retryable() {
                        exhaustion_reason(&self.registry, Some(&err))
                    } else {
                        err.reason()
                    };
                    return self.fail(ctx, reason);
                }
            }
        }

        let reason = exhaustion_reason(&self.registry, last_error.as_ref());
        self.fail(ctx, reason)
    }

    fn fail(&self, ctx: &ForwardingContext, reason: &'static str) -> Dispatched {
        let response = bad_gateway(reason);
        Dispatched {
            status: response.status(),
            bytes: response.to_bytes(&self.proxy_name, &ctx.correlation_id),
            served_by: None,
            error: Some(reason),
        }
    }

    /// One exchange with one backend. Returns the raw response bytes.
    async fn attempt(
        &self,
        backend: &Backend,
        request: &ParsedRequest,
        ctx: &ForwardingContext,
        deadlines: &Deadlines,
    ) -> Result<Vec<u8>, UpstreamError> {
        let connect_deadline = deadlines.connect();
        let mut stream = within(
            connect_deadline,
            async {
                TcpStream::connect((backend.host.as_str(), backend.port))
                    .await
                    .map_err(UpstreamError::ConnectFailed)
            },
            timeout_error(deadlines, connect_deadline, UpstreamError::ConnectTimeout),
        )
        .await?;
        // Small requests go out in one segment.
        let _ = stream.set_nodelay(true);

        let outgoing = self.rewriter.rewrite(request, ctx, backend);

        // The backend has until the write deadline to take the request and
        // start answering; until then nothing has reached the client.
        let write_deadline = deadlines.write();
        within(
            write_deadline,
            async {
                stream.write_all(&outgoing).await.map_err(UpstreamError::WriteFailed)?;
                stream.flush().await.map_err(UpstreamError::WriteFailed)
            },
            timeout_error(deadlines, write_deadline, UpstreamError::WriteTimeout),
        )
        .await?;

        let mut chunk = [0u8; READ_CHUNK];
        let first = within(
            write_deadline,
            async { stream.read(&mut chunk).await.map_err(UpstreamError::WriteFailed) },
            timeout_error(deadlines, write_deadline, UpstreamError::WriteTimeout),
        )
        .await?;
        if first == 0 {
            return Err(UpstreamError::NoResponse);
        }
        let mut response = chunk[..first].to_vec();

        let read_deadline = deadlines.read();
        loop {
            let limit = self.max_response_bytes;
            if let Some(expected) = expected_len(&response, &request.method) {
                if expected > limit {
                    return Err(UpstreamError::ResponseTooLarge { limit });
                }
                if response.len() >= expected {
                    response.truncate(expected);
                    return Ok(response);
                }
            }
            if response.len() > limit {
                return Err(UpstreamError::ResponseTooLarge { limit });
            }

            let received = response.len();
            let read = within(
                read_deadline,
                async {
                    stream
                        .read(&mut chunk)
                        .await
                        .map_err(|source| UpstreamError::ReadFailed { received, source })
                },
                timeout_error(deadlines, read_deadline, UpstreamError::ReadTimeout { received }),
            )
            .await?;

            if read == 0 {
                return if complete_at_eof(&response, &request.method) {
                    Ok(response)
                } else {
                    Err(UpstreamError::ClosedEarly)
                };
            }
            response.extend_from_slice(&chunk[..read]);
        }
    }
}

/// Phase timeout, or the overall timeout when that is what clamped the phase.
fn timeout_error(deadlines: &Deadlines, deadline: Instant, phase: UpstreamError) -> UpstreamError {
    // Out of time entirely; another backend would not get any either.
    if deadlines.is_overall(deadline) {
        UpstreamError::OverallTimeout
    } else {
        phase
    }
}

fn expected_len(response: &[u8], method: &str) -> Option<usize> {
    ResponseHead::parse(response).and_then(|head| head.expected_len(method))
}

/// Whether a response the backend has finished sending is whole.
fn complete_at_eof(response: &[u8], method: &str) -> bool {
    if !response.starts_with(b"HTTP/") {
        // Not HTTP: forwarded untouched.
        return true;
    }
    if find_head_end(response).is_none() {
        return false;
    }
    match ResponseHead::parse(response) {
        Some(head) => head
            .expected_len(method)
            .map_or(true, |expected| response.len() >= expected),
        None => true,
    }
}

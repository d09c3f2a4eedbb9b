//! Upstream header rewriting.
//!
//! # Responsibilities
//! - Append the client address to X-Forwarded-For
//! - Add X-Forwarded-Host, X-Forwarded-Proto, Via and X-Request-Id
//! - Point Host at the chosen backend
//! - Strip hop-by-hop headers and force `Connection: close`
//!
//! # Design Decisions
//! - Pure: the same request, context and backend give identical bytes
//! - Existing headers are replaced in place so order is kept; new ones go last
//! - X-Forwarded-Host always carries the Host this proxy received; a client-sent one is replaced
//! - Content-Length always describes the body actually forwarded

use crate::config::ListenerConfig;
use crate::http::context::ForwardingContext;
use crate::http::headers::{latin1_encode, HeaderList};
use crate::http::request::ParsedRequest;
use crate::load_balancer::Backend;

pub const X_FORWARDED_FOR: &str = "X-Forwarded-For";
pub const X_FORWARDED_HOST: &str = "X-Forwarded-Host";
pub const X_FORWARDED_PROTO: &str = "X-Forwarded-Proto";
pub const X_REQUEST_ID: &str = "X-Request-Id";

/// Headers meaningful only for a single transport hop.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "upgrade",
    "transfer-encoding",
    "te",
    "trailer",
];

/// Builds the byte sequence sent to a backend.
#[derive(Debug, Clone)]
pub struct HeaderRewriter {
    protocol: String,
    proxy_name: String,
}

impl HeaderRewriter {
    pub fn new(protocol: impl Into<String>, proxy_name: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            proxy_name: proxy_name.into(),
        }
    }

    pub fn from_config(listener: &ListenerConfig) -> Self {
        Self::new(&listener.protocol, &listener.proxy_name)
    }

    /// Header list to send to `backend`.
    pub fn rewrite_headers(
        &self,
        request: &ParsedRequest,
        ctx: &ForwardingContext,
        backend: &Backend,
    ) -> HeaderList {
        let mut headers = request.headers.clone();

        strip_hop_by_hop(&mut headers);

        let client_ip = ctx.client_addr.ip().to_string();
        let chain: Vec<&str> = request.headers.get_all("x-forwarded-for").collect();
        let forwarded_for = if chain.is_empty() {
            client_ip
        } else {
            format!("{}, {client_ip}", chain.join(", "))
        };
        headers.set(X_FORWARDED_FOR, forwarded_for);

        if let Some(host) = request.headers.get("host") {
            headers.set(X_FORWARDED_HOST, host);
        }
        headers.set(X_FORWARDED_PROTO, self.protocol.as_str());
        headers.set("Via", format!("1.{} {}", request.version, self.proxy_name));
        headers.set(X_REQUEST_ID, ctx.correlation_id.as_str());
        headers.set("Host", backend.authority());

        match &request.body {
            Some(body) => headers.set("Content-Length", body.len().to_string()),
            None => {
                headers.remove("content-length");
            }
        }
        headers.set("Connection", "close");

        headers
    }

    /// Complete upstream request: request line, rewritten headers, blank line, body.
    pub fn rewrite(
        &self,
        request: &ParsedRequest,
        ctx: &ForwardingContext,
        backend: &Backend,
    ) -> Vec<u8> {
        let headers = self.rewrite_headers(request, ctx, backend);

        let mut out = Vec::with_capacity(512 + request.body_len());
        latin1_encode(&request.request_line(), &mut out);
        out.extend_from_slice(b"\r\n");
        headers.write_to(&mut out);
        out.extend_from_slice(b"\r\n");
        if let Some(body) = &request.body {
            out.extend_from_slice(body);
        }
        out
    }
}

/// Remove the fixed hop-by-hop set and any header named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderList) {
    for token in headers.tokens("connection") {
        headers.remove(&token);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;
    use crate::config::TimeoutConfig;
    use crate::http::request::read_request;
    use crate::resilience::timeouts::Deadlines;
    use crate::security::limits::RequestLimits;

    fn rewriter() -> HeaderRewriter {
        HeaderRewriter::new("http", "failover-proxy")
    }

    fn ctx() -> ForwardingContext {
        ForwardingContext::with_id("192.0.2.7:51000".parse().unwrap(), "abcd1234")
    }

    fn backend() -> Backend {
        Backend::new("A", "127.0.0.1", 9001)
    }

    async fn parse(raw: &[u8]) -> ParsedRequest {
        let mut reader = raw;
        let deadlines = Deadlines::new(Instant::now(), &TimeoutConfig::default());
        read_request(&mut reader, &RequestLimits::default(), &deadlines)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn rewrites_forwarding_headers() {
        let request = parse(
            b"GET /x HTTP/1.1\r\nHost: shop.example\r\nConnection: keep-alive, X-Secret\r\n\
              X-Secret: s\r\nKeep-Alive: 5\r\nAccept: */*\r\n\r\n",
        )
        .await;
        let bytes = rewriter().rewrite(&request, &ctx(), &backend());
        let text = String::from_utf8(bytes).unwrap();

        assert_eq!(
            text,
            "GET /x HTTP/1.1\r\n\
             Host: 127.0.0.1:9001\r\n\
             Accept: */*\r\n\
             X-Forwarded-For: 192.0.2.7\r\n\
             X-Forwarded-Host: shop.example\r\n\
             X-Forwarded-Proto: http\r\n\
             Via: 1.1 failover-proxy\r\n\
             X-Request-Id: abcd1234\r\n\
             Connection: close\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn extends_existing_chain_and_replaces_forwarded_host() {
        let request = parse(
            b"GET / HTTP/1.0\r\nHost: real.example\r\nX-Forwarded-For: 10.0.0.1\r\n\
              X-Forwarded-Host: spoofed\r\n\r\n",
        )
        .await;
        let headers = rewriter().rewrite_headers(&request, &ctx(), &backend());
        assert_eq!(headers.get("x-forwarded-for"), Some("10.0.0.1, 192.0.2.7"));
        assert_eq!(headers.get_all("x-forwarded-host").collect::<Vec<_>>(), ["real.example"]);
        assert_eq!(headers.get("via"), Some("1.0 failover-proxy"));
    }

    #[tokio::test]
    async fn forwarded_host_without_host_is_passed_through() {
        let request = parse(b"GET / HTTP/1.0\r\nX-Forwarded-Host: upstream.example\r\n\r\n").await;
        let headers = rewriter().rewrite_headers(&request, &ctx(), &backend());
        assert_eq!(headers.get("x-forwarded-host"), Some("upstream.example"));
    }

    #[tokio::test]
    async fn non_ascii_target_is_forwarded_byte_for_byte() {
        let request = parse(b"GET /caf\xc3\xa9?q=\xe2\x82\xac HTTP/1.1\r\nHost: h\r\n\r\n").await;
        let bytes = rewriter().rewrite(&request, &ctx(), &backend());
        assert!(bytes.starts_with(b"GET /caf\xc3\xa9?q=\xe2\x82\xac HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn body_follows_head_with_derived_length() {
        let request = parse(
            b"POST /submit HTTP/1.1\r\nHost: h\r\nContent-Length: 4\r\n\r\nping",
        )
        .await;
        let bytes = rewriter().rewrite(&request, &ctx(), &backend());
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.ends_with("\r\n\r\nping"));
    }

    #[tokio::test]
    async fn rewriting_twice_only_grows_the_chain() {
        let original = parse(b"GET / HTTP/1.1\r\nHost: h\r\nUser-Agent: t\r\n\r\n").await;
        let once = String::from_utf8(rewriter().rewrite(&original, &ctx(), &backend())).unwrap();
        // Same request as received by a second proxy that kept the client's Host.
        let forwarded = once.replace("Host: 127.0.0.1:9001", "Host: h");
        let twice = rewriter().rewrite(&parse(forwarded.as_bytes()).await, &ctx(), &backend());

        let expected =
            once.replace("X-Forwarded-For: 192.0.2.7", "X-Forwarded-For: 192.0.2.7, 192.0.2.7");
        assert_eq!(String::from_utf8(twice).unwrap(), expected);
    }

    #[tokio::test]
    async fn rewriting_is_deterministic() {
        let request = parse(b"GET / HTTP/1.1\r\nHost: h\r\n\r\n").await;
        let a = rewriter().rewrite(&request, &ctx(), &backend());
        let b = rewriter().rewrite(&request, &ctx(), &backend());
        assert_eq!(a, b);
    }
}

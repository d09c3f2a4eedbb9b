//! Response handling and transformation.
//!
//! # Responsibilities
//! - Inject `X-Served-By` / `X-Request-Id` into upstream responses
//! - Force `Connection: close` on everything sent to a client
//! - Describe an upstream response head (status, framing) for the dispatcher
//! - Build the proxy's own responses (4xx for client faults, 502 for upstream)
//!
//! # Design Decisions
//! - Injection only touches the head; the body is forwarded byte for byte
//! - Anything that does not start with a status line is passed through as is
//! - Injection is idempotent: a header already present is left alone

use crate::http::headers::latin1_decode;
use crate::http::request::find_head_end;
use crate::security::headers::X_REQUEST_ID;

pub const X_SERVED_BY: &str = "X-Served-By";
pub const X_PROXY_ERROR: &str = "X-Proxy-Error";

/// Add the diagnostic headers to a raw upstream response.
pub fn inject_headers(response: &[u8], served_by: &str, request_id: &str) -> Vec<u8> {
    let Some(end) = find_head_end(response) else {
        return response.to_vec();
    };
    if !response.starts_with(b"HTTP/") {
        return response.to_vec();
    }

    // Head lines excluding the final blank line; the status line comes first.
    let head = &response[..end];
    let mut lines = head.split(|&b| b == b'\n').map(|l| l.strip_suffix(b"\r").unwrap_or(l));

    let mut out = Vec::with_capacity(response.len() + 96);
    if let Some(status_line) = lines.next() {
        out.extend_from_slice(status_line);
        out.extend_from_slice(b"\r\n");
    }

    let mut has_served_by = false;
    let mut has_request_id = false;
    let mut has_close = false;
    for line in lines {
        match header_name(line) {
            Some(name) if name.eq_ignore_ascii_case(b"connection") => {
                if !is_close(line) || has_close {
                    continue;
                }
                has_close = true;
            }
            Some(name) if name.eq_ignore_ascii_case(X_SERVED_BY.as_bytes()) => has_served_by = true,
            Some(name) if name.eq_ignore_ascii_case(X_REQUEST_ID.as_bytes()) => has_request_id = true,
            _ => {}
        }
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }

    if !has_served_by {
        push_header(&mut out, X_SERVED_BY, served_by);
    }
    if !has_request_id {
        push_header(&mut out, X_REQUEST_ID, request_id);
    }
    if !has_close {
        push_header(&mut out, "Connection", "close");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&response[end + 4..]);
    out
}

fn header_name(line: &[u8]) -> Option<&[u8]> {
    line.iter().position(|&b| b == b':').map(|colon| line[..colon].trim_ascii())
}

fn is_close(line: &[u8]) -> bool {
    line.iter()
        .position(|&b| b == b':')
        .is_some_and(|colon| line[colon + 1..].trim_ascii().eq_ignore_ascii_case(b"close"))
}

fn push_header(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b"\r\n");
}

/// What the dispatcher needs to know about an upstream response head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    /// Length of the head including the blank line.
    pub head_len: usize,
    pub content_length: Option<usize>,
    pub chunked: bool,
}

impl ResponseHead {
    /// Parse the head at the start of `buf`. `None` while incomplete or unparseable.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let mut slots = [httparse::EMPTY_HEADER; 100];
        let mut response = httparse::Response::new(&mut slots);
        let head_len = match response.parse(buf) {
            Ok(httparse::Status::Complete(len)) => len,
            _ => return None,
        };

        let mut content_length = None;
        let mut chunked = false;
        for header in response.headers.iter() {
            if header.name.eq_ignore_ascii_case("content-length") {
                content_length = latin1_decode(header.value).trim().parse().ok();
            } else if header.name.eq_ignore_ascii_case("transfer-encoding") {
                chunked = latin1_decode(header.value).to_ascii_lowercase().contains("chunked");
            }
        }

        Some(Self {
            status: response.code?,
            head_len,
            content_length,
            chunked,
        })
    }

    /// Whether a body follows this head at all.
    pub fn has_body(&self, request_method: &str) -> bool {
        !(request_method == "HEAD"
            || (100..200).contains(&self.status)
            || self.status == 204
            || self.status == 304)
    }

    /// Total response length when framing makes it knowable up front.
    pub fn expected_len(&self, request_method: &str) -> Option<usize> {
        if !self.has_body(request_method) {
            return Some(self.head_len);
        }
        if self.chunked {
            return None;
        }
        self.content_length.map(|len| self.head_len + len)
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        431 => "Request Header Fields Too Large",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

/// A response produced by the proxy itself.
#[derive(Debug, Clone)]
pub struct SyntheticResponse {
    status: u16,
    body: String,
    headers: Vec<(&'static str, String)>,
}

impl SyntheticResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Serialize with the proxy's identification and the correlation id.
    pub fn to_bytes(&self, proxy_name: &str, request_id: &str) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status,
            reason_phrase(self.status)
        )
        .into_bytes();
        push_header(&mut out, "Content-Type", "text/plain; charset=utf-8");
        push_header(&mut out, "Content-Length", &self.body.len().to_string());
        push_header(&mut out, "Connection", "close");
        push_header(&mut out, X_SERVED_BY, proxy_name);
        push_header(&mut out, X_REQUEST_ID, request_id);
        for (name, value) in &self.headers {
            push_header(&mut out, name, value);
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(self.body.as_bytes());
        out
    }
}

/// 502 with the machine-readable reason token.
pub fn bad_gateway(reason: &'static str) -> SyntheticResponse {
    let detail = match reason {
        "all_unhealthy" => "no healthy backend is available",
        "connect_failed" => "no backend accepted the request",
        "upstream_timeout" => "the backend did not answer in time",
        "upstream_closed_early" => "the backend closed the connection mid-response",
        "upstream_too_large" => "the backend response exceeds the size limit",
        _ => "the backend could not be reached",
    };
    SyntheticResponse::new(502, format!("502 Bad Gateway: {detail}\n")).header(X_PROXY_ERROR, reason)
}

/// Client-fault response for `status`.
pub fn client_error(status: u16, detail: &str) -> SyntheticResponse {
    SyntheticResponse::new(status, format!("{status} {}: {detail}\n", reason_phrase(status)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPSTREAM: &[u8] =
        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\nConnection: keep-alive\r\n\r\nhello";

    #[test]
    fn injects_and_forces_close() {
        let out = inject_headers(UPSTREAM, "A", "abcd1234");
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\
             X-Served-By: A\r\nX-Request-Id: abcd1234\r\nConnection: close\r\n\r\nhello"
        );
    }

    #[test]
    fn injection_is_idempotent() {
        let once = inject_headers(UPSTREAM, "A", "abcd1234");
        let twice = inject_headers(&once, "B", "ffffffff");
        assert_eq!(once, twice);
    }

    #[test]
    fn existing_headers_win_case_insensitively() {
        let raw = b"HTTP/1.0 200 OK\r\nx-served-by: app-7\r\nconnection: Close\r\n\r\n";
        let text = String::from_utf8(inject_headers(raw, "A", "id")).unwrap();
        assert!(text.contains("x-served-by: app-7\r\n"));
        assert!(!text.contains("X-Served-By: A"));
        assert!(text.contains("X-Request-Id: id\r\n"));
        assert_eq!(text.matches("onnection").count(), 1);
    }

    #[test]
    fn unrecognised_responses_pass_through() {
        assert_eq!(inject_headers(b"garbage\r\n\r\nbody", "A", "id"), b"garbage\r\n\r\nbody");
        assert_eq!(inject_headers(b"HTTP/1.1 200 OK\r\nX: y", "A", "id"), b"HTTP/1.1 200 OK\r\nX: y");
    }

    #[test]
    fn response_head_framing() {
        let head = ResponseHead::parse(UPSTREAM).unwrap();
        assert_eq!(head.status, 200);
        assert_eq!(head.content_length, Some(5));
        assert_eq!(head.expected_len("GET"), Some(UPSTREAM.len()));
        assert_eq!(head.expected_len("HEAD"), Some(head.head_len));

        let no_content = ResponseHead::parse(b"HTTP/1.1 204 No Content\r\n\r\n").unwrap();
        assert!(!no_content.has_body("GET"));

        let chunked =
            ResponseHead::parse(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n").unwrap();
        assert_eq!(chunked.expected_len("GET"), None);

        assert_eq!(ResponseHead::parse(b"HTTP/1.1 200 OK\r\n"), None);
    }

    #[test]
    fn bad_gateway_shape() {
        let bytes = bad_gateway("all_unhealthy").to_bytes("failover-proxy", "abcd1234");
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 502 Bad Gateway\r\n"));
        assert!(text.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(text.contains("X-Proxy-Error: all_unhealthy\r\n"));
        assert!(text.contains("X-Request-Id: abcd1234\r\n"));
        assert!(text.contains("X-Served-By: failover-proxy\r\n"));

        let body = text.split("\r\n\r\n").nth(1).unwrap();
        assert!(text.contains(&format!("Content-Length: {}\r\n", body.len())));
    }

    #[test]
    fn method_not_allowed_carries_allow() {
        let bytes = client_error(405, "method DELETE is not allowed")
            .header("Allow", "GET, HEAD")
            .to_bytes("p", "id");
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
        assert!(text.contains("Allow: GET, HEAD\r\n"));
    }
}

//! Request reading and parsing.
//!
//! # Responsibilities
//! - Read one HTTP/1.x request head from the client, bounded in size and time
//! - Parse the request line and headers (httparse), ISO-8859-1 decoded
//! - Validate method, target and framing against [`RequestLimits`]
//! - Read exactly `Content-Length` body bytes for methods that carry a body
//!
//! # Design Decisions
//! - Every read has the client-read deadline; the body phase gets a fresh one
//! - Reads are chunked so the buffer never grows far past the header limit
//! - Bytes past `Content-Length` are discarded, never forwarded
//! - Chunked request bodies are refused rather than decoded

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{LimitKind, RequestError};
use crate::http::headers::{latin1_decode, HeaderList};
use crate::resilience::timeouts::{within, Deadlines};
use crate::security::limits::{method_permits_body, RequestLimits};

/// Header slots offered to httparse.
const MAX_HEADERS: usize = 100;

const READ_CHUNK: usize = 4096;

/// A request as read from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: String,
    /// ISO-8859-1 decoded, like header values, so re-encoding restores the raw bytes.
    pub target: String,
    /// Minor version: `0` for HTTP/1.0, `1` for HTTP/1.1.
    pub version: u8,
    pub headers: HeaderList,
    pub body: Option<Bytes>,
}

impl ParsedRequest {
    pub fn version_str(&self) -> &'static str {
        if self.version == 0 {
            "HTTP/1.0"
        } else {
            "HTTP/1.1"
        }
    }

    /// Request line as received, without the trailing CRLF.
    pub fn request_line(&self) -> String {
        format!("{} {} {}", self.method, self.target, self.version_str())
    }

    pub fn body_len(&self) -> usize {
        self.body.as_ref().map_or(0, Bytes::len)
    }
}

/// Position of the `CR LF CR LF` sentinel, if present.
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Read and validate one request from `reader`.
pub async fn read_request<R>(
    reader: &mut R,
    limits: &RequestLimits,
    deadlines: &Deadlines,
) -> Result<ParsedRequest, RequestError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let head_len = read_head(reader, &mut buf, limits, deadlines).await?;
    let mut request = parse_head(&buf[..head_len], limits)?;

    let declared = request
        .headers
        .content_length()
        .map_err(RequestError::Malformed)?
        .unwrap_or(0);

    if method_permits_body(&request.method) && declared > 0 {
        limits.check_body_size(declared)?;
        let leftover = buf.split_off(head_len);
        request.body = Some(read_body(reader, leftover, declared, deadlines).await?);
    }

    Ok(request)
}

/// Accumulate bytes until the head is complete. Returns the head length
/// including the blank line.
async fn read_head<R>(
    reader: &mut R,
    buf: &mut BytesMut,
    limits: &RequestLimits,
    deadlines: &Deadlines,
) -> Result<usize, RequestError>
where
    R: AsyncRead + Unpin,
{
    let deadline = deadlines.client_read();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        if let Some(end) = find_head_end(buf) {
            let head_len = end + 4;
            limits.check_header_size(head_len)?;
            return Ok(head_len);
        }
        limits.check_header_size(buf.len())?;

        let read = within(
            deadline,
            async { reader.read(&mut chunk).await.map_err(RequestError::Io) },
            RequestError::Timeout,
        )
        .await?;
        if read == 0 {
            return Err(RequestError::ConnectionClosed);
        }
        buf.extend_from_slice(&chunk[..read]);
    }
}

fn parse_head(head: &[u8], limits: &RequestLimits) -> Result<ParsedRequest, RequestError> {
    let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut slots);
    match parsed.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(RequestError::Malformed("incomplete request head".into()));
        }
        Err(httparse::Error::TooManyHeaders) => {
            return Err(RequestError::TooLarge {
                what: LimitKind::Header,
                limit: limits.max_header_bytes,
            });
        }
        Err(e) => return Err(RequestError::Malformed(e.to_string())),
    }

    let (Some(method), Some(target), Some(version)) = (parsed.method, parsed.path, parsed.version)
    else {
        return Err(RequestError::Malformed("incomplete request line".into()));
    };

    limits.check_method(method)?;
    limits.check_target(method, target)?;

    let headers: HeaderList = parsed
        .headers
        .iter()
        .map(|h| (h.name.to_string(), latin1_decode(h.value)))
        .collect();

    if headers.contains("transfer-encoding") {
        return Err(RequestError::Malformed(
            "Transfer-Encoding request bodies are not supported".into(),
        ));
    }

    Ok(ParsedRequest {
        method: method.to_string(),
        target: latin1_decode(target.as_bytes()),
        version,
        headers,
        body: None,
    })
}

/// Read exactly `expected` body bytes, starting from what the head read left over.
async fn read_body<R>(
    reader: &mut R,
    mut body: BytesMut,
    expected: usize,
    deadlines: &Deadlines,
) -> Result<Bytes, RequestError>
where
    R: AsyncRead + Unpin,
{
    body.truncate(expected);
    let deadline = deadlines.client_read();
    let mut chunk = [0u8; READ_CHUNK];

    while body.len() < expected {
        let want = (expected - body.len()).min(READ_CHUNK);
        let read = within(
            deadline,
            async { reader.read(&mut chunk[..want]).await.map_err(RequestError::Io) },
            RequestError::Timeout,
        )
        .await?;
        if read == 0 {
            return Err(RequestError::UnexpectedEof {
                expected,
                received: body.len(),
            });
        }
        body.extend_from_slice(&chunk[..read]);
    }

    Ok(body.freeze())
}

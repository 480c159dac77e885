use std::collections::HashMap;

use crate::http::headers::HeaderTable;
use crate::http::request::{Method, Request, Version};

/// Largest request head accepted before the connection is rejected.
pub const DEFAULT_MAX_HEAD_BYTES: usize = 64 * 1024;

/// Largest declared `Content-Length` accepted.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// More bytes are needed; not an error once the peer sends them.
    #[error("request is incomplete")]
    Incomplete,
    #[error("connection closed before the request head was complete")]
    IncompleteHead,
    #[error("malformed request line")]
    MalformedRequestLine,
    #[error("malformed header line")]
    MalformedHeaderLine,
    #[error("malformed query string")]
    MalformedQuery,
    #[error("invalid Content-Length value")]
    InvalidContentLength,
    #[error("connection closed before the declared body was received")]
    TruncatedBody,
    #[error("request head larger than {0} bytes")]
    HeadTooLarge(usize),
    #[error("request body larger than {0} bytes")]
    BodyTooLarge(usize),
}

/// Size ceilings applied while framing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    pub max_head: usize,
    pub max_body: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_head: DEFAULT_MAX_HEAD_BYTES,
            max_body: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Parses one request from the front of `buf`.
///
/// Returns the request and the number of bytes it occupied, or
/// [`ParseError::Incomplete`] when the head terminator or part of the
/// declared body has not arrived yet.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    parse_http_request_with_limits(buf, ParseLimits::default())
}

/// Like [`parse_http_request`] with explicit head and body ceilings.
///
/// An oversized declared body is refused as soon as the head is parsed,
/// before any of it is buffered.
pub fn parse_http_request_with_limits(
    buf: &[u8],
    limits: ParseLimits,
) -> Result<(Request, usize), ParseError> {
    let max_head = limits.max_head;
    // Look for header/body separator
    let head_end = match find_head_end(buf) {
        Some(end) => end,
        None if buf.len() > max_head => return Err(ParseError::HeadTooLarge(max_head)),
        None => return Err(ParseError::Incomplete),
    };

    if head_end > max_head {
        return Err(ParseError::HeadTooLarge(max_head));
    }

    let mut request = parse_head(&buf[..head_end])?;

    // Body
    let content_length = declared_length(&request.headers)?;
    if content_length > limits.max_body {
        return Err(ParseError::BodyTooLarge(limits.max_body));
    }
    let body_start = head_end + HEAD_TERMINATOR.len();
    let body_bytes = &buf[body_start..];

    if body_bytes.len() < content_length {
        return Err(ParseError::Incomplete);
    }

    request.body = body_bytes[..content_length].to_vec();

    Ok((request, body_start + content_length))
}

/// Offset of the blank line that closes the head, if it has arrived.
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
}

/// Parses the request line and header lines. The body is left empty.
pub fn parse_head(head: &[u8]) -> Result<Request, ParseError> {
    let mut lines = head
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line));

    // Request line
    let request_line = lines.next().ok_or(ParseError::MalformedRequestLine)?;
    let request_line =
        std::str::from_utf8(request_line).map_err(|_| ParseError::MalformedRequestLine)?;
    let (method, raw_target, version) = parse_request_line(request_line)?;
    let (target, query) = parse_target(raw_target)?;

    // Headers
    let mut headers = HeaderTable::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let line = std::str::from_utf8(line).map_err(|_| ParseError::MalformedHeaderLine)?;
        let (name, value) = line
            .split_once(':')
            .ok_or(ParseError::MalformedHeaderLine)?;

        if name.is_empty() {
            return Err(ParseError::MalformedHeaderLine);
        }

        headers.set(name, value.trim());
    }

    Ok(Request {
        method,
        target,
        query,
        version,
        headers,
        body: Vec::new(),
    })
}

fn parse_request_line(line: &str) -> Result<(Method, &str, Version), ParseError> {
    let mut parts = line.split_whitespace();

    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::MalformedRequestLine);
    };

    let method = Method::from_str(method).ok_or(ParseError::MalformedRequestLine)?;
    let version = Version::parse(version)
        .filter(|v| v.major == 1)
        .ok_or(ParseError::MalformedRequestLine)?;

    Ok((method, target, version))
}

/// Splits a raw request target into its decoded path and query parameters.
///
/// The fragment is discarded, the path is percent-decoded, and the query is
/// split on `&` then on the first `=` of each pair. A pair without `=` is
/// rejected with [`ParseError::MalformedQuery`].
///
/// ```
/// # use lantern::http::parser::parse_target;
/// let (path, query) = parse_target("/a%20b?x=1#frag").unwrap();
/// assert_eq!(path, "/a b");
/// assert_eq!(query.get("x").map(String::as_str), Some("1"));
/// ```
pub fn parse_target(raw: &str) -> Result<(String, HashMap<String, String>), ParseError> {
    let without_fragment = raw.split('#').next().unwrap_or_default();

    let (path, query_string) = match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    };

    let mut query = HashMap::new();

    if let Some(query_string) = query_string.filter(|q| !q.is_empty()) {
        for pair in query_string.split('&') {
            let (key, value) = pair.split_once('=').ok_or(ParseError::MalformedQuery)?;
            query.insert(key.to_string(), value.to_string());
        }
    }

    Ok((percent_decode(path), query))
}

/// Decodes `%XX` escapes. Stray `%` signs are kept as-is and invalid UTF-8 is
/// replaced, so decoding an already-decoded path changes nothing.
pub fn percent_decode(path: &str) -> String {
    let decoded = urlencoding::decode_binary(path.as_bytes());
    String::from_utf8_lossy(&decoded).into_owned()
}

fn declared_length(headers: &HeaderTable) -> Result<usize, ParseError> {
    headers
        .get("Content-Length")
        .map(|v| v.parse::<usize>().map_err(|_| ParseError::InvalidContentLength))
        .transpose()
        .map(|length| length.unwrap_or(0))
}

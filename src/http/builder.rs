//! Response policy for static resources.
//!
//! Turns a request plus whatever the file store found into a finished
//! [`Response`]: picks the status, stamps `Date`/`Last-Modified`, and chooses
//! exactly one body encoding (gzip, a single byte range, or the plain payload).

use std::io::Write;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;

use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};

/// What the file-serving side produced for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// The target resolved to a servable file.
    Found {
        bytes: Vec<u8>,
        media_type: Option<String>,
        modified: Option<SystemTime>,
    },
    /// The target did not resolve; `page` is the fallback body.
    Missing { page: Vec<u8> },
}

/// Result of interpreting a `Range` header against a payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// Inclusive `start..=end`.
    Satisfiable { start: usize, end: usize },
    Unsatisfiable,
}

/// Builds the response for `request`.
///
/// When `gzip_requested` is set the payload is compressed and the `Range`
/// header is ignored. Otherwise a satisfiable byte range yields
/// `206 Partial Content` and anything else yields the full payload.
pub fn build_response(request: &Request, resource: Resource, gzip_requested: bool) -> Response {
    let (status, payload, media_type, modified) = match resource {
        Resource::Found {
            bytes,
            media_type,
            modified,
        } => (StatusCode::Ok, bytes, media_type, modified),
        Resource::Missing { page } => (StatusCode::NotFound, page, None, None),
    };

    let mut builder = ResponseBuilder::new(status)
        .version(request.version)
        .header("Connection", "keep-alive")
        .header("Date", format_http_date(SystemTime::now()));

    if let Some(media_type) = media_type {
        builder = builder.header("Content-Type", media_type);
    }
    if let Some(modified) = modified {
        builder = builder.header("Last-Modified", format_http_date(modified));
    }
    if status == StatusCode::Ok {
        builder = builder.header("Accept-Ranges", "bytes");
    }

    if gzip_requested {
        match gzip(&payload) {
            Ok(compressed) => {
                return builder
                    .header("Content-Length", compressed.len().to_string())
                    .body(compressed)
                    .gzip(true)
                    .build();
            }
            Err(e) => {
                tracing::warn!(error = %e, "gzip failed, sending identity body");
            }
        }
    }

    let range = request
        .header("Range")
        .filter(|_| status == StatusCode::Ok)
        .and_then(|value| parse_range(value, payload.len()));

    match range {
        Some(ByteRange::Satisfiable { start, end }) => {
            let total = payload.len();
            let body = payload[start..=end].to_vec();
            builder
                .status(StatusCode::PartialContent)
                .header("Content-Range", format!("bytes {}-{}/{}", start, end, total))
                .header("Content-Length", body.len().to_string())
                .body(body)
                .build()
        }
        Some(ByteRange::Unsatisfiable) => builder
            .status(StatusCode::RangeNotSatisfiable)
            .header("Content-Range", format!("bytes */{}", payload.len()))
            .header("Content-Length", "0")
            .build(),
        None => builder
            .header("Content-Length", payload.len().to_string())
            .body(payload)
            .build(),
    }
}

/// Copies `response` without its body. Headers, Content-Length included,
/// are kept so a HEAD reply describes the GET it stands in for.
pub fn without_body(response: &Response) -> Response {
    let mut builder = ResponseBuilder::new(response.status()).version(response.version());
    for (name, value) in response.headers().iter() {
        builder = builder.header(name, value);
    }
    builder.build()
}

/// Interprets a `Range` header value.
///
/// Returns `None` when the header is not a `bytes=` range this server
/// understands, in which case the full payload is served. Only the first
/// range of a list is honoured. A missing end defaults to the last byte.
pub fn parse_range(value: &str, total: usize) -> Option<ByteRange> {
    let ranges = value.trim().strip_prefix("bytes=")?;
    let first = ranges.split(',').next()?.trim();
    let (start, end) = first.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        // suffix form: last N bytes
        let suffix: usize = end.parse().ok()?;
        if suffix == 0 || total == 0 {
            return Some(ByteRange::Unsatisfiable);
        }
        return Some(ByteRange::Satisfiable {
            start: total.saturating_sub(suffix),
            end: total - 1,
        });
    }

    let start: usize = start.parse().ok()?;
    let end: usize = if end.is_empty() {
        total.saturating_sub(1)
    } else {
        end.parse::<usize>().ok()?.min(total.saturating_sub(1))
    };

    if total == 0 || start >= total || start > end {
        return Some(ByteRange::Unsatisfiable);
    }

    Some(ByteRange::Satisfiable { start, end })
}

/// Formats a timestamp as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn format_http_date(time: SystemTime) -> String {
    let time: DateTime<Utc> = time.into();
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

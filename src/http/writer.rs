use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::headers::HeaderTable;
use crate::http::request::{Request, Version};
use crate::http::response::{Response, StatusCode};

/// Serializes the status line, headers and the blank line that ends the head.
pub fn serialize_head(version: Version, status: StatusCode, headers: &HeaderTable) -> Vec<u8> {
    let mut buf = Vec::new();

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        version,
        status.as_u16(),
        status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    // Headers
    for (k, v) in headers.get_all() {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf
}

/// Serializes a request back into wire form.
///
/// The path is percent-encoded segment by segment so that parsing the
/// output yields the same decoded target.
pub fn serialize_request(request: &Request) -> Vec<u8> {
    let mut buf = Vec::new();

    let path = request
        .target
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");

    let mut target = path;
    if !request.query.is_empty() {
        let query = request
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        target.push('?');
        target.push_str(&query);
    }

    buf.extend_from_slice(format!("{} {} {}\r\n", request.method, target, request.version).as_bytes());

    for (k, v) in request.headers.get_all() {
        buf.extend_from_slice(format!("{}: {}\r\n", k, v).as_bytes());
    }
    buf.extend_from_slice(b"\r\n");

    buf.extend_from_slice(&request.body);

    buf
}

/// Writes a response to a stream, tracking how much has gone out.
pub struct ResponseWriter<'a> {
    response: &'a Response,
    written: usize,
}

impl<'a> ResponseWriter<'a> {
    pub fn new(response: &'a Response) -> Self {
        Self {
            response,
            written: 0,
        }
    }

    /// Bytes flushed so far, head included.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Writes the head, then the body, then flushes.
    pub async fn write_to_stream<S>(&mut self, stream: &mut S) -> std::io::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        for part in [self.response.head(), self.response.body()] {
            let mut offset = 0;
            while offset < part.len() {
                let n = stream.write(&part[offset..]).await?;

                if n == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "connection closed while writing",
                    ));
                }

                offset += n;
                self.written += n;
            }
        }

        stream.flush().await
    }
}

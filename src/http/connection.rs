use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::time::timeout;

use crate::http::handler::Handler;
use crate::http::parser::{ParseError, ParseLimits, find_head_end, parse_http_request_with_limits};
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::http::writer::ResponseWriter;

const READ_CHUNK: usize = 4096;

/// Where a connection sits in its lifecycle.
///
/// ```text
///   accept ──► Listening ──(readable)──► Handling ──┬─ keep-alive ─► Listening
///                  │                                └─ close ──────► Closed
///                  └──(idle timeout / peer gone)───────────────────► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Idle, waiting for the next request.
    Listening,
    /// A handler unit owns the connection.
    Handling,
    Closed,
}

/// What happens to a connection after one request/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    KeepAlive,
    Close,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Orderly close with nothing pending.
    #[error("peer closed the connection")]
    PeerGone,
    #[error("protocol violation: {0}")]
    Protocol(#[from] ParseError),
    #[error("timed out reading the request")]
    Timeout,
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),
}

impl ConnectionError {
    /// Errors that only mean the peer went away.
    pub fn is_benign(&self) -> bool {
        match self {
            ConnectionError::PeerGone => true,
            ConnectionError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Limits applied while servicing a request.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Deadline for reading one complete request once it has started.
    pub read_timeout: Duration,
    pub max_head: usize,
    /// Largest declared request body.
    pub max_body: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            max_head: ParseLimits::default().max_head,
            max_body: ParseLimits::default().max_body,
        }
    }
}

impl ConnectionSettings {
    pub fn limits(&self) -> ParseLimits {
        ParseLimits {
            max_head: self.max_head,
            max_body: self.max_body,
        }
    }
}

/// One client socket plus the bytes read from it but not yet parsed.
pub struct Connection<S> {
    stream: S,
    peer: SocketAddr,
    buffer: BytesMut,
    eof: bool,
    served: u64,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            eof: false,
            served: 0,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Requests answered on this connection so far.
    pub fn served(&self) -> u64 {
        self.served
    }

    /// Waits until the peer sends something or closes.
    ///
    /// Any bytes that arrive stay buffered for the next [`serve`](Self::serve).
    pub async fn readable(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() || self.eof {
            return Ok(());
        }
        self.fill().await.map(|_| ())
    }

    /// Reads one request, hands it to `handler` and writes the response.
    pub async fn serve<H: Handler>(
        &mut self,
        handler: &H,
        settings: &ConnectionSettings,
    ) -> Result<Outcome, ConnectionError> {
        let request = match timeout(settings.read_timeout, self.read_request(settings.limits())).await
        {
            Ok(Ok(request)) => request,
            Ok(Err(ConnectionError::Protocol(e))) => {
                self.reject(&e).await;
                return Err(e.into());
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                if !self.buffer.is_empty() {
                    self.write_best_effort(StatusCode::RequestTimeout).await;
                }
                return Err(ConnectionError::Timeout);
            }
        };

        let keep_alive = request.keep_alive();
        let method = request.method;
        let target = request.target.clone();

        let response = handler.handle(request).await;

        ResponseWriter::new(&response)
            .write_to_stream(&mut self.stream)
            .await?;

        self.served += 1;

        tracing::info!(
            peer = %self.peer,
            method = %method,
            path = %target,
            status = response.status().as_u16(),
            bytes = response.body().len(),
            keep_alive,
            "Request served"
        );

        Ok(if keep_alive {
            Outcome::KeepAlive
        } else {
            Outcome::Close
        })
    }

    /// Reads until one full request (head and declared body) is buffered.
    pub async fn read_request(&mut self, limits: ParseLimits) -> Result<Request, ConnectionError> {
        loop {
            // Try parsing whatever we already have
            match parse_http_request_with_limits(&self.buffer, limits) {
                Ok((request, consumed)) => {
                    self.buffer.advance(consumed);
                    return Ok(request);
                }
                Err(ParseError::Incomplete) => {}
                Err(e) => return Err(e.into()),
            }

            if self.eof || self.fill().await? == 0 {
                return Err(self.closed_early());
            }
        }
    }

    async fn fill(&mut self) -> io::Result<usize> {
        self.buffer.reserve(READ_CHUNK);
        let n = self.stream.read_buf(&mut self.buffer).await?;
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }

    fn closed_early(&self) -> ConnectionError {
        if self.buffer.is_empty() {
            ConnectionError::PeerGone
        } else if find_head_end(&self.buffer).is_none() {
            ParseError::IncompleteHead.into()
        } else {
            ParseError::TruncatedBody.into()
        }
    }

    /// Answers a malformed request before the connection is dropped.
    async fn reject(&mut self, error: &ParseError) {
        let status = match error {
            ParseError::IncompleteHead | ParseError::TruncatedBody | ParseError::Incomplete => {
                return;
            }
            ParseError::HeadTooLarge(_) | ParseError::BodyTooLarge(_) => StatusCode::ContentTooLarge,
            _ => StatusCode::BadRequest,
        };
        self.write_best_effort(status).await;
    }

    /// Sends a bare `status` reply with `Connection: close`, ignoring write
    /// failures. Used when the connection is dropped without being served.
    pub async fn refuse(&mut self, status: StatusCode) {
        self.write_best_effort(status).await;
    }

    async fn write_best_effort(&mut self, status: StatusCode) {
        let response = close_response(status);
        if let Err(e) = ResponseWriter::new(&response)
            .write_to_stream(&mut self.stream)
            .await
        {
            tracing::debug!(peer = %self.peer, error = %e, "Failed to send error response");
        }
    }
}

fn close_response(status: StatusCode) -> Response {
    ResponseBuilder::new(status)
        .header("Connection", "close")
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(status.to_string().into_bytes())
        .build()
}

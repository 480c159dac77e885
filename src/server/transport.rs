//! Listening sockets the event loop accepts from.
//!
//! A [`Transport`] hands out raw TCP connections and knows how to wrap them
//! into the byte stream requests are read from. The loop is written once
//! against this trait; plaintext and TLS differ only in `wrap`.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::server::TlsStream;

/// Failures while bringing up a new connection. All of them are transient:
/// the loop logs and keeps accepting.
#[derive(Debug, thiserror::Error)]
pub enum AcceptError {
    #[error("accept failed: {0}")]
    TransientAcceptFailure(#[source] io::Error),
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),
}

pub trait Transport: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Waits for the next TCP connection.
    fn accept(&self) -> impl Future<Output = Result<(TcpStream, SocketAddr), AcceptError>> + Send;

    /// Turns an accepted socket into the stream the server speaks HTTP on.
    /// Runs outside the event loop, so a slow handshake never stalls it.
    fn wrap(&self, stream: TcpStream) -> impl Future<Output = Result<Self::Stream, AcceptError>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// `"http"` or `"https"`, for logs.
    fn scheme(&self) -> &'static str;
}

/// Plain TCP.
pub struct PlainTransport {
    listener: TcpListener,
}

impl PlainTransport {
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
        })
    }

    pub fn from_listener(listener: TcpListener) -> Self {
        Self { listener }
    }
}

impl Transport for PlainTransport {
    type Stream = TcpStream;

    async fn accept(&self) -> Result<(TcpStream, SocketAddr), AcceptError> {
        accept_tcp(&self.listener).await
    }

    async fn wrap(&self, stream: TcpStream) -> Result<TcpStream, AcceptError> {
        Ok(stream)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn scheme(&self) -> &'static str {
        "http"
    }
}

/// TCP wrapped in TLS by rustls.
pub struct TlsTransport {
    listener: TcpListener,
    acceptor: TlsAcceptor,
}

impl TlsTransport {
    pub async fn bind(addr: impl ToSocketAddrs, config: Arc<ServerConfig>) -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
            acceptor: TlsAcceptor::from(config),
        })
    }

    pub fn from_listener(listener: TcpListener, config: Arc<ServerConfig>) -> Self {
        Self {
            listener,
            acceptor: TlsAcceptor::from(config),
        }
    }
}

impl Transport for TlsTransport {
    type Stream = TlsStream<TcpStream>;

    async fn accept(&self) -> Result<(TcpStream, SocketAddr), AcceptError> {
        accept_tcp(&self.listener).await
    }

    async fn wrap(&self, stream: TcpStream) -> Result<TlsStream<TcpStream>, AcceptError> {
        self.acceptor
            .accept(stream)
            .await
            .map_err(AcceptError::Handshake)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn scheme(&self) -> &'static str {
        "https"
    }
}

async fn accept_tcp(listener: &TcpListener) -> Result<(TcpStream, SocketAddr), AcceptError> {
    let (stream, peer) = listener
        .accept()
        .await
        .map_err(AcceptError::TransientAcceptFailure)?;
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
    }
    Ok((stream, peer))
}

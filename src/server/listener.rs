use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::http::connection::{Connection, ConnectionError, ConnectionSettings, Outcome};
use crate::http::handler::Handler;
use crate::http::request::Version;
use crate::http::response::StatusCode;
use crate::server::pool::{Dispatch, WorkerPool};
use crate::server::registry::Registry;
use crate::server::transport::Transport;

/// Pause after a failed accept so a persistent error (EMFILE) does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Knobs for the event loop, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub version: Version,
    /// Upper bound on one loop iteration; how quickly `stop` is noticed.
    pub poll_interval: Duration,
    pub idle_timeout: Duration,
    pub shutdown_grace: Duration,
    pub workers: usize,
    pub backlog: usize,
    /// Accepting pauses while this many connections are open.
    pub max_connections: usize,
    pub connection: ConnectionSettings,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions::from_config(&Config::default())
    }
}

impl ServerOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            version: Version::HTTP_1_1,
            poll_interval: cfg.server.poll_interval(),
            idle_timeout: cfg.server.idle_timeout(),
            shutdown_grace: cfg.server.shutdown_grace(),
            workers: cfg.server.workers,
            backlog: cfg.server.backlog,
            max_connections: cfg.server.max_connections,
            connection: cfg.connection_settings(),
        }
    }
}

/// Stops a running [`Server`] from another task.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl ServerHandle {
    /// Asks the loop to stop. The listening socket closes as soon as the
    /// loop notices; in-flight requests then get the shutdown grace period.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

enum Readiness {
    Ready,
    Expired,
    Failed(io::Error),
}

struct Finished<S> {
    conn: Connection<S>,
    outcome: Result<Outcome, ConnectionError>,
}

/// An HTTP/1.x server over one [`Transport`].
///
/// The loop owns every idle connection. A connection that becomes readable
/// is claimed in the [`Registry`] and moved into a worker unit; it comes
/// back to the loop only if the response asked for keep-alive.
pub struct Server<T: Transport, H: Handler> {
    transport: Arc<T>,
    handler: Arc<H>,
    registry: Registry,
    options: ServerOptions,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl<T: Transport, H: Handler> Server<T, H> {
    pub fn new(transport: T, handler: H, options: ServerOptions) -> anyhow::Result<Self> {
        if options.version.major >= 2 {
            anyhow::bail!("{} is not supported, only HTTP/1.x", options.version);
        }

        Ok(Self {
            transport: Arc::new(transport),
            handler: Arc::new(handler),
            registry: Registry::new(),
            options,
            running: Arc::new(AtomicBool::new(true)),
            wake: Arc::new(Notify::new()),
        })
    }

    /// Builds a server with options taken from `cfg`.
    pub fn bind(cfg: &Config, transport: T, handler: H) -> anyhow::Result<Self> {
        Self::new(transport, handler, ServerOptions::from_config(cfg))
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            running: self.running.clone(),
            wake: self.wake.clone(),
        }
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the event loop until [`ServerHandle::stop`] is called. A stop
    /// requested before `run` makes it return right away.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.transport.local_addr()?;
        let scheme = self.transport.scheme();
        info!(%addr, scheme, version = %self.options.version, "Listening");

        let mut handshakes: JoinSet<Option<Connection<T::Stream>>> = JoinSet::new();
        let mut idle: JoinSet<(Connection<T::Stream>, Readiness)> = JoinSet::new();
        let mut pool: WorkerPool<Finished<T::Stream>> =
            WorkerPool::new(self.options.workers, self.options.backlog);
        let mut refusals: JoinSet<()> = JoinSet::new();

        while self.running.load(Ordering::Acquire) {
            let open = handshakes.len() + idle.len() + pool.active() + pool.queued() + refusals.len();
            let accepting = open < self.options.max_connections;

            tokio::select! {
                _ = self.wake.notified() => {}

                accepted = self.transport.accept(), if accepting => match accepted {
                    Ok((stream, peer)) => {
                        let transport = self.transport.clone();
                        handshakes.spawn(async move {
                            match transport.wrap(stream).await {
                                Ok(stream) => Some(Connection::new(stream, peer)),
                                Err(e) => {
                                    debug!(%peer, error = %e, "Dropping connection");
                                    None
                                }
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed, backing off");
                        sleep(ACCEPT_BACKOFF).await;
                    }
                },

                Some(joined) = handshakes.join_next(), if !handshakes.is_empty() => {
                    if let Ok(Some(conn)) = joined {
                        debug!(peer = %conn.peer(), "Accepted connection");
                        self.registry.register(conn.peer()).await;
                        self.arm(&mut idle, conn);
                    }
                }

                Some(joined) = idle.join_next(), if !idle.is_empty() => match joined {
                    Ok((conn, Readiness::Ready)) => {
                        self.registry.touch(conn.peer()).await;
                        self.dispatch(&mut pool, &mut refusals, conn).await;
                    }
                    Ok((conn, Readiness::Expired)) => {
                        debug!(peer = %conn.peer(), served = conn.served(), "Idle timeout, closing");
                        self.registry.remove(conn.peer()).await;
                    }
                    Ok((conn, Readiness::Failed(e))) => {
                        debug!(peer = %conn.peer(), error = %e, "Idle connection failed");
                        self.registry.remove(conn.peer()).await;
                    }
                    Err(e) => error!(error = %e, "Idle watcher failed"),
                },

                Some((peer, joined)) = pool.join_next(), if !pool.is_empty() => {
                    self.finish(&mut idle, peer, joined).await;
                }

                Some(_) = refusals.join_next(), if !refusals.is_empty() => {}

                _ = sleep(self.options.poll_interval) => {}
            }
        }

        info!(%addr, scheme, "Shutting down");
        self.running.store(false, Ordering::Release);

        // Close the listening socket before draining. Handshake tasks hold
        // the last other references to the transport.
        handshakes.shutdown().await;
        drop(self.transport);

        idle.shutdown().await;
        refusals.shutdown().await;

        let abandoned = pool.drain(self.options.shutdown_grace).await;
        if abandoned > 0 {
            warn!(abandoned, "Aborted handlers still running after the grace period");
        }

        self.registry.clear().await;
        info!(%addr, scheme, "Server stopped");
        Ok(())
    }

    /// Watches an idle connection until it is readable or times out.
    fn arm(&self, idle: &mut JoinSet<(Connection<T::Stream>, Readiness)>, mut conn: Connection<T::Stream>) {
        let idle_timeout = self.options.idle_timeout;
        idle.spawn(async move {
            let readiness = match timeout(idle_timeout, conn.readable()).await {
                Ok(Ok(())) => Readiness::Ready,
                Ok(Err(e)) => Readiness::Failed(e),
                Err(_) => Readiness::Expired,
            };
            (conn, readiness)
        });
    }

    async fn dispatch(
        &self,
        pool: &mut WorkerPool<Finished<T::Stream>>,
        refusals: &mut JoinSet<()>,
        conn: Connection<T::Stream>,
    ) {
        let peer = conn.peer();
        let settings = self.options.connection;

        if pool.is_saturated() {
            warn!(%peer, active = pool.active(), queued = pool.queued(), "Worker pool saturated, answering 503");
            self.registry.remove(peer).await;
            refusals.spawn(async move {
                let mut conn = conn;
                // Consume the request first so closing does not reset the socket
                let _ = timeout(settings.read_timeout, async {
                    let _ = conn.read_request(settings.limits()).await;
                    conn.refuse(StatusCode::ServiceUnavailable).await;
                })
                .await;
            });
            return;
        }

        if let Err(e) = self.registry.begin_handling(peer).await {
            warn!(%peer, error = %e, "Refusing duplicate dispatch");
            return;
        }

        let handler = self.handler.clone();
        let job = async move {
            let mut conn = conn;
            let outcome = conn.serve(handler.as_ref(), &settings).await;
            Finished { conn, outcome }
        };

        match pool.dispatch(peer, job) {
            Dispatch::Started => {}
            Dispatch::Queued => debug!(%peer, queued = pool.queued(), "Workers busy, request queued"),
            Dispatch::Rejected => {
                error!(%peer, "Dispatch rejected by a pool that reported free capacity");
                self.registry.remove(peer).await;
            }
        }
    }

    async fn finish(
        &self,
        idle: &mut JoinSet<(Connection<T::Stream>, Readiness)>,
        peer: SocketAddr,
        joined: Result<Finished<T::Stream>, JoinError>,
    ) {
        let finished = match joined {
            Ok(finished) => finished,
            Err(e) => {
                error!(%peer, error = %e, "Handler unit crashed");
                self.registry.remove(peer).await;
                return;
            }
        };

        match finished.outcome {
            Ok(Outcome::KeepAlive) => {
                if self.registry.finish_handling(peer).await.is_ok() {
                    self.arm(idle, finished.conn);
                }
            }
            Ok(Outcome::Close) => {
                debug!(%peer, "Closing connection");
                self.registry.remove(peer).await;
            }
            Err(e) => {
                if e.is_benign() || matches!(e, ConnectionError::Timeout) {
                    debug!(%peer, error = %e, "Connection closed");
                } else if matches!(e, ConnectionError::Protocol(_)) {
                    warn!(%peer, error = %e, "Protocol violation, closing connection");
                } else {
                    error!(%peer, error = %e, "Connection failed");
                }
                self.registry.remove(peer).await;
            }
        }
    }
}

//! Connection engine: transports, the event loop, the connection registry
//! and the worker pool that services ready connections.
//!
//! ```text
//!   Transport::accept ──► wrap (off-loop) ──► Registry::register ──► idle set
//!                                                                      │ readable
//!                                              Registry::begin_handling ◄┘
//!                                                       │
//!                                                 WorkerPool unit ── Connection::serve
//!                                                       │
//!                             keep-alive ◄──────────────┴──────────► close
//!                  Registry::finish_handling                 Registry::remove
//! ```

pub mod listener;
pub mod pool;
pub mod registry;
pub mod tls;
pub mod transport;

pub use listener::{Server, ServerHandle, ServerOptions};
pub use pool::{Dispatch, WorkerPool};
pub use registry::{Entry, Registry, RegistryError};
pub use transport::{AcceptError, PlainTransport, TlsTransport, Transport};

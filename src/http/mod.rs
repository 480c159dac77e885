//! HTTP/1.1 message handling.
//!
//! # Architecture
//!
//! - **`headers`**: Ordered header table with known-name categories
//! - **`request`**: Request model, methods and protocol versions
//! - **`parser`**: Parses incoming requests from byte buffers
//! - **`response`**: Response model with builder; the head is serialized once
//! - **`writer`**: Serializes messages and writes responses to a stream
//! - **`builder`**: Static-resource response policy (status, dates, gzip, ranges)
//! - **`handler`**: The `Handler` boundary between framing and application
//! - **`connection`**: Reads one request off a ready socket and answers it
//!
//! # Request cycle
//!
//! ```text
//!   bytes ──► parser ──► Request ──► Handler ──► Response ──► writer ──► socket
//!                                                                 │
//!                                    Connection: keep-alive? ─────┴─► re-arm / close
//! ```
//!
//! Framing is strictly `Content-Length` based: no chunked bodies and no
//! pipelining. A connection is not polled again until its previous response
//! has been fully written.

pub mod builder;
pub mod connection;
pub mod handler;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;

pub use connection::{Connection, ConnectionError, ConnectionSettings, ConnectionState, Outcome};
pub use handler::Handler;
pub use headers::{HeaderCategory, HeaderTable};
pub use request::{Method, Request, Version};
pub use response::{Response, ResponseBuilder, StatusCode};

//! Lantern - static HTTP/1.1 and HTTPS file server
//!
//! Core library: message framing, the connection engine and the static
//! file handler the binary wires together.

pub mod config;
pub mod files;
pub mod http;
pub mod server;

//! Static file serving.
//!
//! This is the application side of the server: it resolves request targets
//! against a directory and turns the result into responses via
//! [`crate::http::builder`].

pub mod service;
pub mod store;

pub use service::StaticFiles;
pub use store::{FileStore, NOT_FOUND_PAGE, media_type, normalize_target};

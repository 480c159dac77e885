//! Server configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file
//! (`LANTERN_CONFIG`), then `LANTERN_*` environment variables. Command-line
//! flags are applied on top by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::http::connection::ConnectionSettings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub files: FilesConfig,
    pub tls: TlsConfig,
}

/// Listener and connection-engine settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address; `0.0.0.0` listens on all interfaces.
    pub bind: String,
    pub http_port: u16,
    pub https_port: u16,
    /// Handler units allowed to run at once.
    pub workers: usize,
    /// Ready connections queued while every worker is busy.
    pub backlog: usize,
    pub poll_interval_ms: u64,
    pub read_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub max_head_bytes: usize,
    /// Largest declared request body; larger requests get 413.
    pub max_body_bytes: usize,
    /// Open connections (idle plus in flight) before accepting pauses.
    pub max_connections: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Directory request targets are resolved against.
    pub root: PathBuf,
    /// Fallback page, relative to `root`.
    pub not_found_page: String,
    /// Compress bodies for clients that accept gzip.
    pub gzip: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            http_port: 80,
            https_port: 443,
            workers: 64,
            backlog: 256,
            poll_interval_ms: 100,
            read_timeout_secs: 30,
            idle_timeout_secs: 60,
            shutdown_grace_secs: 5,
            max_head_bytes: crate::http::parser::DEFAULT_MAX_HEAD_BYTES,
            max_body_bytes: crate::http::parser::DEFAULT_MAX_BODY_BYTES,
            max_connections: 1024,
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            not_found_page: "not_found.html".to_string(),
            gzip: true,
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cert: PathBuf::from("server.crt"),
            key: PathBuf::from("server.key"),
        }
    }
}

impl Config {
    /// Defaults, then the file named by `LANTERN_CONFIG` if set, then the
    /// environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match std::env::var("LANTERN_CONFIG") {
            Ok(path) => Config::from_file(path)?,
            Err(_) => Config::default(),
        };
        cfg.apply_env_from(|var| std::env::var(var).ok())?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Config::from_yaml_str(&text)
    }

    /// Missing keys keep their defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Overrides fields from `LANTERN_*` variables supplied by `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("LANTERN_BIND") {
            self.server.bind = bind;
        }
        if let Some(port) = lookup("LANTERN_HTTP_PORT") {
            self.server.http_port = parse_port("LANTERN_HTTP_PORT", port)?;
        }
        if let Some(port) = lookup("LANTERN_HTTPS_PORT") {
            self.server.https_port = parse_port("LANTERN_HTTPS_PORT", port)?;
        }
        if let Some(root) = lookup("LANTERN_ROOT") {
            self.files.root = PathBuf::from(root);
        }
        Ok(())
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.http_port)
    }

    pub fn https_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.https_port)
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            read_timeout: Duration::from_secs(self.server.read_timeout_secs),
            max_head: self.server.max_head_bytes,
            max_body: self.server.max_body_bytes,
        }
    }
}

impl ServerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn parse_port(var: &'static str, value: String) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

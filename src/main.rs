use std::path::PathBuf;

use clap::Parser;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

use lantern::config::Config;
use lantern::files::{FileStore, StaticFiles};
use lantern::server::{PlainTransport, Server, TlsTransport, tls};

#[derive(Parser, Debug)]
#[command(
    name = "lantern",
    version,
    about = "Serves the files of a directory over HTTP/1.1 and HTTPS.",
    long_about = None
)]
struct Args {
    /// Plaintext port.
    http_port: Option<u16>,
    /// TLS port.
    https_port: Option<u16>,
    /// YAML configuration file.
    #[arg(short, long, env = "LANTERN_CONFIG")]
    config: Option<PathBuf>,
    /// Address to bind both listeners to.
    #[arg(short, long)]
    bind: Option<String>,
    /// Directory to serve.
    #[arg(short, long)]
    root: Option<PathBuf>,
    /// Serve plaintext only.
    #[arg(long)]
    no_tls: bool,
    /// Never compress responses.
    #[arg(long)]
    no_gzip: bool,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => {
                let mut cfg = Config::from_file(path)?;
                cfg.apply_env_from(|var| std::env::var(var).ok())?;
                cfg
            }
            None => Config::load()?,
        };

        if let Some(port) = self.http_port {
            cfg.server.http_port = port;
        }
        if let Some(port) = self.https_port {
            cfg.server.https_port = port;
        }
        if let Some(bind) = &self.bind {
            cfg.server.bind = bind.clone();
        }
        if let Some(root) = &self.root {
            cfg.files.root = root.clone();
        }
        if self.no_tls {
            cfg.tls.enabled = false;
        }
        if self.no_gzip {
            cfg.files.gzip = false;
        }
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Args::parse().load_config()?;
    tracing::info!(root = %cfg.files.root.display(), gzip = cfg.files.gzip, tls = cfg.tls.enabled, "Starting");

    let files = StaticFiles::new(
        FileStore::new(cfg.files.root.clone(), cfg.files.not_found_page.clone()),
        cfg.files.gzip,
    );

    let mut servers = JoinSet::new();
    let mut handles = Vec::new();

    let plain = Server::bind(&cfg, PlainTransport::bind(cfg.http_addr()).await?, files.clone())?;
    handles.push(plain.handle());
    servers.spawn(plain.run());

    if cfg.tls.enabled {
        let tls_config = tls::load_or_generate(&cfg.tls)?;
        let secure = Server::bind(&cfg, TlsTransport::bind(cfg.https_addr(), tls_config).await?, files)?;
        handles.push(secure.handle());
        servers.spawn(secure.run());
    }

    tokio::select! {
        Some(res) = servers.join_next() => {
            res??;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    for handle in &handles {
        handle.stop();
    }
    while let Some(res) = servers.join_next().await {
        res??;
    }

    Ok(())
}

//! TLS server credentials.

use std::fs::File;
use std::io::BufReader;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::config::TlsConfig;

/// Loads the configured PEM certificate chain and key, or generates a
/// self-signed localhost certificate when neither file exists.
pub fn load_or_generate(cfg: &TlsConfig) -> Result<Arc<ServerConfig>> {
    if !cfg.cert.exists() && !cfg.key.exists() {
        tracing::warn!(
            cert = %cfg.cert.display(),
            key = %cfg.key.display(),
            "TLS credentials not found, using a self-signed localhost certificate"
        );
        return self_signed();
    }
    load_pem(&cfg.cert, &cfg.key)
}

pub fn load_pem(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>> {
    let mut reader = BufReader::new(
        File::open(cert_path)
            .with_context(|| format!("failed to open certificate {}", cert_path.display()))?,
    );
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid certificate PEM in {}", cert_path.display()))?;
    if certs.is_empty() {
        anyhow::bail!("no certificates found in {}", cert_path.display());
    }

    let mut reader = BufReader::new(
        File::open(key_path)
            .with_context(|| format!("failed to open private key {}", key_path.display()))?,
    );
    let key = rustls_pemfile::private_key(&mut reader)
        .with_context(|| format!("invalid private key PEM in {}", key_path.display()))?
        .with_context(|| format!("no private key found in {}", key_path.display()))?;

    build(certs, key)
}

/// Certificate for `127.0.0.1`, `::1` and `localhost`, generated in memory.
pub fn self_signed() -> Result<Arc<ServerConfig>> {
    let names = vec![
        Ipv4Addr::LOCALHOST.to_string(),
        Ipv6Addr::LOCALHOST.to_string(),
        "localhost".to_string(),
    ];
    let key_pair = rcgen::KeyPair::generate().context("failed to generate key pair")?;
    let cert = rcgen::CertificateParams::new(names)
        .and_then(|params| params.self_signed(&key_pair))
        .context("failed to generate self-signed certificate")?;

    let cert = cert.der().clone();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    build(vec![cert], key)
}

fn build(certs: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> Result<Arc<ServerConfig>> {
    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("certificate and key do not form a usable TLS identity")?;
    config.alpn_protocols = vec![b"http/1.1".to_vec(), b"http/1.0".to_vec()];
    Ok(Arc::new(config))
}

//! TLS for game connections.
//!
//! The server loads a PEM certificate chain and private key; the client
//! trusts a PEM certificate (typically the server's self-signed one) as
//! its only root.

use derive_more::{Display, Error, From};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::{TlsAcceptor, TlsConnector, client};
use tracing::{debug, info, instrument};

/// Errors raised while building a TLS configuration.
#[derive(Debug, Display, Error, From)]
pub enum TlsError {
    /// A PEM file could not be read.
    #[display("Failed to read '{}': {}", path.display(), source)]
    #[from(skip)]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The certificate file holds no certificate.
    #[display("No certificate found in '{}'", _0.display())]
    #[from(skip)]
    NoCertificate(#[error(not(source))] PathBuf),
    /// The key file holds no supported private key.
    #[display("No private key found in '{}'", _0.display())]
    #[from(skip)]
    NoPrivateKey(#[error(not(source))] PathBuf),
    /// rustls rejected the certificate, key, or protocol setup.
    #[display("TLS configuration rejected: {}", _0)]
    Rustls(rustls::Error),
    /// The name to verify the server against is not a valid DNS name or IP.
    #[display("Invalid TLS server name '{}'", _0)]
    #[from(skip)]
    InvalidServerName(#[error(not(source))] String),
}

/// Builds the server-side acceptor from PEM files.
///
/// # Errors
///
/// Fails if either file cannot be read or parsed, or rustls rejects the pair.
#[instrument(fields(cert = %cert_path.display(), key = %key_path.display()))]
pub fn server_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TlsError> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;
    let config = rustls::ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    info!("TLS enabled for game connections");
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Client-side TLS settings: trusted root plus the name to verify.
#[derive(Clone)]
pub struct ClientTls {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl ClientTls {
    /// Trusts the certificates in `ca_cert` and verifies the server as
    /// `server_name`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be parsed or the name is invalid.
    #[instrument(fields(ca_cert = %ca_cert.display()))]
    pub fn from_ca_file(ca_cert: &Path, server_name: &str) -> Result<Self, TlsError> {
        let mut roots = rustls::RootCertStore::empty();
        for cert in load_certs(ca_cert)? {
            roots.add(cert)?;
        }
        let config = rustls::ClientConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|_| TlsError::InvalidServerName(server_name.to_string()))?;
        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            server_name,
        })
    }

    /// Runs the client handshake over `stream`.
    pub async fn connect<S>(&self, stream: S) -> std::io::Result<client::TlsStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.connector
            .connect(self.server_name.clone(), stream)
            .await
    }
}

fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificate(path.to_path_buf()));
    }
    debug!(count = certs.len(), "Loaded certificates");
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

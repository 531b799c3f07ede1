//! mTLS transport: rustls config building and peer identity injection.
//!
//! Provides:
//! - [`build_tls_config`]: build a `rustls::ServerConfig` from [`TlsConfig`]
//! - [`load_certs`] / [`load_private_key`]: PEM file loading
//! - [`PeerIdentityAcceptor`]: TLS acceptor that attaches [`PeerIdentity`]
//!   to every request served on the connection
//!
//! All certificate and key files are expected in **PEM format**.

use std::fs;
use std::io;
use std::sync::Arc;

use axum_server::accept::Accept;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use futures::future::BoxFuture;
use rustls::ServerConfig;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, CertificateRevocationListDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;
use tower_http::add_extension::AddExtension;
use tracing::debug;

use crate::config::TlsConfig;
use crate::rbac::PeerIdentity;
use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Public: build TLS server config
// ─────────────────────────────────────────────────────────────────────────────

/// Build a `rustls::ServerConfig` for mutual TLS.
///
/// With `require_client_cert`, clients without a certificate signed by the
/// configured CA fail the handshake. Without it, such clients connect with
/// no identity and the gate answers 401.
///
/// # Errors
///
/// Returns an error if any certificate or key file cannot be read or parsed,
/// or if the cert/key pair does not match.
pub fn build_tls_config(config: &TlsConfig) -> Result<ServerConfig> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());

    let server_certs = load_certs(&config.server_cert)?;
    let server_key = load_private_key(&config.server_key)?;
    let ca_certs = load_certs(&config.ca_cert)?;

    let mut root_store = rustls::RootCertStore::empty();
    for cert in ca_certs {
        root_store
            .add(cert)
            .map_err(|e| Error::Config(format!("Failed to add CA cert to trust store: {e}")))?;
    }

    let client_verifier = build_client_verifier(config, root_store, Arc::clone(&provider))?;

    let mut tls_cfg = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Config(format!("TLS protocol configuration error: {e}")))?
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(server_certs, server_key)
        .map_err(|e| Error::Config(format!("TLS config error (cert/key mismatch?): {e}")))?;

    // Prefer HTTP/2, fall back to HTTP/1.1
    tls_cfg.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    debug!(
        server_cert = %config.server_cert,
        ca_cert = %config.ca_cert,
        require_client_cert = config.require_client_cert,
        "mTLS config built"
    );

    Ok(tls_cfg)
}

// ─────────────────────────────────────────────────────────────────────────────
// Public: PEM loading
// ─────────────────────────────────────────────────────────────────────────────

/// Load all certificates from a PEM file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or contains no valid PEM
/// certificate blocks.
pub fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let pem_data = read_file(path)?;
    let certs = CertificateDer::pem_slice_iter(&pem_data)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Config(format!("Failed to parse certs from '{path}': {e}")))?;

    if certs.is_empty() {
        return Err(Error::Config(format!("No certificates found in '{path}'")));
    }

    Ok(certs)
}

/// Load the first private key (PKCS#1, PKCS#8 or SEC1) from a PEM file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or contains no private key.
pub fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let pem_data = read_file(path)?;
    PrivateKeyDer::from_pem_slice(&pem_data)
        .map_err(|e| Error::Config(format!("Failed to parse private key from '{path}': {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Public: acceptor
// ─────────────────────────────────────────────────────────────────────────────

/// TLS acceptor that reads the verified client certificate once per
/// connection and attaches it to each request as a [`PeerIdentity`]
/// extension.
#[derive(Clone)]
pub struct PeerIdentityAcceptor {
    inner: RustlsAcceptor,
}

impl PeerIdentityAcceptor {
    /// Wrap a rustls server config.
    #[must_use]
    pub fn new(config: RustlsConfig) -> Self {
        Self {
            inner: RustlsAcceptor::new(config),
        }
    }
}

impl<I, S> Accept<I, S> for PeerIdentityAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: Send + 'static,
{
    type Stream = TlsStream<I>;
    type Service = AddExtension<S, PeerIdentity>;
    type Future = BoxFuture<'static, io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let acceptor = self.inner.clone();

        Box::pin(async move {
            let (stream, service) = acceptor.accept(stream, service).await?;
            let peer = PeerIdentity::from_peer_chain(stream.get_ref().1.peer_certificates());
            debug!(
                client = peer.cert.as_ref().map_or("<none>", |c| c.display_name.as_str()),
                "TLS connection accepted"
            );
            Ok((stream, AddExtension::new(service, peer)))
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Private helpers
// ─────────────────────────────────────────────────────────────────────────────

fn read_file(path: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::Config(format!("Cannot read '{path}': {e}")))
}

/// Build a `WebPkiClientVerifier` with optional CRL support.
fn build_client_verifier(
    config: &TlsConfig,
    root_store: rustls::RootCertStore,
    provider: Arc<CryptoProvider>,
) -> Result<Arc<dyn rustls::server::danger::ClientCertVerifier>> {
    let builder = WebPkiClientVerifier::builder_with_provider(Arc::new(root_store), provider);

    let builder = if let Some(ref crl_path) = config.crl_path {
        builder.with_crls(load_crls(crl_path)?)
    } else {
        builder
    };

    let builder = if config.require_client_cert {
        builder
    } else {
        builder.allow_unauthenticated()
    };

    builder
        .build()
        .map_err(|e| Error::Config(format!("Failed to build client verifier: {e}")))
}

/// Load CRL entries from a PEM file.
fn load_crls(path: &str) -> Result<Vec<CertificateRevocationListDer<'static>>> {
    let pem_data = read_file(path)?;
    CertificateRevocationListDer::pem_slice_iter(&pem_data)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Config(format!("Failed to parse CRL from '{path}': {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

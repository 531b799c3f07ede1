//! mTLS loopback tests
//!
//! Runs the real listener stack on 127.0.0.1: rustls server config,
//! `PeerIdentityAcceptor`, and the gated router. Clients connect with
//! tokio-rustls, optionally presenting a certificate issued by a test CA.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose,
};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use mtls_rbac::config::TlsConfig;
use mtls_rbac::rbac::{Gate, Policy, Role};
use mtls_rbac::server::{PeerIdentityAcceptor, build_tls_config, router};

// ── PKI fixtures ─────────────────────────────────────────────────────────────

struct Pki {
    ca: Certificate,
    issuer: Issuer<'static, KeyPair>,
}

fn named(params: &mut CertificateParams, cn: &str) {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
}

fn test_ca() -> Pki {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    named(&mut params, "RBAC Test CA");
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    let key = KeyPair::generate().unwrap();
    let ca = params.self_signed(&key).unwrap();
    Pki {
        ca,
        issuer: Issuer::new(params, key),
    }
}

fn issue(
    pki: &Pki,
    cn: &str,
    sans: Vec<String>,
    usage: ExtendedKeyUsagePurpose,
) -> (Certificate, KeyPair) {
    let mut params = CertificateParams::new(sans).unwrap();
    named(&mut params, cn);
    params.extended_key_usages = vec![usage];

    let key = KeyPair::generate().unwrap();
    let cert = params.signed_by(&key, &pki.issuer).unwrap();
    (cert, key)
}

/// Write CA and server material to `dir` and return the listener config.
fn write_server_material(dir: &Path, pki: &Pki, require_client_cert: bool) -> TlsConfig {
    let (server_cert, server_key) = issue(
        pki,
        "localhost",
        vec!["localhost".to_string()],
        ExtendedKeyUsagePurpose::ServerAuth,
    );

    let ca_path = dir.join("ca.crt");
    let cert_path = dir.join("server.crt");
    let key_path = dir.join("server.key");
    std::fs::write(&ca_path, pki.ca.pem()).unwrap();
    std::fs::write(&cert_path, server_cert.pem()).unwrap();
    std::fs::write(&key_path, server_key.serialize_pem()).unwrap();

    TlsConfig {
        server_cert: cert_path.display().to_string(),
        server_key: key_path.display().to_string(),
        ca_cert: ca_path.display().to_string(),
        require_client_cert,
        crl_path: None,
    }
}

// ── server / client helpers ──────────────────────────────────────────────────

fn mock_policy() -> Policy {
    Policy::from_roles([
        (
            "api1",
            Role::new()
                .with_resource("/users", ["GET", "PUT", "POST", "DELETE"])
                .with_resource("/products", ["GET", "PUT"]),
        ),
        ("api2", Role::new().with_resource("/users", ["GET"])),
    ])
}

async fn start_server(tls: &TlsConfig) -> (SocketAddr, Handle<SocketAddr>) {
    let server_config = build_tls_config(tls).unwrap();
    let acceptor = PeerIdentityAcceptor::new(RustlsConfig::from_config(Arc::new(server_config)));
    let app = router(Arc::new(Gate::new(mock_policy())));

    let handle = Handle::new();
    let server = axum_server::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .acceptor(acceptor)
        .handle(handle.clone())
        .serve(app.into_make_service());
    tokio::spawn(server);

    let addr = handle.listening().await.unwrap();
    (addr, handle)
}

/// Send one HTTP/1.1 GET over mTLS and return the raw response text.
///
/// Returns an empty string when the server tears the connection down.
async fn get(
    addr: SocketAddr,
    pki: &Pki,
    client: Option<&(Certificate, KeyPair)>,
    path: &str,
) -> String {
    let mut roots = RootCertStore::empty();
    roots.add(pki.ca.der().clone()).unwrap();

    let builder =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots);

    let mut config = match client {
        Some((cert, key)) => builder
            .with_client_auth_cert(
                vec![cert.der().clone()],
                PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der())),
            )
            .unwrap(),
        None => builder.with_no_client_auth(),
    };
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    let tcp = TcpStream::connect(addr).await.unwrap();
    let Ok(mut tls) = TlsConnector::from(Arc::new(config))
        .connect(ServerName::try_from("localhost").unwrap(), tcp)
        .await
    else {
        return String::new();
    };

    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    if tls.write_all(request.as_bytes()).await.is_err() {
        return String::new();
    }

    let mut response = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match tls.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => response.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&response).into_owned()
}

// ── tests ────────────────────────────────────────────────────────────────────

/// Certificate CN reaches the gate through the acceptor
#[tokio::test]
async fn test_client_certificate_role_is_authorized() {
    let dir = tempfile::tempdir().unwrap();
    let pki = test_ca();
    let (addr, handle) = start_server(&write_server_material(dir.path(), &pki, false)).await;
    let api1 = issue(&pki, "api1", Vec::new(), ExtendedKeyUsagePurpose::ClientAuth);

    let response = get(addr, &pki, Some(&api1), "/users").await;

    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    assert!(response.contains(r#"{"message":"All Users"}"#), "got: {response}");

    handle.shutdown();
}

/// Known role without the grant is forbidden over the wire too
#[tokio::test]
async fn test_client_certificate_without_grant_is_forbidden() {
    let dir = tempfile::tempdir().unwrap();
    let pki = test_ca();
    let (addr, handle) = start_server(&write_server_material(dir.path(), &pki, false)).await;
    let api2 = issue(&pki, "API2", Vec::new(), ExtendedKeyUsagePurpose::ClientAuth);

    let response = get(addr, &pki, Some(&api2), "/products").await;

    assert!(response.starts_with("HTTP/1.1 403"), "got: {response}");
    assert!(response.contains(r#"{"error":"Forbidden"}"#), "got: {response}");

    handle.shutdown();
}

/// Optional client auth: no certificate means 401 from the gate
#[tokio::test]
async fn test_missing_client_certificate_is_unauthorized() {
    let dir = tempfile::tempdir().unwrap();
    let pki = test_ca();
    let (addr, handle) = start_server(&write_server_material(dir.path(), &pki, false)).await;

    let response = get(addr, &pki, None, "/users").await;

    assert!(response.starts_with("HTTP/1.1 401"), "got: {response}");
    assert!(response.contains(r#"{"error":"Unauthorized"}"#), "got: {response}");

    handle.shutdown();
}

/// Required client auth: the handshake fails before any HTTP exchange
#[tokio::test]
async fn test_required_client_certificate_rejects_anonymous_peer() {
    let dir = tempfile::tempdir().unwrap();
    let pki = test_ca();
    let (addr, handle) = start_server(&write_server_material(dir.path(), &pki, true)).await;

    let response = get(addr, &pki, None, "/users").await;

    assert!(response.is_empty(), "got: {response}");

    handle.shutdown();
}

//! Certificate identity extraction.
//!
//! The TLS layer verifies the client certificate; this module only reads
//! fields out of the already-verified DER bytes. The role used for
//! authorization is the subject Common Name, lower-cased.

use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Certificate identity
// ─────────────────────────────────────────────────────────────────────────────

/// Identity fields read from a verified client certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertIdentity {
    /// Certificate Common Name (CN), as written in the certificate.
    pub common_name: Option<String>,

    /// Subject Alternative Name URI entries (e.g. SPIFFE IDs).
    pub san_uris: Vec<String>,

    /// Pre-computed label for logs.
    pub display_name: String,
}

impl CertIdentity {
    /// Identity carrying only a Common Name.
    #[must_use]
    pub fn from_common_name(cn: impl Into<String>) -> Self {
        let cn = cn.into();
        Self {
            display_name: build_display_name(Some(&cn), &[]),
            common_name: Some(cn),
            san_uris: Vec::new(),
        }
    }

    /// Parse a DER-encoded certificate and extract its identity fields.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the certificate cannot be parsed.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| Error::Config(format!("Failed to parse client certificate: {e}")))?;

        let common_name = extract_cn(&cert);
        let san_uris = extract_san_uris(&cert);
        let display_name = build_display_name(common_name.as_ref(), &san_uris);

        Ok(Self {
            common_name,
            san_uris,
            display_name,
        })
    }

    /// Role name for this identity: the lower-cased CN, or `""` without one.
    #[must_use]
    pub fn role(&self) -> String {
        self.common_name
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_default()
    }
}

/// Role for the peer of a request; `""` when no verified certificate is
/// present. Callers treat `""` as unauthenticated.
#[must_use]
pub fn extract_role(peer: Option<&CertIdentity>) -> String {
    peer.map(CertIdentity::role).unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Request extension
// ─────────────────────────────────────────────────────────────────────────────

/// Per-connection peer identity, attached to every request by the transport.
///
/// `cert` is `None` when the client completed the handshake without a
/// certificate (optional client auth) or the certificate could not be read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerIdentity {
    /// Verified client certificate identity, if any.
    pub cert: Option<CertIdentity>,
}

impl PeerIdentity {
    /// A peer that presented a verified certificate.
    #[must_use]
    pub fn verified(cert: CertIdentity) -> Self {
        Self { cert: Some(cert) }
    }

    /// A peer without a certificate.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Build from the DER chain reported by the TLS session; only the leaf
    /// (first) certificate is used.
    ///
    /// Parse failures are logged and yield an anonymous peer.
    #[must_use]
    pub fn from_peer_chain(chain: Option<&[impl AsRef<[u8]>]>) -> Self {
        let Some(leaf) = chain.and_then(<[_]>::first) else {
            return Self::anonymous();
        };
        match CertIdentity::from_der(leaf.as_ref()) {
            Ok(cert) => Self::verified(cert),
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable peer certificate, treating peer as anonymous");
                Self::anonymous()
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Extract the CN attribute from the subject DN.
fn extract_cn(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned)
}

/// Extract SAN URI entries from the certificate extensions.
fn extract_san_uris(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut uris = Vec::new();

    if let Ok(Some(san_ext)) = cert.subject_alternative_name() {
        for name in &san_ext.value.general_names {
            if let GeneralName::URI(uri) = name {
                uris.push((*uri).to_owned());
            }
        }
    }

    uris
}

/// Prefers the SPIFFE URI if present, then CN, then `"<unknown>"`.
fn build_display_name(cn: Option<&String>, san_uris: &[String]) -> String {
    san_uris
        .iter()
        .find(|u| u.starts_with("spiffe://"))
        .map(String::as_str)
        .or_else(|| cn.map(String::as_str))
        .unwrap_or("<unknown>")
        .to_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

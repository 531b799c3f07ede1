//! Audit records for rejected requests.
//!
//! The gate emits exactly one [`AuditEvent`] per rejection and none on
//! allow. Where events go is decided by an [`AuditSink`]; the default
//! [`TracingAuditSink`] writes them as `tracing` ERROR events.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `rbac.unauthenticated` | No verified client certificate / empty CN |
//! | `rbac.role_not_found` | The certificate's role is not in the policy |
//! | `rbac.permission_denied` | The role lacks the operation on the resource |

use serde::Serialize;

/// Why a request was rejected.
///
/// Serializes to the same string as [`AuditKind::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditKind {
    /// No identity could be extracted.
    #[serde(rename = "rbac.unauthenticated")]
    Unauthenticated,
    /// Identity present, role unknown.
    #[serde(rename = "rbac.role_not_found")]
    RoleNotFound,
    /// Role known, operation not granted.
    #[serde(rename = "rbac.permission_denied")]
    PermissionDenied,
}

impl AuditKind {
    /// Event type string (e.g. `"rbac.permission_denied"`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "rbac.unauthenticated",
            Self::RoleNotFound => "rbac.role_not_found",
            Self::PermissionDenied => "rbac.permission_denied",
        }
    }

    fn message(self) -> &'static str {
        match self {
            Self::Unauthenticated => "No CN in client certificate",
            Self::RoleNotFound => "Role not found in policy",
            Self::PermissionDenied => "No permission",
        }
    }
}

/// Structured audit record for one rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    /// What happened.
    pub event: AuditKind,
    /// Severity of the record. Rejections are always `"error"`.
    pub severity: &'static str,
    /// Human-readable summary.
    pub message: &'static str,
    /// HTTP method of the request.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Client role, when an identity was extracted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
}

impl AuditEvent {
    fn new(event: AuditKind, method: &str, path: &str, client: Option<&str>) -> Self {
        Self {
            event,
            severity: "error",
            message: event.message(),
            method: method.to_owned(),
            path: path.to_owned(),
            client: client.map(str::to_owned),
        }
    }

    /// No identity on the request.
    #[must_use]
    pub fn unauthenticated(method: &str, path: &str) -> Self {
        Self::new(AuditKind::Unauthenticated, method, path, None)
    }

    /// Identity whose role is not defined.
    #[must_use]
    pub fn role_not_found(client: &str, method: &str, path: &str) -> Self {
        Self::new(AuditKind::RoleNotFound, method, path, Some(client))
    }

    /// Role without the requested permission.
    #[must_use]
    pub fn permission_denied(client: &str, method: &str, path: &str) -> Self {
        Self::new(AuditKind::PermissionDenied, method, path, Some(client))
    }
}

/// Destination for audit records.
///
/// Implementations must be cheap and must not fail the request; they are
/// called inline on the request path.
pub trait AuditSink: Send + Sync {
    /// Record one event.
    fn record(&self, event: &AuditEvent);
}

/// Writes audit events through `tracing` at ERROR level.
///
/// The record is emitted both as individual fields and as a JSON blob in the
/// `audit` field, so log aggregators can pick either:
///
/// ```text
/// ERROR mtls_rbac::rbac::audit: No permission event="rbac.permission_denied" client="api2" method="DELETE" path="/users" audit={...}
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        let audit = serde_json::to_string(event).unwrap_or_default();
        tracing::error!(
            event = event.event.as_str(),
            client = event.client.as_deref().unwrap_or(""),
            method = %event.method,
            path = %event.path,
            audit = %audit,
            "{}",
            event.message
        );
    }
}

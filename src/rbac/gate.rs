//! Request gate: identity → decision → forward or reject.
//!
//! The gate is framework-agnostic. An adapter (see
//! [`crate::server::middleware`]) builds a [`RequestContext`] from its
//! request type, calls [`Gate::evaluate`], and maps the [`GateOutcome`] onto
//! its own response type.
//!
//! Per request, terminal on the first rejection:
//!
//! 1. No identity → audit, 401.
//! 2. Unknown role → audit, 403.
//! 3. Role lacks the operation → audit, 403.
//! 4. Otherwise → forward, no audit.
//!
//! Cases 2 and 3 look the same to the client; only the audit record tells
//! them apart.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::rbac::audit::{AuditEvent, AuditSink};
use crate::rbac::engine::check_permission;
use crate::rbac::identity::{CertIdentity, extract_role};
use crate::rbac::live::LivePolicy;
use crate::rbac::policy::Policy;

/// The parts of a request the gate looks at.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    /// Operation (HTTP method).
    pub method: &'a str,
    /// Resource (URL path, without query string).
    pub path: &'a str,
    /// Verified peer certificate identity, if the client presented one.
    pub peer: Option<&'a CertIdentity>,
}

/// Why the gate rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No identity could be extracted (401).
    Unauthenticated,
    /// The identity's role is not defined (403).
    RoleNotFound,
    /// The role lacks the operation on the resource (403).
    PermissionDenied,
}

impl Rejection {
    /// HTTP status code for this rejection.
    #[must_use]
    pub fn status(self) -> u16 {
        match self {
            Self::Unauthenticated => 401,
            Self::RoleNotFound | Self::PermissionDenied => 403,
        }
    }

    /// Client-facing error text. Does not distinguish the two 403 causes.
    #[must_use]
    pub fn public_message(self) -> &'static str {
        match self {
            Self::Unauthenticated => "Unauthorized",
            Self::RoleNotFound | Self::PermissionDenied => "Forbidden",
        }
    }
}

/// Result of [`Gate::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Pass the request on unchanged.
    Forward {
        /// Role that was authorized.
        role: String,
    },
    /// Terminate the request.
    Reject(Rejection),
}

impl GateOutcome {
    /// Returns `true` for [`GateOutcome::Forward`].
    #[must_use]
    pub fn is_forward(&self) -> bool {
        matches!(self, Self::Forward { .. })
    }
}

/// RBAC request gate.
///
/// Cheap to share (`Arc<Gate>`) across concurrent requests; it never mutates
/// the policy. Each evaluation works on a single policy snapshot.
#[derive(Clone)]
pub struct Gate {
    policy: Arc<LivePolicy>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl Gate {
    /// Gate over a fixed policy, without an audit sink.
    #[must_use]
    pub fn new(policy: Policy) -> Self {
        Self::with_live_policy(Arc::new(LivePolicy::new(policy)))
    }

    /// Gate over a policy that may be swapped by a reloader.
    #[must_use]
    pub fn with_live_policy(policy: Arc<LivePolicy>) -> Self {
        Self {
            policy,
            audit: None,
        }
    }

    /// Send audit records for rejections to `sink`.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Handle to the live policy, for wiring up a reloader.
    #[must_use]
    pub fn live_policy(&self) -> &Arc<LivePolicy> {
        &self.policy
    }

    /// Decide one request.
    pub fn evaluate(&self, ctx: &RequestContext<'_>) -> GateOutcome {
        let role = extract_role(ctx.peer);
        if role.is_empty() {
            self.audit(&AuditEvent::unauthenticated(ctx.method, ctx.path));
            return GateOutcome::Reject(Rejection::Unauthenticated);
        }

        let policy = self.policy.get();
        match check_permission(&policy, &role, ctx.path, ctx.method) {
            Ok(true) => {
                debug!(client = %role, method = %ctx.method, path = %ctx.path, "Request authorized");
                GateOutcome::Forward { role }
            }
            Ok(false) => {
                self.audit(&AuditEvent::permission_denied(&role, ctx.method, ctx.path));
                GateOutcome::Reject(Rejection::PermissionDenied)
            }
            Err(_) => {
                self.audit(&AuditEvent::role_not_found(&role, ctx.method, ctx.path));
                GateOutcome::Reject(Rejection::RoleNotFound)
            }
        }
    }

    fn audit(&self, event: &AuditEvent) {
        if let Some(sink) = &self.audit {
            sink.record(event);
        }
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("roles", &self.policy.get().len())
            .field("audit", &self.audit.is_some())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

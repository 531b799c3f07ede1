//! Role-based access control for mTLS clients.
//!
//! # Architecture
//!
//! ```text
//! TLS handshake (rustls verifies the client cert against the CA)
//!   → PeerIdentity attached to request extensions
//!   → Gate::evaluate
//!       → extract_role        (subject CN, lower-cased)
//!       → check_permission    (role → resource → operation)
//!       → AuditSink::record   (rejections only)
//!   → forward | 401 | 403
//! ```
//!
//! # Modules
//!
//! - [`policy`]: `Policy` / `Role` model and its JSON/YAML document codec
//! - [`engine`]: the permission check and the `RoleNotFound` signal
//! - [`identity`]: X.509 field extraction (`CertIdentity`, `PeerIdentity`)
//! - [`audit`]: audit records and the `AuditSink` capability
//! - [`live`]: atomically swappable policy and file hot-reload
//! - [`gate`]: the framework-agnostic request gate

pub mod audit;
pub mod engine;
pub mod gate;
pub mod identity;
pub mod live;
pub mod policy;

pub use audit::{AuditEvent, AuditKind, AuditSink, TracingAuditSink};
pub use engine::{RoleNotFound, check_permission};
pub use gate::{Gate, GateOutcome, Rejection, RequestContext};
pub use identity::{CertIdentity, PeerIdentity, extract_role};
pub use live::{LivePolicy, PolicyWatcher, reload_policy};
pub use policy::{Policy, PolicyFormat, ResourcePermissions, Role, WILDCARD_OPERATION};

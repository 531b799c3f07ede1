//! Permission check.
//!
//! Evaluates `(role, resource, operation)` against a [`Policy`]:
//!
//! 1. Unknown (or empty) role → [`RoleNotFound`].
//! 2. Resource not listed for the role → denied.
//! 3. `operation` listed verbatim, or `"*"` listed → allowed.
//! 4. Otherwise → denied.
//!
//! Matching is a membership test, so the order of the operation list never
//! changes the outcome. Comparison is case-sensitive.

use thiserror::Error;

use crate::rbac::policy::{Policy, WILDCARD_OPERATION};

/// The requested role is not defined in the policy.
///
/// This is a decision signal, not a fault: it always means "deny", and is
/// kept apart from an ordinary denial so callers can audit it differently.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("role not found: '{role}'")]
pub struct RoleNotFound {
    /// The role that was looked up
    pub role: String,
}

/// Check whether `role` may perform `operation` on `resource`.
///
/// Returns `Ok(true)` when allowed, `Ok(false)` when denied, and
/// `Err(RoleNotFound)` when `role` is empty or undefined.
pub fn check_permission(
    policy: &Policy,
    role: &str,
    resource: &str,
    operation: &str,
) -> Result<bool, RoleNotFound> {
    // An empty identity never matches, even a literal "" key in the document.
    let found = if role.is_empty() {
        None
    } else {
        policy.role(role)
    };
    let Some(found) = found else {
        return Err(RoleNotFound {
            role: role.to_owned(),
        });
    };

    let Some(operations) = found.permissions().operations(resource) else {
        return Ok(false);
    };

    Ok(operations
        .iter()
        .any(|op| op == operation || op == WILDCARD_OPERATION))
}

impl Policy {
    /// See [`check_permission`].
    pub fn check_permission(
        &self,
        role: &str,
        resource: &str,
        operation: &str,
    ) -> Result<bool, RoleNotFound> {
        check_permission(self, role, resource, operation)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

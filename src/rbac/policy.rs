//! Policy model and document codec.
//!
//! A policy maps role names to the operations each role may perform on each
//! resource:
//!
//! ```json
//! {
//!   "roles": {
//!     "api1": { "permissions": { "/users": ["GET", "PUT"], "/products": ["*"] } },
//!     "auditor": { "permissions": {} }
//!   }
//! }
//! ```
//!
//! Operations are compared case-sensitively. The token `"*"` grants every
//! operation on the resource it is listed under, and nothing else.
//!
//! A [`Policy`] is immutable once built. Reloading replaces the whole value
//! (see [`crate::rbac::LivePolicy`]).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Operation token granting every operation on a single resource.
pub const WILDCARD_OPERATION: &str = "*";

// ─────────────────────────────────────────────────────────────────────────────
// Document format
// ─────────────────────────────────────────────────────────────────────────────

/// Encoding of a policy document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyFormat {
    /// JSON (the canonical format)
    #[default]
    Json,
    /// YAML with the same shape as the JSON document
    Yaml,
}

impl PolicyFormat {
    /// Pick the format from a file extension: `.yaml` / `.yml` are YAML,
    /// anything else is JSON.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Self::Yaml
            }
            _ => Self::Json,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Model
// ─────────────────────────────────────────────────────────────────────────────

/// Resource identifier → permitted operations.
///
/// Lookup is by exact resource identifier; there is no prefix or glob
/// matching. A resource that is absent is fully denied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourcePermissions(BTreeMap<String, Vec<String>>);

impl ResourcePermissions {
    /// Operations listed for `resource`, if the resource is present.
    #[must_use]
    pub fn operations(&self, resource: &str) -> Option<&[String]> {
        self.0.get(resource).map(Vec::as_slice)
    }

    /// Iterate over `(resource, operations)` pairs in resource order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(r, ops)| (r.as_str(), ops.as_slice()))
    }

    /// Number of resources with an entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when no resource is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A named role owning exactly one permission set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Per-resource operations. A missing `permissions` key decodes as empty.
    #[serde(default)]
    permissions: ResourcePermissions,
}

impl Role {
    /// A role that grants nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `operations` on `resource`, replacing any previous entry.
    #[must_use]
    pub fn with_resource<I, S>(mut self, resource: impl Into<String>, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions
            .0
            .insert(resource.into(), operations.into_iter().map(Into::into).collect());
        self
    }

    /// The role's permission set.
    #[must_use]
    pub fn permissions(&self) -> &ResourcePermissions {
        &self.permissions
    }
}

/// Root aggregate: role name → [`Role`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    roles: BTreeMap<String, Role>,
}

impl Policy {
    /// Build a policy from `(role name, role)` pairs.
    #[must_use]
    pub fn from_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = (S, Role)>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(|(n, r)| (n.into(), r)).collect(),
        }
    }

    /// Decode a JSON policy document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PolicyParse`] when the bytes are not valid JSON or do
    /// not have the `roles.<name>.permissions.<resource> = [ops]` shape.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Self::parse_as(bytes, PolicyFormat::Json)
    }

    /// Decode a policy document in the given format.
    pub fn parse_as(bytes: &[u8], format: PolicyFormat) -> Result<Self> {
        let policy: Self = match format {
            PolicyFormat::Json => {
                serde_json::from_slice(bytes).map_err(|e| Error::PolicyParse(e.to_string()))?
            }
            PolicyFormat::Yaml => {
                serde_yaml::from_slice(bytes).map_err(|e| Error::PolicyParse(e.to_string()))?
            }
        };

        debug!(roles = policy.roles.len(), ?format, "Policy parsed");
        Ok(policy)
    }

    /// Read and decode a policy file. The format follows the extension.
    ///
    /// # Errors
    ///
    /// [`Error::PolicyIo`] if the file cannot be read, [`Error::PolicyParse`]
    /// if its contents are malformed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| Error::PolicyIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse_as(&bytes, PolicyFormat::from_path(path))
    }

    /// Pretty-printed JSON encoding. Keys are emitted in sorted order, so
    /// the output is deterministic and parses back into an equal policy.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| Error::Internal(format!("Failed to serialize policy: {e}")))
    }

    /// YAML encoding with the same shape as [`Policy::to_json`].
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| Error::Internal(format!("Failed to serialize policy: {e}")))
    }

    /// Encode in the given format.
    pub fn serialize_as(&self, format: PolicyFormat) -> Result<Vec<u8>> {
        match format {
            PolicyFormat::Json => self.to_json(),
            PolicyFormat::Yaml => self.to_yaml().map(String::into_bytes),
        }
    }

    /// Look up a role by exact name.
    #[must_use]
    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    /// Role names in sorted order.
    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    /// Number of roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns `true` when the policy defines no roles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

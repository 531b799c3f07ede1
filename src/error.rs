//! Error types for mtls-rbac

use std::io;

use thiserror::Error;

/// Result type alias for mtls-rbac
pub type Result<T> = std::result::Result<T, Error>;

/// Load-time and runtime errors.
///
/// Authorization decisions never produce an [`Error`]; an unknown role is
/// reported through [`crate::rbac::RoleNotFound`] instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Policy document could not be decoded into the expected shape
    #[error("Invalid policy document: {0}")]
    PolicyParse(String),

    /// Policy source could not be read
    #[error("Cannot read policy '{path}': {source}")]
    PolicyIo {
        /// Path of the policy source
        path: String,
        /// Underlying IO failure
        #[source]
        source: io::Error,
    },

    /// Configuration error (including TLS material)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns `true` for errors raised while loading a policy.
    #[must_use]
    pub fn is_policy_error(&self) -> bool {
        matches!(self, Self::PolicyParse(_) | Self::PolicyIo { .. })
    }
}

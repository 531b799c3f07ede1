//! mtls-rbac
//!
//! Role-based access control for HTTP clients authenticated with mutual TLS.
//! A client's verified certificate Common Name names its role; the role
//! lists the operations it may perform on each resource.
//!
//! # Features
//!
//! - **Policy documents**: JSON (or YAML) `roles.<name>.permissions.<resource> = [ops]`
//! - **Decision engine**: exact resource lookup, case-sensitive operations, `"*"` wildcard
//! - **Gate**: framework-agnostic identity → decision → forward/401/403 pipeline
//! - **Audit**: one structured record per rejected request
//! - **Hot reload**: whole-policy atomic swap on file change
//! - **Server**: axum + rustls mTLS listener with the gate as middleware

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod rbac;
pub mod server;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`. `format` selects `"json"` or
/// the default human-readable output.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}"))),
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}"))),
    }
}

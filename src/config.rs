//! Configuration management
//!
//! ```yaml
//! server:
//!   host: "0.0.0.0"
//!   port: 8443
//! tls:
//!   server_cert: "/etc/mtls-rbac/server.crt"
//!   server_key:  "/etc/mtls-rbac/server.key"
//!   ca_cert:     "/etc/mtls-rbac/ca.crt"
//!   require_client_cert: true
//! policy:
//!   path: "/etc/mtls-rbac/rbac.json"
//!   watch: true
//! audit:
//!   enabled: true
//! ```
//!
//! Every key can be overridden from the environment with the `MTLS_RBAC_`
//! prefix and `__` as the section separator, e.g. `MTLS_RBAC_SERVER__PORT=9443`.

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener configuration
    pub server: ServerConfig,
    /// TLS material and client-certificate requirements
    pub tls: TlsConfig,
    /// Policy source
    pub policy: PolicyConfig,
    /// Audit logging
    pub audit: AuditConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8443,
        }
    }
}

/// TLS configuration for the mTLS listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to the PEM-encoded server certificate chain.
    pub server_cert: String,

    /// Path to the PEM-encoded server private key.
    pub server_key: String,

    /// Path to the PEM-encoded CA bundle used to verify client certificates.
    pub ca_cert: String,

    /// Reject clients without a valid certificate at the handshake.
    ///
    /// When `false`, certificate-less clients complete the handshake and are
    /// answered with 401 by the gate.
    pub require_client_cert: bool,

    /// Optional PEM-encoded Certificate Revocation List.
    pub crl_path: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            server_cert: "server.crt".to_string(),
            server_key: "server.key".to_string(),
            ca_cert: "ca.crt".to_string(),
            require_client_cert: true,
            crl_path: None,
        }
    }
}

/// Policy source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Path to the policy document (`.json`, `.yaml` or `.yml`)
    pub path: String,
    /// Reload the policy when the file changes
    pub watch: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            path: "rbac.json".to_string(),
            watch: false,
        }
    }
}

/// Audit logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Emit an audit record for every rejected request
    pub enabled: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from an optional YAML file, then the environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `path` is given but missing, or if the
    /// merged values do not fit the configuration shape.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("MTLS_RBAC_").split("__"));

        figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    // Env-reading tests run inside `Jail`.

    #[test]
    fn defaults_are_strict() {
        let cfg = Config::default();
        assert_eq!(cfg.server.port, 8443);
        assert!(cfg.tls.require_client_cert);
        assert!(cfg.tls.crl_path.is_none());
        assert!(cfg.audit.enabled);
        assert!(!cfg.policy.watch);
    }

    #[test]
    fn load_without_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let cfg = Config::load(None).unwrap();
            assert_eq!(cfg.policy.path, "rbac.json");
            Ok(())
        });
    }

    #[test]
    fn load_missing_file_fails() {
        let err = Config::load(Some(Path::new("/nonexistent/config.yaml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn load_reads_yaml_sections() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                "server:\n  port: 9443\ntls:\n  require_client_cert: false\npolicy:\n  path: /etc/rbac.yaml\n  watch: true\n",
            )?;

            let cfg = Config::load(Some(Path::new("config.yaml"))).unwrap();
            assert_eq!(cfg.server.port, 9443);
            assert_eq!(cfg.server.host, "0.0.0.0");
            assert!(!cfg.tls.require_client_cert);
            assert_eq!(cfg.policy.path, "/etc/rbac.yaml");
            assert!(cfg.policy.watch);
            assert!(cfg.audit.enabled);
            Ok(())
        });
    }

    #[test]
    fn load_rejects_wrong_types() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "server:\n  port: not-a-port\n")?;

            assert!(Config::load(Some(Path::new("config.yaml"))).is_err());
            Ok(())
        });
    }

    #[test]
    fn env_overrides_nested_keys() {
        Jail::expect_with(|jail| {
            // GIVEN: a file value and an env override for the same key
            jail.create_file("config.yaml", "policy:\n  path: /from/file.json\n")?;
            jail.set_env("MTLS_RBAC_POLICY__PATH", "/from/env.json");
            jail.set_env("MTLS_RBAC_SERVER__PORT", "9443");

            // WHEN
            let cfg = Config::load(Some(Path::new("config.yaml"))).unwrap();

            // THEN: env wins
            assert_eq!(cfg.policy.path, "/from/env.json");
            assert_eq!(cfg.server.port, 9443);
            Ok(())
        });
    }

    #[test]
    fn cli_flag_env_vars_do_not_break_loading() {
        use clap::Parser;

        use crate::cli::Cli;

        Jail::expect_with(|jail| {
            // GIVEN: every env var the CLI flags read is set
            jail.set_env("MTLS_RBAC_POLICY_PATH", "/etc/rbac.json");
            jail.set_env("MTLS_RBAC_PORT", "9443");
            jail.set_env("MTLS_RBAC_HOST", "127.0.0.1");
            jail.set_env("MTLS_RBAC_LOG_LEVEL", "debug");
            jail.set_env("MTLS_RBAC_LOG_FORMAT", "json");

            // WHEN: the CLI and the config are both read
            let cli = Cli::try_parse_from(["mtls-rbac"]).unwrap();
            let cfg = Config::load(None).unwrap();

            // THEN: the flags pick up their values and the config keeps its
            // own section defaults
            assert_eq!(cli.policy.as_deref(), Some(Path::new("/etc/rbac.json")));
            assert_eq!(cli.port, Some(9443));
            assert_eq!(cfg.policy.path, "rbac.json");
            assert_eq!(cfg.server.port, 8443);
            Ok(())
        });
    }
}

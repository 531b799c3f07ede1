//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::rbac::PolicyFormat;

/// mTLS RBAC server - certificate CN to role to permission
#[derive(Parser, Debug)]
#[command(name = "mtls-rbac")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "MTLS_RBAC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "MTLS_RBAC_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "MTLS_RBAC_HOST")]
    pub host: Option<String>,

    /// Policy document (overrides `policy.path`)
    #[arg(long, env = "MTLS_RBAC_POLICY_PATH")]
    pub policy: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "MTLS_RBAC_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "MTLS_RBAC_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the mTLS server (default)
    Serve,

    /// Policy document tools
    #[command(subcommand)]
    Policy(PolicyCommand),
}

/// Policy subcommands
#[derive(Subcommand, Debug)]
pub enum PolicyCommand {
    /// Parse a policy document and report its roles
    Check {
        /// Path to policy file (JSON or YAML)
        #[arg(required = true)]
        file: PathBuf,

        /// Print the normalized document
        #[arg(long)]
        print: bool,

        /// Output format for --print
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Evaluate a single permission check
    Eval {
        /// Path to policy file (JSON or YAML)
        #[arg(required = true)]
        file: PathBuf,

        /// Role name (as extracted from a certificate CN)
        #[arg(long)]
        role: String,

        /// Resource identifier, e.g. `/users`
        #[arg(long)]
        resource: String,

        /// Operation, e.g. `GET`
        #[arg(long)]
        operation: String,
    },
}

/// Serialization format for `policy check --print`
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// YAML
    Yaml,
}

impl From<OutputFormat> for PolicyFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => Self::Json,
            OutputFormat::Yaml => Self::Yaml,
        }
    }
}

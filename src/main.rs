//! mtls-rbac - mTLS client certificates mapped to RBAC decisions.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use mtls_rbac::{
    cli::{Cli, Command, PolicyCommand},
    config::Config,
    rbac::{Policy, PolicyFormat},
    server, setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::Policy(policy_cmd)) => run_policy_command(&policy_cmd),
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Run policy tooling commands
fn run_policy_command(cmd: &PolicyCommand) -> ExitCode {
    match cmd {
        PolicyCommand::Check {
            file,
            print,
            format,
        } => {
            let Some(policy) = load_policy(file) else {
                return ExitCode::FAILURE;
            };

            if *print {
                match policy.serialize_as(PolicyFormat::from(*format)) {
                    Ok(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
                    Err(e) => {
                        eprintln!("❌ Failed to serialize: {e}");
                        return ExitCode::FAILURE;
                    }
                }
                return ExitCode::SUCCESS;
            }

            println!("✅ {} - valid ({} roles)", file.display(), policy.len());
            for name in policy.role_names() {
                let resources = policy
                    .role(name)
                    .map_or(0, |role| role.permissions().len());
                println!("  {name} - {resources} resource(s)");
            }
            ExitCode::SUCCESS
        }

        PolicyCommand::Eval {
            file,
            role,
            resource,
            operation,
        } => {
            let Some(policy) = load_policy(file) else {
                return ExitCode::FAILURE;
            };

            match policy.check_permission(role, resource, operation) {
                Ok(true) => {
                    println!("allow");
                    ExitCode::SUCCESS
                }
                Ok(false) => {
                    println!("deny");
                    ExitCode::FAILURE
                }
                Err(_) => {
                    println!("deny (role not found)");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn load_policy(file: &Path) -> Option<Policy> {
    match Policy::from_file(file) {
        Ok(policy) => Some(policy),
        Err(e) => {
            eprintln!("❌ Failed to load policy: {e}");
            None
        }
    }
}

/// Run the mTLS server
async fn run_server(cli: Cli) -> ExitCode {
    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            if let Some(ref policy) = cli.policy {
                config.policy.path = policy.display().to_string();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        policy = %config.policy.path,
        "Starting mtls-rbac"
    );

    if let Err(e) = server::run(config).await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

//! mTLS HTTP server: demo routes behind the RBAC gate.

pub mod middleware;
pub mod tls;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, middleware::from_fn_with_state, routing::get};
use axum_server::{Handle, tls_rustls::RustlsConfig};
use serde_json::{Value, json};
use tokio::signal;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::rbac::{Gate, LivePolicy, Policy, PolicyWatcher, TracingAuditSink};
use crate::{Error, Result};

pub use middleware::{rbac_middleware, rejection_response};
pub use tls::{PeerIdentityAcceptor, build_tls_config, load_certs, load_private_key};

/// How long in-flight requests get to finish after a shutdown signal.
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router with every route behind the gate.
///
/// Unknown paths also pass through the gate, so a client without a grant
/// for them sees 403 rather than 404.
pub fn router(gate: Arc<Gate>) -> Router {
    Router::new()
        .route("/users", get(users_handler))
        .route("/products", get(products_handler))
        .layer(from_fn_with_state(gate, rbac_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::new()),
        )
}

async fn users_handler() -> Json<Value> {
    Json(json!({ "message": "All Users" }))
}

async fn products_handler() -> Json<Value> {
    Json(json!({ "message": "All Products" }))
}

/// Load the policy, build TLS and serve until Ctrl-C / SIGTERM.
///
/// # Errors
///
/// Returns an error if the policy or TLS material cannot be loaded, the
/// bind address is invalid, or the listener fails.
pub async fn run(config: Config) -> Result<()> {
    let host: IpAddr = config
        .server
        .host
        .parse()
        .map_err(|e| Error::Config(format!("Invalid host '{}': {e}", config.server.host)))?;
    let addr = SocketAddr::new(host, config.server.port);

    let policy = Policy::from_file(&config.policy.path)?;
    info!(
        path = %config.policy.path,
        roles = policy.len(),
        "Policy loaded"
    );
    let live = Arc::new(LivePolicy::new(policy));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Dropping the watcher stops file notifications, so keep it in scope.
    let _watcher = if config.policy.watch {
        match PolicyWatcher::start(
            PathBuf::from(&config.policy.path),
            Arc::clone(&live),
            shutdown_tx.subscribe(),
        ) {
            Ok(w) => {
                info!(path = %config.policy.path, "Policy hot-reload enabled");
                Some(w)
            }
            Err(e) => {
                warn!(error = %e, "Failed to start policy watcher; hot-reload disabled");
                None
            }
        }
    } else {
        None
    };

    let mut gate = Gate::with_live_policy(live);
    if config.audit.enabled {
        gate = gate.with_audit_sink(Arc::new(TracingAuditSink));
    }
    let app = router(Arc::new(gate));

    let tls_config = build_tls_config(&config.tls)?;
    let acceptor = PeerIdentityAcceptor::new(RustlsConfig::from_config(Arc::new(tls_config)));

    let handle = Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_handle.graceful_shutdown(Some(GRACEFUL_SHUTDOWN_TIMEOUT));
        let _ = shutdown_tx.send(());
    });

    info!(
        address = %addr,
        require_client_cert = config.tls.require_client_cert,
        audit = config.audit.enabled,
        "mTLS server listening"
    );

    axum_server::bind(addr)
        .acceptor(acceptor)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

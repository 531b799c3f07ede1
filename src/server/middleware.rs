//! Axum adapter for the RBAC [`Gate`].
//!
//! The TLS acceptor attaches a [`PeerIdentity`] to every request; this
//! middleware hands the method, path and peer certificate to the gate and
//! either forwards the request untouched or answers 401/403.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::rbac::{Gate, GateOutcome, PeerIdentity, Rejection, RequestContext};

/// RBAC middleware, for use with `axum::middleware::from_fn_with_state`.
///
/// Requests without a `PeerIdentity` extension (no TLS acceptor in front)
/// are treated as unauthenticated.
pub async fn rbac_middleware(
    State(gate): State<Arc<Gate>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let outcome = {
        let peer = request
            .extensions()
            .get::<PeerIdentity>()
            .and_then(|p| p.cert.as_ref());

        gate.evaluate(&RequestContext {
            method: request.method().as_str(),
            path: request.uri().path(),
            peer,
        })
    };

    match outcome {
        GateOutcome::Forward { .. } => next.run(request).await,
        GateOutcome::Reject(rejection) => rejection_response(rejection),
    }
}

/// Build the 401/403 response for a rejection.
///
/// The body never says which of the two 403 causes applied.
pub fn rejection_response(rejection: Rejection) -> Response {
    let status = match rejection {
        Rejection::Unauthenticated => StatusCode::UNAUTHORIZED,
        Rejection::RoleNotFound | Rejection::PermissionDenied => StatusCode::FORBIDDEN,
    };

    (status, Json(json!({ "error": rejection.public_message() }))).into_response()
}

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Bearer authentication middleware.
//!
//! Resolves the credential through the principal verifier, admits only
//! emails on the organizational domain allow-list, and upserts the
//! caller's profile before handing the verified principal to handlers.

use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::warn;

use crate::auth::email_in_allowed_domain;

use super::handlers::json_error;
use super::AppState;

pub(crate) async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    // /health is exempt (liveness probing only).
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return json_error(StatusCode::UNAUTHORIZED, "bearer credential required")
            .into_response();
    };

    let principal = match state.verifier.verify(token).await {
        Ok(principal) => principal,
        Err(e) => {
            return json_error(StatusCode::UNAUTHORIZED, &e.to_string()).into_response();
        }
    };

    if !email_in_allowed_domain(&principal.email, &state.allowed_domains) {
        return json_error(
            StatusCode::FORBIDDEN,
            "account is not part of this community",
        )
        .into_response();
    }

    // Profile projection is refreshed on every successful
    // authentication; a failure here is logged but does not block the
    // request.
    if let Err(e) = state.coordinator.store().upsert_user(&principal).await {
        warn!("failed to upsert user profile: {e}");
    }

    request.extensions_mut().insert(principal);
    next.run(request).await
}

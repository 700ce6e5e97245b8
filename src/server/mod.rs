#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! HTTP/JSON surface for the lifecycle engine.
//!
//! Stable contract consumed by the mobile client:
//! - GET  /health                            - liveness (unauthenticated)
//! - GET  /api/fetch?lat=&lon=               - visible requests with distance/ETA
//! - POST /api/create                        - create a moderated request
//! - GET  /api/requests/{id}                 - audit fetch by id
//! - POST /api/requests/{id}/offer-help      - pledge help
//! - POST /api/requests/{id}/accept-helper   - author accepts a helper
//! - PUT/POST /api/requests/{id}/status      - author-driven status change
//!
//! All authenticated routes require a bearer credential resolved to an
//! email on the organizational domain allow-list.

mod handlers;
mod middleware;

use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::auth::PrincipalVerifier;
use crate::coordinator::Coordinator;
use crate::error::{NeighborlyError, Result};

use self::handlers::{
    handle_accept_helper, handle_create, handle_fetch, handle_get_request, handle_health,
    handle_not_found, handle_offer_help, handle_set_status,
};
use self::middleware::auth_middleware;

pub struct AppState {
    pub coordinator: Coordinator,
    pub verifier: Arc<dyn PrincipalVerifier>,
    pub allowed_domains: Vec<String>,
}

/// Build the application router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/fetch", get(handle_fetch))
        .route("/api/create", post(handle_create))
        .route("/api/requests/{id}", get(handle_get_request))
        .route("/api/requests/{id}/offer-help", post(handle_offer_help))
        .route(
            "/api/requests/{id}/accept-helper",
            post(handle_accept_helper),
        )
        .route(
            "/api/requests/{id}/status",
            post(handle_set_status).put(handle_set_status),
        )
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ))
        .layer(cors)
        .with_state(state)
}

/// Serve until interrupted.
///
/// # Errors
/// Returns a configuration error when the listener cannot bind.
pub async fn serve(state: Arc<AppState>, port: u16) -> Result<()> {
    let app = router(state);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| NeighborlyError::ConfigError(format!("Failed to bind {addr}: {e}")))?;

    info!("Neighborly engine listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| NeighborlyError::ConfigError(format!("Server error: {e}")))?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

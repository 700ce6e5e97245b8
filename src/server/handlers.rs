#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Route handlers for the HTTP/JSON surface.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::Principal;
use crate::coordinator::VISIBILITY_WINDOW_HOURS;
use crate::error::NeighborlyError;
use crate::types::{
    AcceptHelperPayload, Coordinate, CreateRequestPayload, RequestId, RequestStatus,
    StatusPayload, UserId,
};

use super::AppState;

/// Construct a JSON error response with the given status and message.
pub(crate) fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// Map an engine error onto the HTTP surface, preserving the error
/// taxonomy: validation names its fields, moderation rejection carries
/// the safety reason, forbidden stays distinct from not-found.
fn error_response(err: &NeighborlyError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = match err {
        NeighborlyError::Validation { fields } => serde_json::json!({
            "error": err.code(),
            "message": err.to_string(),
            "fields": fields,
        }),
        NeighborlyError::ModerationRejected { reason } => serde_json::json!({
            "error": err.code(),
            "safe": false,
            "reason": reason,
        }),
        NeighborlyError::InvalidTransition { from, to } => serde_json::json!({
            "error": err.code(),
            "message": err.to_string(),
            "from": from,
            "to": to,
        }),
        _ => serde_json::json!({
            "error": err.code(),
            "message": err.to_string(),
        }),
    };
    (status, Json(body)).into_response()
}

pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health, unauthenticated liveness probe.
pub(crate) async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = state.coordinator.store();
    let cutoff = Utc::now() - Duration::hours(VISIBILITY_WINDOW_HOURS);
    let active = store.active_count(cutoff).await;
    let body = serde_json::json!({
        "status": "ok",
        "store_mode": store.mode().as_str(),
        "store_reachable": active.is_ok(),
        "active_requests": active.unwrap_or(0),
    });
    (StatusCode::OK, Json(body))
}

#[derive(Debug, Deserialize)]
pub(crate) struct FetchQuery {
    lat: Option<f64>,
    lon: Option<f64>,
}

/// GET /api/fetch?lat=&lon=
pub(crate) async fn handle_fetch(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<FetchQuery>,
) -> Response {
    let origin = Coordinate::parse(query.lat, query.lon).ok();
    match state.coordinator.list_active(&principal, origin).await {
        Ok(requests) => (StatusCode::OK, Json(requests)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /api/create
pub(crate) async fn handle_create(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CreateRequestPayload>,
) -> Response {
    match state.coordinator.create_request(&principal, payload).await {
        Ok(request) => (StatusCode::CREATED, Json(request)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/requests/{id}, audit fetch by id.
pub(crate) async fn handle_get_request(
    State(state): State<Arc<AppState>>,
    Extension(_principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Response {
    match state.coordinator.request_by_id(&RequestId::new(id)).await {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /api/requests/{id}/offer-help
pub(crate) async fn handle_offer_help(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Response {
    match state
        .coordinator
        .offer_help(&principal, &RequestId::new(id))
        .await
    {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /api/requests/{id}/accept-helper
pub(crate) async fn handle_accept_helper(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(payload): Json<AcceptHelperPayload>,
) -> Response {
    match state
        .coordinator
        .accept_helper(
            &principal,
            &RequestId::new(id),
            &UserId::new(payload.helper_id),
        )
        .await
    {
        Ok(offer) => (StatusCode::OK, Json(offer)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// PUT/POST /api/requests/{id}/status
pub(crate) async fn handle_set_status(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(payload): Json<StatusPayload>,
) -> Response {
    let Ok(status) = RequestStatus::try_from(payload.status.as_str()) else {
        return error_response(&NeighborlyError::Validation {
            fields: vec!["status".to_string()],
        });
    };
    match state
        .coordinator
        .set_status(&principal, &RequestId::new(id), status)
        .await
    {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(e) => error_response(&e),
    }
}

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use feedback_core::models::OkResponse;
use tracing::warn;

use super::AppState;
use super::errors::error_response;

pub(super) async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(OkResponse { ok: true }))
}

pub(super) async fn readyz(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(OkResponse { ok: true })).into_response(),
        Err(err) => {
            warn!("readiness check failed: {err}");
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "db_unavailable",
                "Database not ready",
            )
        }
    }
}

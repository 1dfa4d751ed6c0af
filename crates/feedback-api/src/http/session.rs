use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use feedback_core::config::SessionConfig;
use feedback_core::models::OkResponse;
use feedback_core::session::generate_session_id;
use serde::Deserialize;
use tracing::info;

use super::AppState;
use super::errors::bad_request_response;

#[derive(Debug, Deserialize)]
pub(super) struct SetSessionRequest {
    session_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateSessionRequest {
    #[serde(default)]
    prefix: Option<String>,
}

pub(super) async fn get_session(State(state): State<AppState>) -> Response {
    (StatusCode::OK, Json(current_session(&state))).into_response()
}

pub(super) async fn set_session(
    State(state): State<AppState>,
    Json(req): Json<SetSessionRequest>,
) -> Response {
    match state.resolver.set_session_id(&req.session_id) {
        Ok(session_id) => {
            info!(session_id = %session_id, "session id updated");
            (StatusCode::OK, Json(current_session(&state))).into_response()
        }
        Err(err) => bad_request_response("invalid_session_id", &err.to_string()),
    }
}

// The body is optional; an empty POST generates an unprefixed id.
pub(super) async fn generate_session(State(state): State<AppState>, body: Bytes) -> Response {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        GenerateSessionRequest::default()
    } else {
        match serde_json::from_slice::<GenerateSessionRequest>(&body) {
            Ok(req) => req,
            Err(err) => return bad_request_response("invalid_request", &err.to_string()),
        }
    };

    let session_id = generate_session_id(req.prefix.as_deref());
    match state.resolver.set_session_id(&session_id) {
        Ok(session_id) => {
            info!(session_id = %session_id, "session id generated");
            (StatusCode::CREATED, Json(current_session(&state))).into_response()
        }
        Err(err) => bad_request_response("invalid_session_id", &err.to_string()),
    }
}

pub(super) async fn clear_session(State(state): State<AppState>) -> Response {
    state.resolver.clear_session_id();
    (StatusCode::OK, Json(OkResponse { ok: true })).into_response()
}

fn current_session(state: &AppState) -> SessionConfig {
    SessionConfig {
        session_id: state.resolver.resolve_session_id(),
        ..state.session.clone()
    }
}

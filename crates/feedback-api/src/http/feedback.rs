use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use feedback_core::models::{
    CreateFeedbackRequest, CreateFeedbackResponse, FeedbackQuery, ListFeedbackResponse,
};
use tracing::info;

use super::AppState;
use super::errors::{bad_request_response, store_error_response};

pub(super) async fn create_feedback(
    State(state): State<AppState>,
    Json(req): Json<CreateFeedbackRequest>,
) -> Response {
    let session_id = state.resolver.resolve_session_id();
    let record = match req.into_feedback(&session_id) {
        Ok(record) => record,
        Err(err) => return bad_request_response(err.code(), &err.to_string()),
    };

    match state.store.insert_feedback(&record).await {
        Ok(id) => {
            info!(
                feedback_id = %id,
                presentation_id = %record.presentation_id,
                feedback_type = record.feedback_type.as_str(),
                "feedback stored"
            );
            (StatusCode::CREATED, Json(CreateFeedbackResponse { id })).into_response()
        }
        Err(err) => store_error_response(err),
    }
}

pub(super) async fn list_feedback(
    State(state): State<AppState>,
    Query(filters): Query<FeedbackQuery>,
) -> Response {
    match state.store.query_feedback(&filters).await {
        Ok(items) => (StatusCode::OK, Json(ListFeedbackResponse { items })).into_response(),
        Err(err) => store_error_response(err),
    }
}

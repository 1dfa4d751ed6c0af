use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use feedback_core::conversation::{
    CompletedConversation, ConversationError, ConversationThread, FeedbackTarget, TerminalReason,
    TurnOutcome, completion_message, finalize_feedback, is_completion_phrase,
};
use feedback_core::models::{FeedbackValidationError, MAX_RESPONSE_TEXT_CHARS};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use super::AppState;
use super::errors::{bad_request_response, error_response};

/// One reviewer answer. The first turn supplies `question` (and optionally
/// `context_summary`); later turns echo back the `thread` from the previous
/// response.
#[derive(Debug, Deserialize)]
pub(super) struct TurnRequest {
    #[serde(default)]
    thread: Option<ConversationThread>,
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    context_summary: Option<String>,
    answer: String,
    feedback: FeedbackTarget,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(super) enum TurnResponse {
    FollowUp {
        question: String,
        thread: ConversationThread,
    },
    Complete {
        reason: TerminalReason,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        feedback_id: Option<Uuid>,
    },
}

pub(super) async fn submit_turn(
    State(state): State<AppState>,
    Json(req): Json<TurnRequest>,
) -> Response {
    let max_follow_ups = state.follow_ups.max_follow_ups;
    let thread = match (req.thread, req.question) {
        (Some(mut thread), _) => {
            thread.cap_follow_ups(max_follow_ups);
            thread
        }
        (None, Some(question)) if !question.trim().is_empty() => {
            ConversationThread::new(question, req.context_summary, max_follow_ups)
        }
        _ => {
            return bad_request_response(
                "missing_field",
                "either thread or question must be provided",
            );
        }
    };

    // Every answer ends up in the persisted transcript; refuse one that
    // would push it past what the store accepts.
    if thread.transcript_chars_with(&req.answer) > MAX_RESPONSE_TEXT_CHARS {
        let err = FeedbackValidationError::ResponseTooLong {
            max_chars: MAX_RESPONSE_TEXT_CHARS,
        };
        return bad_request_response(err.code(), &err.to_string());
    }

    let session_id = state.resolver.resolve_session_id();
    let outcome = if is_completion_phrase(&req.answer, &state.follow_ups.completion_phrases) {
        state
            .controller
            .close_by_reviewer(&thread, &req.answer)
            .map(TurnOutcome::Complete)
    } else {
        state
            .controller
            .submit_answer_as(&thread, &req.answer, &session_id)
            .await
    };

    match outcome {
        Ok(TurnOutcome::FollowUp { question, thread }) => (
            StatusCode::OK,
            Json(TurnResponse::FollowUp { question, thread }),
        )
            .into_response(),
        Ok(TurnOutcome::Complete(completed)) => {
            let feedback_id =
                persist_completed(&state, &completed, &req.feedback, &session_id).await;
            (
                StatusCode::OK,
                Json(TurnResponse::Complete {
                    reason: completed.reason,
                    message: completion_message(completed.reason).to_string(),
                    feedback_id,
                }),
            )
                .into_response()
        }
        Ok(TurnOutcome::Cancelled) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "turn_cancelled",
            "The follow-up turn was cancelled",
        ),
        Err(ConversationError::AlreadyTerminal(_)) => error_response(
            StatusCode::CONFLICT,
            "conversation_complete",
            "This conversation has already ended",
        ),
        Err(ConversationError::EmptyAnswer) => {
            bad_request_response("empty_answer", "answer must not be empty")
        }
    }
}

// A failed write is logged; the reviewer still gets the acknowledgment.
async fn persist_completed(
    state: &AppState,
    completed: &CompletedConversation,
    target: &FeedbackTarget,
    session_id: &str,
) -> Option<Uuid> {
    let record = finalize_feedback(completed, target, session_id);
    if let Err(err) = record.validate() {
        error!(
            presentation_id = %target.presentation_id,
            slide_id = %target.slide_id,
            "finalized feedback failed validation: {err}"
        );
        return None;
    }

    match state.store.insert_feedback(&record).await {
        Ok(id) => {
            info!(
                feedback_id = %id,
                reason = completed.reason.as_str(),
                turns = completed.thread.user_turns(),
                "conversation feedback stored"
            );
            Some(id)
        }
        Err(err) => {
            error!(
                presentation_id = %target.presentation_id,
                slide_id = %target.slide_id,
                "conversation feedback not stored: {err}"
            );
            None
        }
    }
}

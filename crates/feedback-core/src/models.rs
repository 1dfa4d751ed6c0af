use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::conversation::{ConversationMessage, TerminalReason};
use crate::question_hash::{hash_question, is_question_hash};
use crate::session::is_valid_session_id;

pub const MAX_RESPONSE_TEXT_CHARS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Text,
    Rating,
    Choice,
    Conversation,
}

impl FeedbackType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Rating => "rating",
            Self::Choice => "choice",
            Self::Conversation => "conversation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "rating" => Some(Self::Rating),
            "choice" => Some(Self::Choice),
            "conversation" => Some(Self::Conversation),
            _ => None,
        }
    }
}

/// The persisted unit. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub presentation_id: String,
    pub slide_id: String,
    pub feedback_type: FeedbackType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_id: Option<String>,
    pub session_id: String,
    pub question_hash: String,
    pub response_text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<Vec<ConversationMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_reason: Option<TerminalReason>,
}

impl Feedback {
    pub fn validate(&self) -> Result<(), FeedbackValidationError> {
        if self.presentation_id.trim().is_empty() {
            return Err(FeedbackValidationError::MissingField("presentation_id"));
        }
        if self.slide_id.trim().is_empty() {
            return Err(FeedbackValidationError::MissingField("slide_id"));
        }
        if self.response_text.trim().is_empty() {
            return Err(FeedbackValidationError::MissingField("response_text"));
        }
        if self.response_text.chars().count() > MAX_RESPONSE_TEXT_CHARS {
            return Err(FeedbackValidationError::ResponseTooLong {
                max_chars: MAX_RESPONSE_TEXT_CHARS,
            });
        }
        if !is_valid_session_id(&self.session_id) {
            return Err(FeedbackValidationError::InvalidSessionId(
                self.session_id.clone(),
            ));
        }
        if !is_question_hash(&self.question_hash) {
            return Err(FeedbackValidationError::InvalidQuestionHash(
                self.question_hash.clone(),
            ));
        }
        if let Some(form_id) = &self.form_id
            && form_id.trim().is_empty()
        {
            return Err(FeedbackValidationError::MissingField("form_id"));
        }

        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedbackValidationError {
    #[error("feedback field {0} must not be empty")]
    MissingField(&'static str),
    #[error("response_text exceeds {max_chars} characters")]
    ResponseTooLong { max_chars: usize },
    #[error("invalid session id '{0}'")]
    InvalidSessionId(String),
    #[error("invalid question hash '{0}'")]
    InvalidQuestionHash(String),
}

impl FeedbackValidationError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "missing_field",
            Self::ResponseTooLong { .. } => "response_too_long",
            Self::InvalidSessionId(_) => "invalid_session_id",
            Self::InvalidQuestionHash(_) => "invalid_question_hash",
        }
    }
}

/// Inbound shape of `POST /v1/feedback`. Accepts a full [`Feedback`] as
/// sent by the client, or a looser record where the session id, question
/// hash and timestamp are filled in by the receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFeedbackRequest {
    pub presentation_id: String,
    pub slide_id: String,
    pub feedback_type: FeedbackType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub response_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<Vec<ConversationMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_reason: Option<TerminalReason>,
}

impl CreateFeedbackRequest {
    pub fn into_feedback(self, default_session_id: &str) -> Result<Feedback, FeedbackValidationError> {
        let question_hash = match (self.question_hash, self.question.as_deref()) {
            (Some(question_hash), _) => question_hash,
            (None, Some(question)) => hash_question(question),
            (None, None) => return Err(FeedbackValidationError::MissingField("question_hash")),
        };

        let record = Feedback {
            id: None,
            presentation_id: self.presentation_id,
            slide_id: self.slide_id,
            feedback_type: self.feedback_type,
            form_id: self.form_id,
            session_id: self
                .session_id
                .unwrap_or_else(|| default_session_id.to_string()),
            question_hash,
            response_text: self.response_text,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            conversation: self.conversation,
            terminal_reason: self.terminal_reason,
        };
        record.validate()?;
        Ok(record)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_type: Option<FeedbackType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmitOutcome {
    pub fn stored(id: Uuid) -> Self {
        Self {
            success: true,
            id: Some(id),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFeedbackResponse {
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListFeedbackResponse {
    pub items: Vec<Feedback>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

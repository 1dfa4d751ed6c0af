use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::conversation::{ConversationMessage, TerminalReason};
use crate::models::{Feedback, FeedbackQuery, FeedbackType};

pub const DEFAULT_QUERY_LIMIT: u32 = 100;
pub const MAX_QUERY_LIMIT: u32 = 500;

impl Store {
    pub async fn insert_feedback(&self, record: &Feedback) -> Result<Uuid, StoreError> {
        let id = record.id.unwrap_or_else(Uuid::new_v4);
        let conversation = record
            .conversation
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|err| StoreError::InvalidData(format!("conversation not encodable: {err}")))?;

        sqlx::query(
            "INSERT INTO feedback (
                id, presentation_id, slide_id, feedback_type, form_id, session_id,
                question_hash, response_text, conversation, terminal_reason, created_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(id)
        .bind(&record.presentation_id)
        .bind(&record.slide_id)
        .bind(record.feedback_type.as_str())
        .bind(record.form_id.as_deref())
        .bind(&record.session_id)
        .bind(&record.question_hash)
        .bind(&record.response_text)
        .bind(conversation)
        .bind(record.terminal_reason.map(TerminalReason::as_str))
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn query_feedback(&self, filters: &FeedbackQuery) -> Result<Vec<Feedback>, StoreError> {
        let (limit, offset) = page_bounds(filters);

        let rows = sqlx::query(
            "SELECT id, presentation_id, slide_id, feedback_type, form_id, session_id,
                    question_hash, response_text, conversation, terminal_reason, created_at
             FROM feedback
             WHERE ($1::text IS NULL OR presentation_id = $1)
               AND ($2::text IS NULL OR slide_id = $2)
               AND ($3::text IS NULL OR feedback_type = $3)
               AND ($4::text IS NULL OR form_id = $4)
               AND ($5::text IS NULL OR session_id = $5)
             ORDER BY created_at DESC, id
             LIMIT $6 OFFSET $7",
        )
        .bind(filters.presentation_id.as_deref())
        .bind(filters.slide_id.as_deref())
        .bind(filters.feedback_type.map(FeedbackType::as_str))
        .bind(filters.form_id.as_deref())
        .bind(filters.session_id.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(feedback_from_row).collect()
    }
}

fn page_bounds(filters: &FeedbackQuery) -> (i64, i64) {
    let limit = filters
        .limit
        .unwrap_or(DEFAULT_QUERY_LIMIT)
        .clamp(1, MAX_QUERY_LIMIT);
    let offset = filters.offset.unwrap_or(0);
    (i64::from(limit), i64::from(offset))
}

fn feedback_from_row(row: &PgRow) -> Result<Feedback, StoreError> {
    let feedback_type: String = row.try_get("feedback_type")?;
    let feedback_type = FeedbackType::parse(&feedback_type).ok_or_else(|| {
        StoreError::InvalidData(format!("unknown feedback type persisted: {feedback_type}"))
    })?;

    let terminal_reason = row
        .try_get::<Option<String>, _>("terminal_reason")?
        .map(|raw| {
            TerminalReason::parse(&raw).ok_or_else(|| {
                StoreError::InvalidData(format!("unknown terminal reason persisted: {raw}"))
            })
        })
        .transpose()?;

    let conversation = row
        .try_get::<Option<Value>, _>("conversation")?
        .map(serde_json::from_value::<Vec<ConversationMessage>>)
        .transpose()
        .map_err(|err| StoreError::InvalidData(format!("conversation not decodable: {err}")))?;

    let timestamp: DateTime<Utc> = row.try_get("created_at")?;

    Ok(Feedback {
        id: Some(row.try_get("id")?),
        presentation_id: row.try_get("presentation_id")?,
        slide_id: row.try_get("slide_id")?,
        feedback_type,
        form_id: row.try_get("form_id")?,
        session_id: row.try_get("session_id")?,
        question_hash: row.try_get("question_hash")?,
        response_text: row.try_get("response_text")?,
        timestamp,
        conversation,
        terminal_reason,
    })
}

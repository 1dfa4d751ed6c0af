use thiserror::Error;
use tracing::{error, warn};

use crate::models::{
    CreateFeedbackResponse, ErrorResponse, Feedback, FeedbackQuery, ListFeedbackResponse,
    SubmitOutcome,
};

pub const FEEDBACK_PATH: &str = "/v1/feedback";
const GENERIC_SUBMIT_FAILURE: &str = "Feedback could not be submitted right now. Please try again.";

#[derive(Debug, Error)]
enum FeedbackClientError {
    #[error("feedback service unreachable: {0}")]
    Transport(String),
    #[error("feedback service rejected request (status={status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("feedback service response invalid: {0}")]
    InvalidResponse(String),
}

/// HTTP client for the feedback service. Neither operation returns an
/// error: submit reports failures in its outcome, query degrades to an
/// empty list.
#[derive(Clone)]
pub struct FeedbackClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl FeedbackClient {
    pub fn new(base_url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            http_client,
        }
    }

    pub async fn submit(&self, record: &Feedback) -> SubmitOutcome {
        if let Err(err) = record.validate() {
            return SubmitOutcome::failed(err.to_string());
        }

        match self.send_submit(record).await {
            Ok(response) => SubmitOutcome::stored(response.id),
            Err(FeedbackClientError::Rejected { status, message }) => {
                warn!(status, "feedback submit rejected: {message}");
                SubmitOutcome::failed(message)
            }
            Err(err) => {
                error!(
                    presentation_id = %record.presentation_id,
                    slide_id = %record.slide_id,
                    "feedback submit failed: {err}"
                );
                SubmitOutcome::failed(GENERIC_SUBMIT_FAILURE)
            }
        }
    }

    pub async fn query(&self, filters: &FeedbackQuery) -> Vec<Feedback> {
        match self.send_query(filters).await {
            Ok(response) => response.items,
            Err(err) => {
                warn!("feedback query failed, returning no results: {err}");
                Vec::new()
            }
        }
    }

    async fn send_submit(
        &self,
        record: &Feedback,
    ) -> Result<CreateFeedbackResponse, FeedbackClientError> {
        let response = self
            .http_client
            .post(self.url(FEEDBACK_PATH))
            .json(record)
            .send()
            .await
            .map_err(|err| FeedbackClientError::Transport(err.to_string()))?;

        read_json_response(response).await
    }

    async fn send_query(
        &self,
        filters: &FeedbackQuery,
    ) -> Result<ListFeedbackResponse, FeedbackClientError> {
        let response = self
            .http_client
            .get(self.url(FEEDBACK_PATH))
            .query(filters)
            .send()
            .await
            .map_err(|err| FeedbackClientError::Transport(err.to_string()))?;

        read_json_response(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

async fn read_json_response<Res>(response: reqwest::Response) -> Result<Res, FeedbackClientError>
where
    Res: serde::de::DeserializeOwned,
{
    let status = response.status().as_u16();
    let bytes = response
        .bytes()
        .await
        .map_err(|err| FeedbackClientError::Transport(err.to_string()))?;

    if (200..300).contains(&status) {
        return serde_json::from_slice::<Res>(&bytes)
            .map_err(|err| FeedbackClientError::InvalidResponse(err.to_string()));
    }

    let message = serde_json::from_slice::<ErrorResponse>(&bytes)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| format!("feedback service returned status {status}"));
    Err(FeedbackClientError::Rejected { status, message })
}

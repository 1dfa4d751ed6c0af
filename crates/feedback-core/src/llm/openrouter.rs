use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::gateway::{
    LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest, LlmGatewayResponse,
    LlmTokenUsage,
};
use crate::config::ConfigError;
use crate::config_env::{optional_trimmed_env, parse_env, require_env};

const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_PRIMARY_MODEL: &str = "openai/gpt-4o-mini";
const DEFAULT_FALLBACK_MODEL: &str = "anthropic/claude-3.5-haiku";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Doubles per attempt: base, 2*base, 4*base...
    fn delay(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(2_u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenRouterGatewayConfig {
    pub endpoint: String,
    pub api_key: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub temperature: f32,
    /// Tried in order; later entries only run after the earlier ones fail.
    pub models: Vec<String>,
}

impl OpenRouterGatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = optional_trimmed_env("OPENROUTER_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ConfigError::InvalidConfiguration(
                "OPENROUTER_ENDPOINT must be an http(s) url".to_string(),
            ));
        }

        let defaults = RetryPolicy::default();
        let base_backoff_ms = u64::try_from(defaults.base_backoff.as_millis()).unwrap_or(u64::MAX);

        Ok(Self {
            endpoint,
            api_key: require_env("OPENROUTER_API_KEY")?,
            request_timeout: Duration::from_millis(parse_env("OPENROUTER_TIMEOUT_MS", 15_000_u64)?),
            retry: RetryPolicy {
                max_retries: parse_env("OPENROUTER_MAX_RETRIES", defaults.max_retries)?,
                base_backoff: Duration::from_millis(parse_env(
                    "OPENROUTER_RETRY_BACKOFF_MS",
                    base_backoff_ms,
                )?),
            },
            temperature: parse_env("OPENROUTER_TEMPERATURE", 0.3_f32)?,
            models: model_chain(
                optional_trimmed_env("OPENROUTER_MODEL_PRIMARY")
                    .unwrap_or_else(|| DEFAULT_PRIMARY_MODEL.to_string()),
                Some(
                    optional_trimmed_env("OPENROUTER_MODEL_FALLBACK")
                        .unwrap_or_else(|| DEFAULT_FALLBACK_MODEL.to_string()),
                ),
            ),
        })
    }
}

/// Primary then fallback, without blanks or a repeated model.
pub fn model_chain(primary: String, fallback: Option<String>) -> Vec<String> {
    let mut models: Vec<String> = Vec::with_capacity(2);
    for model in std::iter::once(primary).chain(fallback) {
        if !model.trim().is_empty() && !models.contains(&model) {
            models.push(model);
        }
    }
    models
}

/// Follow-up model over an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct OpenRouterGateway {
    client: reqwest::Client,
    config: OpenRouterGatewayConfig,
}

/// How a single call failed, and therefore what to try next.
#[derive(Debug)]
enum Failure {
    /// Worth repeating against the same model.
    Transient(LlmGatewayError),
    /// This model is unusable for the request; move down the chain.
    Unusable(LlmGatewayError),
    /// No other model would fare better.
    Fatal(LlmGatewayError),
}

impl Failure {
    fn into_error(self) -> LlmGatewayError {
        match self {
            Self::Transient(err) | Self::Unusable(err) | Self::Fatal(err) => err,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletion {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<ReplyContent>,
}

// Some providers answer with typed parts instead of a plain string.
#[derive(Deserialize)]
#[serde(untagged)]
enum ReplyContent {
    Text(String),
    Parts(Vec<ReplyPart>),
}

#[derive(Deserialize)]
struct ReplyPart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl ReplyContent {
    fn into_text(self) -> Option<String> {
        let text = match self {
            Self::Text(text) => text,
            Self::Parts(parts) => parts.into_iter().filter_map(|part| part.text).collect(),
        };
        (!text.is_empty()).then_some(text)
    }
}

impl OpenRouterGateway {
    pub fn new(config: OpenRouterGatewayConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| {
                ConfigError::InvalidConfiguration(format!("llm http client: {err}"))
            })?;

        Ok(Self { client, config })
    }

    async fn call_with_retries(
        &self,
        model: &str,
        request: &LlmGatewayRequest,
    ) -> Result<LlmGatewayResponse, Failure> {
        let retry = self.config.retry;
        let mut attempt = 0;
        loop {
            match self.call_once(model, request).await {
                Err(Failure::Transient(err)) if attempt < retry.max_retries => {
                    let delay = retry.delay(attempt);
                    debug!(model, attempt, ?delay, "retrying follow-up model: {err}");
                    sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn call_once(
        &self,
        model: &str,
        request: &LlmGatewayRequest,
    ) -> Result<LlmGatewayResponse, Failure> {
        let body = ChatRequest {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: self.config.temperature,
            user: request.requester_id.as_deref(),
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                Failure::Transient(if err.is_timeout() {
                    LlmGatewayError::Timeout
                } else {
                    LlmGatewayError::ProviderFailure("endpoint_unreachable".to_string())
                })
            })?;

        let status = response.status();
        let raw = response.text().await.map_err(|_| {
            Failure::Transient(LlmGatewayError::ProviderFailure("body_read_failed".to_string()))
        })?;

        if !status.is_success() {
            let err = LlmGatewayError::ProviderFailure(format!(
                "status={} code={}",
                status.as_u16(),
                provider_error_code(&raw)
            ));
            return Err(classify_status(status, err));
        }

        let completion: ChatCompletion = serde_json::from_str(&raw).map_err(|_| {
            Failure::Unusable(LlmGatewayError::InvalidProviderPayload("not_json".to_string()))
        })?;
        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .and_then(ReplyContent::into_text)
            .ok_or_else(|| {
                Failure::Unusable(LlmGatewayError::InvalidProviderPayload(
                    "no_text_content".to_string(),
                ))
            })?;

        Ok(LlmGatewayResponse {
            model: completion.model.unwrap_or_else(|| model.to_string()),
            provider_request_id: completion.id,
            text,
            usage: completion.usage.map(|usage| LlmTokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }),
        })
    }
}

impl LlmGateway for OpenRouterGateway {
    fn generate<'a>(&'a self, request: LlmGatewayRequest) -> LlmGatewayFuture<'a> {
        Box::pin(async move {
            let mut last_error = None;
            for model in &self.config.models {
                match self.call_with_retries(model, &request).await {
                    Ok(response) => return Ok(response),
                    Err(Failure::Fatal(err)) => return Err(err),
                    Err(failure) => {
                        let err = failure.into_error();
                        warn!(model = model.as_str(), "follow-up model failed: {err}");
                        last_error = Some(err);
                    }
                }
            }

            Err(last_error.unwrap_or_else(|| {
                LlmGatewayError::ProviderFailure("no_model_configured".to_string())
            }))
        })
    }
}

fn classify_status(status: StatusCode, err: LlmGatewayError) -> Failure {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Failure::Fatal(err),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => Failure::Transient(err),
        status if status.is_server_error() => Failure::Transient(err),
        _ => Failure::Unusable(err),
    }
}

fn provider_error_code(raw: &str) -> String {
    let parsed = serde_json::from_str::<Value>(raw).ok();
    match parsed.as_ref().and_then(|body| body.pointer("/error/code")) {
        Some(Value::String(code)) => code.clone(),
        Some(Value::Number(code)) => code.to_string(),
        _ => "unknown".to_string(),
    }
}

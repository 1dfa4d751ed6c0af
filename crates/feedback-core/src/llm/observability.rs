use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::{LlmGateway, LlmGatewayError, LlmGatewayRequest, LlmGatewayResponse};

#[derive(Debug, Clone)]
pub struct LlmTelemetryEvent {
    pub outcome: &'static str,
    pub latency_ms: u64,
    pub model: Option<String>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub error_type: Option<&'static str>,
}

pub async fn generate_with_telemetry(
    llm_gateway: &dyn LlmGateway,
    request: LlmGatewayRequest,
) -> (
    Result<LlmGatewayResponse, LlmGatewayError>,
    LlmTelemetryEvent,
) {
    let started_at = Instant::now();
    let result = llm_gateway.generate(request).await;
    let telemetry = telemetry_for_result(started_at.elapsed(), &result);
    (result, telemetry)
}

pub fn log_telemetry(telemetry: &LlmTelemetryEvent, operation: &'static str) {
    if telemetry.error_type.is_some() {
        warn!(
            operation,
            outcome = telemetry.outcome,
            latency_ms = telemetry.latency_ms,
            error_type = telemetry.error_type.unwrap_or("unknown"),
            "llm request failed"
        );
        return;
    }

    info!(
        operation,
        outcome = telemetry.outcome,
        latency_ms = telemetry.latency_ms,
        model = telemetry.model.as_deref().unwrap_or("unknown"),
        prompt_tokens = telemetry.prompt_tokens,
        completion_tokens = telemetry.completion_tokens,
        total_tokens = telemetry.total_tokens,
        "llm request completed"
    );
}

fn telemetry_for_result(
    latency: Duration,
    result: &Result<LlmGatewayResponse, LlmGatewayError>,
) -> LlmTelemetryEvent {
    let latency_ms = duration_to_millis(latency);
    match result {
        Ok(response) => {
            let usage = response.usage.as_ref();
            LlmTelemetryEvent {
                outcome: "success",
                latency_ms,
                model: Some(response.model.clone()),
                prompt_tokens: usage.map(|usage| usage.prompt_tokens),
                completion_tokens: usage.map(|usage| usage.completion_tokens),
                total_tokens: usage.map(|usage| usage.total_tokens),
                error_type: None,
            }
        }
        Err(err) => LlmTelemetryEvent {
            outcome: "failure",
            latency_ms,
            model: None,
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            error_type: Some(error_type(err)),
        },
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    let millis = duration.as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}

fn error_type(error: &LlmGatewayError) -> &'static str {
    match error {
        LlmGatewayError::Timeout => "timeout",
        LlmGatewayError::ProviderFailure(_) => "provider_failure",
        LlmGatewayError::InvalidProviderPayload(_) => "invalid_provider_payload",
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::telemetry_for_result;
    use crate::llm::{LlmGatewayError, LlmGatewayResponse, LlmTokenUsage};

    #[test]
    fn success_telemetry_carries_usage() {
        let result = Ok(LlmGatewayResponse {
            model: "openai/gpt-4o-mini".to_string(),
            provider_request_id: None,
            text: "CONVERSATION_COMPLETE".to_string(),
            usage: Some(LlmTokenUsage {
                prompt_tokens: 10,
                completion_tokens: 2,
                total_tokens: 12,
            }),
        });

        let event = telemetry_for_result(Duration::from_millis(42), &result);
        assert_eq!(event.outcome, "success");
        assert_eq!(event.latency_ms, 42);
        assert_eq!(event.total_tokens, Some(12));
        assert_eq!(event.error_type, None);
    }

    #[test]
    fn failure_telemetry_classifies_error() {
        let result = Err(LlmGatewayError::Timeout);
        let event = telemetry_for_result(Duration::from_millis(5), &result);
        assert_eq!(event.outcome, "failure");
        assert_eq!(event.error_type, Some("timeout"));
        assert_eq!(event.model, None);
    }
}

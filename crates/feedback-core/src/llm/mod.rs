pub mod gateway;
pub mod observability;
pub mod openrouter;

pub use gateway::{
    LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest, LlmGatewayResponse,
    LlmTokenUsage,
};
pub use observability::{LlmTelemetryEvent, generate_with_telemetry, log_telemetry};
pub use openrouter::{OpenRouterGateway, OpenRouterGatewayConfig, RetryPolicy, model_chain};

use async_trait::async_trait;
use serde::Serialize;
use waffle_core::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRequest {
    pub model_id: String,
    pub prompt: String,
    pub system: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Default::default() }
    }
}

/// Raw text-in/text-out access to a foundation model.
///
/// Implementations report service failures as `Error::BedrockApi` carrying
/// the service error code so the adapter can decide what to retry.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse>;
}

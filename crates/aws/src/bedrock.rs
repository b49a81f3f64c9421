use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use waffle_bedrock::{ModelInvoker, ModelRequest, ModelResponse};
use waffle_core::retry::MODEL_TIMEOUT;
use waffle_core::{Error, Result};

use crate::errors::{error_code, error_message};

pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
const OPERATION: &str = "InvokeModel";

#[derive(Debug, Serialize)]
struct ContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
struct MessagesBody<'a> {
    anthropic_version: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Deserialize)]
struct ReplyBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct ReplyUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct MessagesReply {
    #[serde(default)]
    content: Vec<ReplyBlock>,
    #[serde(default)]
    usage: ReplyUsage,
}

pub(crate) fn request_body(request: &ModelRequest) -> Result<Vec<u8>> {
    let body = MessagesBody {
        anthropic_version: ANTHROPIC_VERSION,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        system: request.system.as_deref(),
        messages: vec![Message { role: "user", content: vec![ContentBlock { kind: "text", text: &request.prompt }] }],
    };
    Ok(serde_json::to_vec(&body)?)
}

pub(crate) fn parse_reply(bytes: &[u8]) -> Result<ModelResponse> {
    let reply: MessagesReply = serde_json::from_slice(bytes)
        .map_err(|e| Error::bedrock(OPERATION, "InvalidResponse", format!("unreadable model reply: {e}")))?;
    let text = reply
        .content
        .iter()
        .filter(|b| b.kind.is_empty() || b.kind == "text")
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join("");
    Ok(ModelResponse { text, input_tokens: reply.usage.input_tokens, output_tokens: reply.usage.output_tokens })
}

/// Anthropic messages models on Bedrock Runtime.
#[derive(Clone)]
pub struct BedrockInvoker {
    client: Client,
}

impl BedrockInvoker {
    pub fn new(config: &SdkConfig) -> Self {
        Self { client: Client::new(config) }
    }
}

#[async_trait]
impl ModelInvoker for BedrockInvoker {
    #[instrument(skip_all, fields(model = %request.model_id))]
    async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse> {
        let body = request_body(&request)?;
        let out = self
            .client
            .invoke_model()
            .model_id(&request.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| Error::bedrock(OPERATION, error_code(&e, MODEL_TIMEOUT), error_message(&e)))?;
        let response = parse_reply(out.body().as_ref())?;
        debug!(input_tokens = response.input_tokens, output_tokens = response.output_tokens, "model invocation finished");
        Ok(response)
    }
}

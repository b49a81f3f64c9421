use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use waffle_core::config::BedrockConfig;
use waffle_core::retry::MODEL_TIMEOUT;
use waffle_core::{
    CancellationToken, Error, ImprovementPlanItem, QuestionEvaluation, Resource, Result, RetryPolicy, Risk, WafrQuestion,
    WorkloadModel,
};

use crate::invoker::{ModelInvoker, ModelRequest, ModelResponse};
use crate::parse::{self, SemanticAnalysis};
use crate::prompts;
use crate::usage::{TokenUsage, UsageSnapshot};

#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub model_id: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub requests_per_second: f64,
    pub retry: RetryPolicy,
}

impl AdapterSettings {
    pub fn from_config(cfg: &BedrockConfig) -> Self {
        Self {
            model_id: cfg.model_id.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            timeout: Duration::from_secs(cfg.timeout_seconds),
            requests_per_second: cfg.requests_per_second,
            retry: RetryPolicy::bedrock(cfg.max_retries),
        }
    }
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self::from_config(&BedrockConfig::default())
    }
}

fn quota(requests_per_second: f64) -> Result<Quota> {
    if !(requests_per_second > 0.0) || !requests_per_second.is_finite() {
        return Err(Error::validation("bedrock.requests_per_second", requests_per_second, "must be greater than 0"));
    }
    let period = Duration::from_secs_f64(1.0 / requests_per_second);
    let burst = NonZeroU32::new(requests_per_second.ceil().max(1.0) as u32).unwrap_or(NonZeroU32::MIN);
    Quota::with_period(period)
        .map(|q| q.allow_burst(burst))
        .ok_or_else(|| Error::validation("bedrock.requests_per_second", requests_per_second, "rate too high"))
}

/// Foundation-model operations for the review, on top of a raw
/// [`ModelInvoker`]. Every call is rate limited, time boxed and retried on
/// transient service errors.
pub struct BedrockAdapter {
    invoker: Arc<dyn ModelInvoker>,
    settings: AdapterSettings,
    limiter: DefaultDirectRateLimiter,
    usage: TokenUsage,
}

impl BedrockAdapter {
    pub fn new(invoker: Arc<dyn ModelInvoker>, settings: AdapterSettings) -> Result<Self> {
        let limiter = RateLimiter::direct(quota(settings.requests_per_second)?);
        Ok(Self { invoker, settings, limiter, usage: TokenUsage::default() })
    }

    pub fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    pub fn usage(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }

    async fn invoke_once(&self, prompt: &str, cancel: &CancellationToken) -> Result<ModelResponse> {
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = self.limiter.until_ready() => {}
        }
        let request = ModelRequest {
            model_id: self.settings.model_id.clone(),
            prompt: prompt.to_string(),
            system: Some(prompts::SYSTEM_PROMPT.to_string()),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };
        let call = tokio::time::timeout(self.settings.timeout, self.invoker.invoke(request));
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            out = call => match out {
                Ok(res) => res,
                Err(_) => Err(Error::bedrock(
                    "InvokeModel",
                    MODEL_TIMEOUT,
                    format!("no response within {}s", self.settings.timeout.as_secs()),
                )),
            },
        }
    }

    /// Sends `prompt`, retrying transient failures, and returns the reply text.
    pub async fn invoke(&self, prompt: &str, cancel: &CancellationToken) -> Result<String> {
        let res = self.settings.retry.run("InvokeModel", cancel, || self.invoke_once(prompt, cancel)).await?;
        self.usage.record(res.input_tokens, res.output_tokens);
        debug!(input_tokens = res.input_tokens, output_tokens = res.output_tokens, "model replied");
        Ok(res.text)
    }

    #[instrument(skip_all, fields(resources = resources.len()))]
    pub async fn analyze_iac_semantics(&self, resources: &[Resource], cancel: &CancellationToken) -> Result<SemanticAnalysis> {
        let reply = self.invoke(&prompts::semantic_analysis(resources), cancel).await?;
        let analysis = parse::parse_semantic_analysis(&reply);
        if analysis.partial {
            warn!("semantic analysis reply only partially parsed");
        }
        Ok(analysis)
    }

    /// Service failures propagate; an unparseable reply yields a degraded
    /// evaluation instead.
    #[instrument(skip_all, fields(question = %question.id))]
    pub async fn evaluate_wafr_question(
        &self,
        question: &WafrQuestion,
        model: &WorkloadModel,
        cancel: &CancellationToken,
    ) -> Result<QuestionEvaluation> {
        let reply = self.invoke(&prompts::question_evaluation(question, model), cancel).await?;
        match parse::parse_evaluation(question, &reply) {
            Ok(e) => Ok(e),
            Err(e) => {
                warn!(error = %e, "could not parse evaluation reply");
                Ok(parse::degraded_evaluation(question, &e.to_string()))
            }
        }
    }

    #[instrument(skip_all, fields(risk = %risk.id))]
    pub async fn generate_improvement_guidance(
        &self,
        risk: &Risk,
        resources: &[Resource],
        cancel: &CancellationToken,
    ) -> Result<ImprovementPlanItem> {
        let reply = self.invoke(&prompts::improvement_guidance(risk, resources), cancel).await?;
        parse::parse_guidance(risk, &reply)
    }
}

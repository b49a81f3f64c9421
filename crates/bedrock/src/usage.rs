use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// USD per 1K input tokens.
pub const INPUT_COST_PER_1K: f64 = 0.003;
/// USD per 1K output tokens.
pub const OUTPUT_COST_PER_1K: f64 = 0.015;

#[derive(Debug, Default)]
pub struct TokenUsage {
    requests: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageSnapshot {
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost_usd: f64,
}

impl TokenUsage {
    pub fn record(&self, input: u64, output: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.input_tokens.fetch_add(input, Ordering::Relaxed);
        self.output_tokens.fetch_add(output, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let input_tokens = self.input_tokens.load(Ordering::Relaxed);
        let output_tokens = self.output_tokens.load(Ordering::Relaxed);
        UsageSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            input_tokens,
            output_tokens,
            estimated_cost_usd: estimate_cost(input_tokens, output_tokens),
        }
    }
}

pub fn estimate_cost(input_tokens: u64, output_tokens: u64) -> f64 {
    input_tokens as f64 / 1000.0 * INPUT_COST_PER_1K + output_tokens as f64 / 1000.0 * OUTPUT_COST_PER_1K
}

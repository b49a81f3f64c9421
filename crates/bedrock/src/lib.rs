//! Foundation-model access for reviews: prompts, invocation policy and
//! reply parsing.

pub mod adapter;
pub mod invoker;
pub mod parse;
pub mod prompts;
pub mod usage;

pub use adapter::{AdapterSettings, BedrockAdapter};
pub use invoker::{ModelInvoker, ModelRequest, ModelResponse};
pub use parse::SemanticAnalysis;
pub use usage::UsageSnapshot;

//! AWS SDK transport for the model and Well-Architected Tool traits.

use aws_config::{BehaviorVersion, Region};
use tracing::debug;

pub mod bedrock;
mod errors;
pub mod wellarchitected;

pub use bedrock::BedrockInvoker;
pub use aws_config::SdkConfig;
pub use wellarchitected::WellArchitectedClient;

/// Shared SDK configuration. `profile` of `None` uses the default chain.
pub async fn load_sdk_config(region: &str, profile: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
    if let Some(p) = profile.filter(|p| !p.is_empty()) {
        loader = loader.profile_name(p);
    }
    debug!(region, profile = profile.unwrap_or("default"), "loading AWS configuration");
    loader.load().await
}

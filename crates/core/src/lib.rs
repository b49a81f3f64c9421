//! Shared domain model for Waffle: resources and their graph, review scope,
//! WAFR questions/answers, sessions, configuration, errors and retry policy.

pub mod cancel;
pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod retry;
pub mod scope;
pub mod session;
pub mod wafr;

pub use cancel::{cancellable, CancellationToken};
pub use config::Config;
pub use error::{BoxError, Error, Result, Sentinel};
pub use graph::{DependencyCycle, ResourceGraph};
pub use model::{Properties, Resource, SourceType, WorkloadModel};
pub use retry::RetryPolicy;
pub use scope::{Pillar, ReviewScope};
pub use session::{Checkpoint, ReviewResults, ReviewSession, ReviewSummary, SessionStatus};
pub use wafr::{
    BestPractice, Choice, Effort, Evidence, ImprovementPlan, ImprovementPlanItem, QuestionEvaluation, Risk, RiskLevel,
    WafrQuestion,
};

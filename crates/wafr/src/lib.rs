//! Well-Architected Tool side of a review: question retrieval, answer
//! submission, milestones and improvement plans.

pub mod client;
pub mod confidence;
pub mod evaluator;
pub mod improvement;

pub use client::{
    AnswerPage, AnswerRisk, AnswerSummary, AnswerUpdate, MilestoneRecord, ReportPage, RiskCounts, WafrClient, WorkloadDefinition,
    WorkloadReport,
};
pub use confidence::adjust_confidence;
pub use evaluator::{EvaluatorSettings, WafrEvaluator};
pub use improvement::enrich_improvement_plan;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use waffle_core::{Choice, Result, RiskLevel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadDefinition {
    pub name: String,
    pub description: String,
    pub environment: String,
    pub aws_regions: Vec<String>,
    pub lenses: Vec<String>,
}

/// Risk the Well-Architected Tool reports for an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerRisk {
    #[default]
    Unanswered,
    High,
    Medium,
    None,
    NotApplicable,
}

impl AnswerRisk {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "HIGH" => AnswerRisk::High,
            "MEDIUM" => AnswerRisk::Medium,
            "NONE" => AnswerRisk::None,
            "NOT_APPLICABLE" => AnswerRisk::NotApplicable,
            _ => AnswerRisk::Unanswered,
        }
    }

    /// Severity for answers that carry an actionable risk.
    pub fn severity(&self) -> Option<RiskLevel> {
        match self {
            AnswerRisk::High => Some(RiskLevel::High),
            AnswerRisk::Medium => Some(RiskLevel::Medium),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSummary {
    pub question_id: String,
    pub pillar_id: String,
    pub title: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub selected_choices: Vec<String>,
    #[serde(default)]
    pub risk: AnswerRisk,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerPage {
    pub answers: Vec<AnswerSummary>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerUpdate {
    pub workload_id: String,
    pub lens_alias: String,
    pub question_id: String,
    pub selected_choices: Vec<String>,
    pub notes: String,
    pub is_applicable: bool,
}

/// Answer counts per risk level.
pub type RiskCounts = BTreeMap<AnswerRisk, i32>;

/// A recorded milestone and the workload's risk counts at that point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneRecord {
    pub number: i32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub risk_counts: RiskCounts,
}

/// One workload's line in the account-wide consolidated report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadReport {
    pub workload_id: String,
    pub workload_name: String,
    #[serde(default)]
    pub risk_counts: RiskCounts,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportPage {
    pub workloads: Vec<WorkloadReport>,
    pub next_token: Option<String>,
}

/// The subset of the Well-Architected Tool API a review needs.
///
/// Failures are `Error::WafrApi` with the service error code set.
#[async_trait]
pub trait WafrClient: Send + Sync {
    /// Returns the new workload id.
    async fn create_workload(&self, workload: &WorkloadDefinition) -> Result<String>;
    async fn list_answers(&self, workload_id: &str, lens_alias: &str, pillar_id: &str, next_token: Option<&str>) -> Result<AnswerPage>;
    async fn update_answer(&self, update: &AnswerUpdate) -> Result<()>;
    /// Returns the milestone number.
    async fn create_milestone(&self, workload_id: &str, milestone_name: &str) -> Result<i32>;
    async fn get_milestone(&self, workload_id: &str, milestone_number: i32) -> Result<MilestoneRecord>;
    async fn get_consolidated_report(&self, next_token: Option<&str>) -> Result<ReportPage>;
}

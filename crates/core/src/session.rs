use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::model::WorkloadModel;
use crate::scope::ReviewScope;
use crate::wafr::{ImprovementPlan, QuestionEvaluation, Risk, WafrQuestion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Created,
    InProgress,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last durably completed workflow stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Checkpoint {
    #[default]
    #[serde(rename = "", alias = "created")]
    Created,
    #[serde(rename = "iac_analysis_complete")]
    IacAnalysisComplete,
    #[serde(rename = "questions_retrieved")]
    QuestionsRetrieved,
    #[serde(rename = "questions_evaluated")]
    QuestionsEvaluated,
    #[serde(rename = "answers_submitted")]
    AnswersSubmitted,
    #[serde(rename = "improvement_plan_retrieved")]
    ImprovementPlanRetrieved,
    #[serde(rename = "milestone_created")]
    MilestoneCreated,
}

impl Checkpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Checkpoint::Created => "",
            Checkpoint::IacAnalysisComplete => "iac_analysis_complete",
            Checkpoint::QuestionsRetrieved => "questions_retrieved",
            Checkpoint::QuestionsEvaluated => "questions_evaluated",
            Checkpoint::AnswersSubmitted => "answers_submitted",
            Checkpoint::ImprovementPlanRetrieved => "improvement_plan_retrieved",
            Checkpoint::MilestoneCreated => "milestone_created",
        }
    }

    pub fn next(&self) -> Option<Checkpoint> {
        Some(match self {
            Checkpoint::Created => Checkpoint::IacAnalysisComplete,
            Checkpoint::IacAnalysisComplete => Checkpoint::QuestionsRetrieved,
            Checkpoint::QuestionsRetrieved => Checkpoint::QuestionsEvaluated,
            Checkpoint::QuestionsEvaluated => Checkpoint::AnswersSubmitted,
            Checkpoint::AnswersSubmitted => Checkpoint::ImprovementPlanRetrieved,
            Checkpoint::ImprovementPlanRetrieved => Checkpoint::MilestoneCreated,
            Checkpoint::MilestoneCreated => return None,
        })
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub total_questions: usize,
    pub questions_evaluated: usize,
    pub high_risks: usize,
    pub medium_risks: usize,
    pub average_confidence: f64,
    pub improvement_plan_items: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResults {
    pub evaluations: Vec<QuestionEvaluation>,
    pub risks: Vec<Risk>,
    pub improvement_plan: ImprovementPlan,
    pub summary: ReviewSummary,
    #[serde(default)]
    pub milestone_id: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSession {
    pub session_id: String,
    pub workload_id: String,
    pub aws_workload_id: String,
    #[serde(default)]
    pub milestone_id: Option<String>,
    #[serde(default)]
    pub plan_file: Option<PathBuf>,
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    pub scope: ReviewScope,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub workload_model: Option<WorkloadModel>,
    #[serde(default)]
    pub results: Option<ReviewResults>,
    #[serde(default)]
    pub checkpoint: Checkpoint,

    #[serde(default)]
    pub questions: Vec<WafrQuestion>,
    #[serde(default)]
    pub evaluations: Vec<QuestionEvaluation>,
    #[serde(default)]
    pub answers_submitted: usize,
    #[serde(default)]
    pub improvement_plan: Option<ImprovementPlan>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ReviewSession {
    pub fn new(session_id: impl Into<String>, workload_id: impl Into<String>, aws_workload_id: impl Into<String>, scope: ReviewScope) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            workload_id: workload_id.into(),
            aws_workload_id: aws_workload_id.into(),
            milestone_id: None,
            plan_file: None,
            working_directory: None,
            scope,
            status: SessionStatus::Created,
            created_at: now,
            updated_at: now,
            workload_model: None,
            results: None,
            checkpoint: Checkpoint::Created,
            questions: Vec::new(),
            evaluations: Vec::new(),
            answers_submitted: 0,
            improvement_plan: None,
            error: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

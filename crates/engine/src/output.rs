use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use waffle_core::{Checkpoint, ReviewResults, ReviewScope, ReviewSession, ReviewSummary, SessionStatus};
use waffle_wafr::MilestoneRecord;

/// JSON shape printed for a review and its results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutput {
    pub session_id: String,
    pub workload_id: String,
    pub aws_workload_id: String,
    pub status: SessionStatus,
    pub scope: ReviewScope,
    pub checkpoint: Checkpoint,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ReviewSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<String>,
    /// Filled in when the milestone was looked up again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<MilestoneRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<ReviewResults>,
}

impl ReviewOutput {
    /// With `full`, the complete results are embedded alongside the summary.
    pub fn from_session(session: &ReviewSession, full: bool) -> Self {
        Self {
            session_id: session.session_id.clone(),
            workload_id: session.workload_id.clone(),
            aws_workload_id: session.aws_workload_id.clone(),
            status: session.status,
            scope: session.scope.clone(),
            checkpoint: session.checkpoint,
            created_at: session.created_at,
            updated_at: session.updated_at,
            summary: session.results.as_ref().map(|r| r.summary.clone()),
            milestone_id: session.milestone_id.clone(),
            milestone: None,
            results: if full { session.results.clone() } else { None },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusOutput {
    pub session_id: String,
    pub workload_id: String,
    pub status: SessionStatus,
    pub checkpoint: Checkpoint,
    /// Completed stages out of six.
    pub stages_completed: usize,
    pub total_questions: usize,
    pub questions_evaluated: usize,
    pub answers_submitted: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

pub const TOTAL_STAGES: usize = 6;

pub fn stages_completed(checkpoint: Checkpoint) -> usize {
    let mut n = 0;
    let mut c = Checkpoint::Created;
    while c < checkpoint {
        match c.next() {
            Some(next) => c = next,
            None => break,
        }
        n += 1;
    }
    n
}

impl StatusOutput {
    pub fn from_session(session: &ReviewSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
            workload_id: session.workload_id.clone(),
            status: session.status,
            checkpoint: session.checkpoint,
            stages_completed: stages_completed(session.checkpoint),
            total_questions: session.questions.len(),
            questions_evaluated: session.evaluations.len(),
            answers_submitted: session.answers_submitted,
            error: session.error.clone(),
            updated_at: session.updated_at,
        }
    }
}

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use waffle_bedrock::BedrockAdapter;
use waffle_core::config::DEFAULT_LENS;
use waffle_core::{
    CancellationToken, Error, ImprovementPlan, Pillar, QuestionEvaluation, Result, RetryPolicy, ReviewScope, Sentinel,
    WafrQuestion, WorkloadModel,
};

use crate::client::{AnswerSummary, AnswerUpdate, MilestoneRecord, WafrClient, WorkloadDefinition, WorkloadReport};
use crate::confidence::adjust_confidence;
use crate::improvement::{plan_item_for_answer, question_from_answer};

pub const NOTES_MARKER: &str = "Automated analysis by Waffle";
/// Well-Architected Tool limit on answer notes.
pub const MAX_NOTES_CHARS: usize = 2084;
const MILESTONE_PREFIX: &str = "waffle";

#[derive(Debug, Clone)]
pub struct EvaluatorSettings {
    pub lens_alias: String,
    pub region: String,
    pub environment: String,
    pub retry: RetryPolicy,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            lens_alias: DEFAULT_LENS.into(),
            region: waffle_core::config::DEFAULT_REGION.into(),
            environment: "PRODUCTION".into(),
            retry: RetryPolicy::wafr(3),
        }
    }
}

/// Drives the Well-Architected Tool for one review: workload, questions,
/// answers, milestones and the resulting improvement plan.
pub struct WafrEvaluator {
    client: Arc<dyn WafrClient>,
    settings: EvaluatorSettings,
}

pub fn format_notes(evaluation: &QuestionEvaluation) -> String {
    let header = format!("{NOTES_MARKER} (confidence: {:.0}%)", evaluation.confidence * 100.0);
    let notes = if evaluation.notes.trim().is_empty() {
        header
    } else {
        format!("{header}\n\n{}", evaluation.notes.trim())
    };
    if notes.chars().count() <= MAX_NOTES_CHARS {
        return notes;
    }
    let mut cut: String = notes.chars().take(MAX_NOTES_CHARS - 3).collect();
    cut.push_str("...");
    cut
}

pub fn default_milestone_name() -> String {
    format!("{MILESTONE_PREFIX}-{}", Utc::now().format("%Y-%m-%d-%H-%M-%S"))
}

impl WafrEvaluator {
    pub fn new(client: Arc<dyn WafrClient>, settings: EvaluatorSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &EvaluatorSettings {
        &self.settings
    }

    #[instrument(skip(self, cancel))]
    pub async fn create_workload(&self, workload_id: &str, description: &str, cancel: &CancellationToken) -> Result<String> {
        let name = workload_id.trim();
        if name.is_empty() {
            return Err(Sentinel::InvalidWorkloadId.into());
        }
        let description = if description.trim().is_empty() {
            format!("Automated Well-Architected review of {name}")
        } else {
            description.trim().to_string()
        };
        let definition = WorkloadDefinition {
            name: name.to_string(),
            description,
            environment: self.settings.environment.clone(),
            aws_regions: vec![self.settings.region.clone()],
            lenses: vec![self.settings.lens_alias.clone()],
        };
        let id = self
            .settings
            .retry
            .run("CreateWorkload", cancel, || self.client.create_workload(&definition))
            .await?;
        info!(workload = name, aws_workload_id = %id, "created workload");
        Ok(id)
    }

    /// Every answer for `pillar`, following continuation tokens.
    pub async fn list_pillar_answers(&self, aws_workload_id: &str, pillar: Pillar, cancel: &CancellationToken) -> Result<Vec<AnswerSummary>> {
        let mut answers = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .settings
                .retry
                .run("ListAnswers", cancel, || {
                    self.client.list_answers(aws_workload_id, &self.settings.lens_alias, pillar.external_id(), token.as_deref())
                })
                .await?;
            answers.extend(page.answers);
            match page.next_token.filter(|t| !t.is_empty()) {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        debug!(pillar = %pillar, count = answers.len(), "listed answers");
        Ok(answers)
    }

    async fn pillar_questions(&self, aws_workload_id: &str, pillar: Pillar, cancel: &CancellationToken) -> Result<Vec<WafrQuestion>> {
        let answers = self.list_pillar_answers(aws_workload_id, pillar, cancel).await?;
        Ok(answers.iter().map(|a| question_from_answer(pillar, a)).collect())
    }

    #[instrument(skip(self, cancel), fields(scope = %scope))]
    pub async fn get_questions(&self, aws_workload_id: &str, scope: &ReviewScope, cancel: &CancellationToken) -> Result<Vec<WafrQuestion>> {
        scope.validate()?;
        match scope {
            ReviewScope::Workload => {
                let mut all = Vec::new();
                for pillar in Pillar::ALL {
                    all.extend(self.pillar_questions(aws_workload_id, pillar, cancel).await?);
                }
                Ok(all)
            }
            ReviewScope::Pillar(p) => self.pillar_questions(aws_workload_id, *p, cancel).await,
            ReviewScope::Question(qid) => {
                let inferred = Pillar::for_question_id(qid);
                let order = inferred
                    .into_iter()
                    .chain(Pillar::ALL.into_iter().filter(|p| Some(*p) != inferred));
                for pillar in order {
                    let found: Vec<WafrQuestion> = self
                        .pillar_questions(aws_workload_id, pillar, cancel)
                        .await?
                        .into_iter()
                        .filter(|q| &q.id == qid)
                        .collect();
                    if !found.is_empty() {
                        return Ok(found);
                    }
                }
                Err(Error::validation("question_id", qid, "question not found in lens"))
            }
        }
    }

    pub async fn submit_answer(
        &self,
        aws_workload_id: &str,
        question_id: &str,
        evaluation: &QuestionEvaluation,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let update = AnswerUpdate {
            workload_id: aws_workload_id.to_string(),
            lens_alias: self.settings.lens_alias.clone(),
            question_id: question_id.to_string(),
            selected_choices: evaluation.selected_choice_ids(),
            notes: format_notes(evaluation),
            is_applicable: true,
        };
        self.settings.retry.run("UpdateAnswer", cancel, || self.client.update_answer(&update)).await?;
        debug!(question = question_id, choices = update.selected_choices.len(), "submitted answer");
        Ok(())
    }

    /// Returns the milestone number as text. An empty name gets a
    /// timestamped default.
    pub async fn create_milestone(&self, aws_workload_id: &str, name: &str, cancel: &CancellationToken) -> Result<String> {
        let name = if name.trim().is_empty() { default_milestone_name() } else { name.trim().to_string() };
        let number = self
            .settings
            .retry
            .run("CreateMilestone", cancel, || self.client.create_milestone(aws_workload_id, &name))
            .await?;
        info!(milestone = %name, number, "created milestone");
        Ok(number.to_string())
    }

    /// Looks up a milestone by the number `create_milestone` returned.
    pub async fn get_milestone(&self, aws_workload_id: &str, milestone_id: &str, cancel: &CancellationToken) -> Result<MilestoneRecord> {
        let number: i32 = milestone_id
            .trim()
            .parse()
            .map_err(|_| Error::validation("milestone_id", milestone_id, "must be a milestone number"))?;
        let record = self
            .settings
            .retry
            .run("GetMilestone", cancel, || self.client.get_milestone(aws_workload_id, number))
            .await?;
        debug!(milestone = %record.name, number, "fetched milestone");
        Ok(record)
    }

    /// Risk counts for every workload in the account.
    pub async fn consolidated_report(&self, cancel: &CancellationToken) -> Result<Vec<WorkloadReport>> {
        let mut workloads = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .settings
                .retry
                .run("GetConsolidatedReport", cancel, || self.client.get_consolidated_report(token.as_deref()))
                .await?;
            workloads.extend(page.workloads);
            match page.next_token.filter(|t| !t.is_empty()) {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        info!(workloads = workloads.len(), "fetched consolidated report");
        Ok(workloads)
    }

    pub async fn get_improvement_plan(&self, aws_workload_id: &str, model: &WorkloadModel, cancel: &CancellationToken) -> Result<ImprovementPlan> {
        self.get_improvement_plan_for(aws_workload_id, model, &Pillar::ALL, cancel).await
    }

    pub async fn get_improvement_plan_for(
        &self,
        aws_workload_id: &str,
        model: &WorkloadModel,
        pillars: &[Pillar],
        cancel: &CancellationToken,
    ) -> Result<ImprovementPlan> {
        let mut plan = ImprovementPlan::empty();
        for &pillar in pillars {
            for answer in self.list_pillar_answers(aws_workload_id, pillar, cancel).await? {
                if let Some(item) = plan_item_for_answer(pillar, &answer, model) {
                    plan.items.push(item);
                }
            }
        }
        plan.sort_by_priority();
        info!(items = plan.len(), "built improvement plan");
        Ok(plan)
    }

    /// Delegates to the model, then rescales confidence by the evidence
    /// actually available.
    pub async fn evaluate_question(
        &self,
        question: &WafrQuestion,
        model: &WorkloadModel,
        adapter: Option<&BedrockAdapter>,
        cancel: &CancellationToken,
    ) -> Result<QuestionEvaluation> {
        let adapter = adapter.ok_or(Sentinel::EvaluatorNotInitialized)?;
        let mut evaluation = adapter.evaluate_wafr_question(question, model, cancel).await?;
        let adjusted = adjust_confidence(Some(&evaluation), Some(model));
        if (adjusted - evaluation.confidence).abs() > f64::EPSILON {
            debug!(question = %question.id, reported = evaluation.confidence, adjusted, "adjusted confidence");
        }
        evaluation.confidence = adjusted;
        if evaluation.selected_choices.is_empty() {
            warn!(question = %question.id, "no choices selected");
        }
        Ok(evaluation)
    }
}

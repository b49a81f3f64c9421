use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use waffle_bedrock::BedrockAdapter;
use waffle_core::config::Config;
use waffle_core::{
    CancellationToken, Checkpoint, Error, ImprovementPlan, Result, ReviewResults, ReviewScope, ReviewSession, Sentinel,
    SessionStatus, WorkloadModel,
};
use waffle_iac::IacAnalyzer;
use waffle_session::SessionStore;
use waffle_wafr::{enrich_improvement_plan, MilestoneRecord, WafrEvaluator};

use crate::output::StatusOutput;
use crate::progress::{self, ProgressReporter};
use crate::results::build_results;

/// Status of a stored session. Reads the store only.
pub async fn session_status(store: &dyn SessionStore, session_id: &str) -> Result<StatusOutput> {
    let session = store.load_session(session_id).await?;
    Ok(StatusOutput::from_session(&session))
}

/// Loads a session whose review finished with results.
pub async fn completed_session(store: &dyn SessionStore, session_id: &str) -> Result<ReviewSession> {
    let session = store.load_session(session_id).await?;
    if session.status == SessionStatus::Completed && session.results.is_some() {
        return Ok(session);
    }
    Err(Error::from(Sentinel::InvalidSessionStatus).context(format!("session {session_id} is {} and has no results", session.status)))
}

/// Fetches the session's milestone back from the Well-Architected Tool.
/// `None` when the review recorded no milestone.
pub async fn recorded_milestone(
    evaluator: &WafrEvaluator,
    session: &ReviewSession,
    cancel: &CancellationToken,
) -> Result<Option<MilestoneRecord>> {
    let Some(id) = session.milestone_id.as_deref() else {
        return Ok(None);
    };
    let record = evaluator.get_milestone(&session.aws_workload_id, id, cancel).await?;
    Ok(Some(record))
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Ask the model for an architecture overview during IaC analysis.
    pub semantic_analysis: bool,
    /// Improvement items enriched with model guidance; 0 disables.
    pub guidance_limit: usize,
    pub milestone_name: Option<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { semantic_analysis: true, guidance_limit: 5, milestone_name: None }
    }
}

impl EngineOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            semantic_analysis: cfg.bedrock.semantic_analysis,
            guidance_limit: cfg.wafr.guidance_limit,
            milestone_name: None,
        }
    }
}

/// Where the infrastructure under review lives.
#[derive(Debug, Clone, Default)]
pub struct ReviewTarget {
    pub working_directory: PathBuf,
    pub plan_file: Option<PathBuf>,
    pub description: String,
}

/// Checkpointed review workflow. Each completed stage is persisted before
/// the next begins, so an interrupted review resumes where it stopped.
pub struct ReviewEngine {
    analyzer: IacAnalyzer,
    evaluator: WafrEvaluator,
    adapter: Option<Arc<BedrockAdapter>>,
    store: Arc<dyn SessionStore>,
    options: EngineOptions,
}

impl ReviewEngine {
    pub fn new(analyzer: IacAnalyzer, evaluator: WafrEvaluator, store: Arc<dyn SessionStore>) -> Self {
        Self { analyzer, evaluator, adapter: None, store, options: EngineOptions::default() }
    }

    pub fn with_adapter(mut self, adapter: Arc<BedrockAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn adapter(&self) -> Option<&BedrockAdapter> {
        self.adapter.as_deref()
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    #[instrument(skip(self, target, cancel), fields(scope = %scope))]
    pub async fn initiate_review(
        &self,
        workload_id: &str,
        scope: ReviewScope,
        target: &ReviewTarget,
        cancel: &CancellationToken,
    ) -> Result<ReviewSession> {
        let workload_id = workload_id.trim();
        if workload_id.is_empty() {
            return Err(Sentinel::InvalidWorkloadId.into());
        }
        scope.validate()?;
        let aws_workload_id = self.evaluator.create_workload(workload_id, &target.description, cancel).await?;
        let mut session = self.store.create_session(workload_id, &aws_workload_id, scope).await?;
        session.working_directory = Some(target.working_directory.clone());
        session.plan_file = target.plan_file.clone();
        session.touch();
        self.store.save_session(&session).await?;
        info!(session = %session.session_id, aws_workload_id = %aws_workload_id, "review initiated");
        Ok(session)
    }

    /// Runs every stage after the session's checkpoint. A fatal failure is
    /// recorded on the session as `failed` before it is returned.
    #[instrument(skip_all, fields(session = %session.session_id))]
    pub async fn execute_review(
        &self,
        mut session: ReviewSession,
        reporter: Option<&dyn ProgressReporter>,
        cancel: &CancellationToken,
    ) -> Result<ReviewSession> {
        if session.is_completed() {
            return Err(Error::from(Sentinel::SessionAlreadyCompleted).context(format!("session {}", session.session_id)));
        }
        if session.checkpoint > Checkpoint::Created && session.workload_model.is_none() {
            warn!(checkpoint = %session.checkpoint, "no workload model stored, restarting at IaC analysis");
            session.checkpoint = Checkpoint::Created;
        }
        session.status = SessionStatus::InProgress;
        session.error = None;
        session.touch();
        self.store.save_session(&session).await?;

        match self.run_stages(&mut session, reporter, cancel).await {
            Ok(()) => Ok(session),
            Err(e) => {
                error!(checkpoint = %session.checkpoint, error = %e, "review failed");
                session.status = SessionStatus::Failed;
                session.error = Some(e.to_string());
                session.touch();
                if let Err(save_err) = self.store.save_session(&session).await {
                    error!(error = %save_err, "could not persist failed session");
                }
                Err(e)
            }
        }
    }

    pub async fn resume_session(
        &self,
        session_id: &str,
        reporter: Option<&dyn ProgressReporter>,
        cancel: &CancellationToken,
    ) -> Result<ReviewSession> {
        let session = self.store.load_session(session_id).await?;
        info!(session = session_id, checkpoint = %session.checkpoint, status = %session.status, "resuming review");
        self.execute_review(session, reporter, cancel).await
    }

    pub async fn get_status(&self, session_id: &str) -> Result<StatusOutput> {
        session_status(self.store.as_ref(), session_id).await
    }

    pub async fn get_results(&self, session_id: &str) -> Result<ReviewResults> {
        let session = completed_session(self.store.as_ref(), session_id).await?;
        session.results.ok_or_else(|| Sentinel::InvalidSessionStatus.into())
    }

    /// The milestone a completed review recorded, as the service now reports it.
    pub async fn get_milestone(&self, session_id: &str, cancel: &CancellationToken) -> Result<Option<MilestoneRecord>> {
        let session = completed_session(self.store.as_ref(), session_id).await?;
        recorded_milestone(&self.evaluator, &session, cancel).await
    }

    async fn run_stages(
        &self,
        session: &mut ReviewSession,
        reporter: Option<&dyn ProgressReporter>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match session.checkpoint {
                Checkpoint::Created => self.analyze_iac(session, reporter, cancel).await?,
                Checkpoint::IacAnalysisComplete => self.retrieve_questions(session, reporter, cancel).await?,
                Checkpoint::QuestionsRetrieved => self.evaluate_questions(session, reporter, cancel).await?,
                Checkpoint::QuestionsEvaluated => self.submit_answers(session, reporter, cancel).await?,
                Checkpoint::AnswersSubmitted => self.improvement_plan(session, reporter, cancel).await?,
                Checkpoint::ImprovementPlanRetrieved => self.create_milestone(session, reporter, cancel).await?,
                Checkpoint::MilestoneCreated => return self.complete(session, reporter).await,
            }
        }
    }

    async fn advance(&self, session: &mut ReviewSession, to: Checkpoint) -> Result<()> {
        session.checkpoint = to;
        session.touch();
        self.store.save_session(session).await?;
        debug!(checkpoint = %to, "checkpoint saved");
        Ok(())
    }

    async fn analyze_iac(
        &self,
        session: &mut ReviewSession,
        reporter: Option<&dyn ProgressReporter>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let dir = session
            .working_directory
            .clone()
            .ok_or_else(|| Error::validation("working_directory", "", "session has no working directory"))?;
        step(reporter, progress::STEP_IAC_ANALYSIS, &format!("analyzing {}", dir.display()));
        let mut model = self.analyzer.analyze(&dir, session.plan_file.as_deref(), cancel).await?;
        if self.options.semantic_analysis && !model.resources.is_empty() {
            if let Some(adapter) = &self.adapter {
                match adapter.analyze_iac_semantics(&model.resources, cancel).await {
                    Ok(analysis) => {
                        model.metadata.insert("semantic_analysis".into(), serde_json::to_value(&analysis)?);
                    }
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => warn!(error = %e, "semantic analysis failed, continuing without it"),
                }
            }
        }
        info!(resources = model.resources.len(), source = %model.source_type, "workload model built");
        session.workload_model = Some(model);
        self.advance(session, Checkpoint::IacAnalysisComplete).await
    }

    async fn retrieve_questions(
        &self,
        session: &mut ReviewSession,
        reporter: Option<&dyn ProgressReporter>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        step(reporter, progress::STEP_QUESTIONS, &format!("fetching questions for {}", session.scope));
        session.questions = self.evaluator.get_questions(&session.aws_workload_id, &session.scope, cancel).await?;
        info!(questions = session.questions.len(), "questions retrieved");
        self.advance(session, Checkpoint::QuestionsRetrieved).await
    }

    async fn evaluate_questions(
        &self,
        session: &mut ReviewSession,
        reporter: Option<&dyn ProgressReporter>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let model = stored_model(session)?;
        let total = session.questions.len();
        step(reporter, progress::STEP_EVALUATION, &format!("evaluating {total} questions"));
        let mut evaluations = Vec::with_capacity(total);
        let mut last_error = None;
        for (i, question) in session.questions.iter().enumerate() {
            match self.evaluator.evaluate_question(question, model, self.adapter(), cancel).await {
                Ok(e) => evaluations.push(e),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(question = %question.id, error = %e, "skipping question");
                    last_error = Some(e);
                }
            }
            if let Some(r) = reporter {
                r.report_progress(i + 1, total, &question.id);
            }
        }
        if evaluations.is_empty() {
            return Err(none_succeeded(last_error, format!("none of {total} questions could be evaluated")));
        }
        info!(evaluated = evaluations.len(), total, "questions evaluated");
        session.evaluations = evaluations;
        self.advance(session, Checkpoint::QuestionsEvaluated).await
    }

    async fn submit_answers(
        &self,
        session: &mut ReviewSession,
        reporter: Option<&dyn ProgressReporter>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let total = session.evaluations.len();
        step(reporter, progress::STEP_ANSWERS, &format!("submitting {total} answers"));
        let mut submitted = 0;
        let mut last_error = None;
        for (i, evaluation) in session.evaluations.iter().enumerate() {
            let qid = &evaluation.question.id;
            match self.evaluator.submit_answer(&session.aws_workload_id, qid, evaluation, cancel).await {
                Ok(()) => submitted += 1,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(question = %qid, error = %e, "answer not submitted");
                    last_error = Some(e);
                }
            }
            if let Some(r) = reporter {
                r.report_progress(i + 1, total, qid);
            }
        }
        if submitted == 0 {
            return Err(none_succeeded(last_error, format!("none of {total} answers could be submitted")));
        }
        session.answers_submitted = submitted;
        self.advance(session, Checkpoint::AnswersSubmitted).await
    }

    async fn improvement_plan(
        &self,
        session: &mut ReviewSession,
        reporter: Option<&dyn ProgressReporter>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        step(reporter, progress::STEP_IMPROVEMENT_PLAN, "building improvement plan");
        let model = stored_model(session)?;
        let pillars = session.scope.pillars();
        let plan = match self.evaluator.get_improvement_plan_for(&session.aws_workload_id, model, &pillars, cancel).await {
            Ok(plan) => plan,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(error = %e, "improvement plan unavailable, continuing with an empty plan");
                ImprovementPlan::empty()
            }
        };
        let plan = match (&self.adapter, self.options.guidance_limit) {
            (Some(adapter), limit) if limit > 0 && !plan.is_empty() => {
                enrich_improvement_plan(plan, model, adapter, limit, cancel).await?
            }
            _ => plan,
        };
        session.improvement_plan = Some(plan);
        self.advance(session, Checkpoint::ImprovementPlanRetrieved).await
    }

    async fn create_milestone(
        &self,
        session: &mut ReviewSession,
        reporter: Option<&dyn ProgressReporter>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        step(reporter, progress::STEP_MILESTONE, "recording milestone");
        let name = self.options.milestone_name.as_deref().unwrap_or("");
        match self.evaluator.create_milestone(&session.aws_workload_id, name, cancel).await {
            Ok(number) => session.milestone_id = Some(number),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => warn!(error = %e, "milestone not created"),
        }
        self.advance(session, Checkpoint::MilestoneCreated).await
    }

    async fn complete(&self, session: &mut ReviewSession, reporter: Option<&dyn ProgressReporter>) -> Result<()> {
        let plan = session.improvement_plan.clone().unwrap_or_else(ImprovementPlan::empty);
        let results = build_results(session.questions.len(), session.evaluations.clone(), plan, session.milestone_id.clone());
        let summary = results.summary.clone();
        session.results = Some(results);
        session.status = SessionStatus::Completed;
        session.touch();
        self.store.save_session(session).await?;
        info!(
            evaluated = summary.questions_evaluated,
            high_risks = summary.high_risks,
            medium_risks = summary.medium_risks,
            "review completed"
        );
        if let Some(r) = reporter {
            r.report_completion(&summary);
        }
        Ok(())
    }
}

fn step(reporter: Option<&dyn ProgressReporter>, name: &str, message: &str) {
    info!(step = name, "{message}");
    if let Some(r) = reporter {
        r.report_step(name, message);
    }
}

fn stored_model(session: &ReviewSession) -> Result<&WorkloadModel> {
    session
        .workload_model
        .as_ref()
        .ok_or_else(|| Error::from(Sentinel::InvalidSessionStatus).context("session has no workload model"))
}

fn none_succeeded(last_error: Option<Error>, message: String) -> Error {
    match last_error {
        Some(e) => e.context(message),
        None => Error::Message(message),
    }
}

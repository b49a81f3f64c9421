use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use waffle_bedrock::{AdapterSettings, BedrockAdapter, ModelInvoker, ModelRequest, ModelResponse};
use waffle_core::{
    CancellationToken, Checkpoint, Choice, Error, Pillar, Result, RetryPolicy, ReviewScope, ReviewSession, ReviewSummary,
    Sentinel, SessionStatus,
};
use waffle_engine::{EngineOptions, ProgressReporter, ReviewEngine, ReviewTarget};
use waffle_iac::{FileLimits, IacAnalyzer};
use waffle_redact::Redactor;
use waffle_session::{MemorySessionStore, SessionStore};
use waffle_wafr::{
    AnswerPage, AnswerRisk, AnswerSummary, AnswerUpdate, EvaluatorSettings, MilestoneRecord, ReportPage, RiskCounts, WafrClient,
    WafrEvaluator, WorkloadDefinition,
};

const MAIN_TF: &str = r#"
resource "aws_s3_bucket" "logs" {
  bucket = "acme-logs"
}

resource "aws_s3_bucket_versioning" "logs" {
  bucket = aws_s3_bucket.logs.id
  versioning_configuration {
    status = "Enabled"
  }
}

resource "aws_kms_key" "main" {
  enable_key_rotation = true
}
"#;

/// Replies by prompt kind; evaluations select the first choice.
#[derive(Default)]
struct FakeModel {
    semantic_calls: AtomicUsize,
    evaluation_calls: AtomicUsize,
    guidance_calls: AtomicUsize,
}

#[async_trait]
impl ModelInvoker for FakeModel {
    async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse> {
        let prompt = &request.prompt;
        if prompt.starts_with("Analyze the following Terraform resources") {
            self.semantic_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(ModelResponse::text(r#"{"summary": "Logging bucket with KMS", "architecture_patterns": ["storage"]}"#));
        }
        if prompt.starts_with("A Well-Architected review found") {
            self.guidance_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(ModelResponse::text(r#"{"description": "Enable default encryption", "estimated_effort": "LOW"}"#));
        }
        self.evaluation_calls.fetch_add(1, Ordering::SeqCst);
        let qid = prompt
            .lines()
            .find_map(|l| l.strip_prefix("Question "))
            .and_then(|l| l.split(':').next())
            .unwrap_or_default()
            .to_string();
        Ok(ModelResponse {
            text: format!(
                r#"{{"selected_choices": ["{qid}_a"], "evidence": [{{"choice_id": "{qid}_a", "explanation": "bucket", "resources": ["aws_s3_bucket.logs"], "confidence": 0.9}}], "confidence": 0.9, "notes": "looks fine"}}"#
            ),
            input_tokens: 100,
            output_tokens: 20,
        })
    }
}

#[derive(Default)]
struct FakeWafr {
    list_calls: Mutex<Vec<String>>,
    updates: Mutex<Vec<AnswerUpdate>>,
    milestones: Mutex<Vec<String>>,
    fail_updates: bool,
    submitted: Mutex<HashMap<String, Vec<String>>>,
}

fn choices(qid: &str) -> Vec<Choice> {
    ["a", "b", "c", "no"]
        .iter()
        .map(|s| Choice {
            id: format!("{qid}_{s}"),
            title: if *s == "no" { "None of these".into() } else { format!("Practice {s}") },
            description: String::new(),
        })
        .collect()
}

#[async_trait]
impl WafrClient for FakeWafr {
    async fn create_workload(&self, w: &WorkloadDefinition) -> Result<String> {
        Ok(format!("aws-{}", w.name))
    }

    async fn list_answers(&self, _: &str, _: &str, pillar_id: &str, _: Option<&str>) -> Result<AnswerPage> {
        self.list_calls.lock().unwrap().push(pillar_id.to_string());
        let pillar = Pillar::from_external_id(pillar_id).unwrap();
        let submitted = self.submitted.lock().unwrap();
        let answers = (1..=2)
            .map(|i| {
                let qid = format!("{}_q{i}", pillar.question_prefix());
                let selected = submitted.get(&qid).cloned().unwrap_or_default();
                AnswerSummary {
                    risk: if selected.len() < 2 { AnswerRisk::High } else { AnswerRisk::None },
                    question_id: qid.clone(),
                    pillar_id: pillar_id.to_string(),
                    title: format!("Question {qid}"),
                    choices: choices(&qid),
                    selected_choices: selected,
                }
            })
            .collect();
        Ok(AnswerPage { answers, next_token: None })
    }

    async fn update_answer(&self, update: &AnswerUpdate) -> Result<()> {
        if self.fail_updates {
            return Err(Error::wafr("UpdateAnswer", "ValidationException", "bad answer"));
        }
        self.submitted.lock().unwrap().insert(update.question_id.clone(), update.selected_choices.clone());
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }

    async fn create_milestone(&self, _: &str, name: &str) -> Result<i32> {
        let mut m = self.milestones.lock().unwrap();
        m.push(name.to_string());
        Ok(m.len() as i32)
    }

    async fn get_milestone(&self, _: &str, number: i32) -> Result<MilestoneRecord> {
        let m = self.milestones.lock().unwrap();
        let name = usize::try_from(number - 1)
            .ok()
            .and_then(|i| m.get(i))
            .ok_or_else(|| Error::wafr("GetMilestone", "ResourceNotFoundException", "no such milestone"))?;
        let answered = self.updates.lock().unwrap().len() as i32;
        Ok(MilestoneRecord { number, name: name.clone(), recorded_at: None, risk_counts: RiskCounts::from([(AnswerRisk::None, answered)]) })
    }

    async fn get_consolidated_report(&self, _: Option<&str>) -> Result<ReportPage> {
        Ok(ReportPage::default())
    }
}

#[derive(Default)]
struct Recorder {
    steps: Mutex<Vec<String>>,
    completions: Mutex<Vec<ReviewSummary>>,
}

impl ProgressReporter for Recorder {
    fn report_step(&self, step: &str, _: &str) {
        self.steps.lock().unwrap().push(step.to_string());
    }

    fn report_progress(&self, _: usize, _: usize, _: &str) {}

    fn report_completion(&self, summary: &ReviewSummary) {
        self.completions.lock().unwrap().push(summary.clone());
    }
}

struct Harness {
    engine: ReviewEngine,
    model: Arc<FakeModel>,
    wafr: Arc<FakeWafr>,
    store: Arc<MemorySessionStore>,
}

fn harness(wafr: FakeWafr) -> Harness {
    let model = Arc::new(FakeModel::default());
    let wafr = Arc::new(wafr);
    let store = Arc::new(MemorySessionStore::new());
    let mut adapter_settings = AdapterSettings::default();
    adapter_settings.requests_per_second = 1000.0;
    adapter_settings.retry = RetryPolicy::bedrock(1).with_base_delay(Duration::from_millis(1));
    let adapter = BedrockAdapter::new(model.clone(), adapter_settings).unwrap();
    let mut evaluator_settings = EvaluatorSettings::default();
    evaluator_settings.retry = RetryPolicy::wafr(1).with_base_delay(Duration::from_millis(1));
    let engine = ReviewEngine::new(
        IacAnalyzer::new(Arc::new(Redactor::new()), FileLimits::default()),
        WafrEvaluator::new(wafr.clone(), evaluator_settings),
        store.clone(),
    )
    .with_adapter(Arc::new(adapter))
    .with_options(EngineOptions { semantic_analysis: true, guidance_limit: 1, milestone_name: None });
    Harness { engine, model, wafr, store }
}

fn target(dir: &Path) -> ReviewTarget {
    std::fs::write(dir.join("main.tf"), MAIN_TF).unwrap();
    ReviewTarget { working_directory: dir.to_path_buf(), plan_file: None, description: "test".into() }
}

#[tokio::test]
async fn pillar_review_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(FakeWafr::default());
    let cancel = CancellationToken::new();
    let recorder = Recorder::default();

    let session = h
        .engine
        .initiate_review("shop", ReviewScope::Pillar(Pillar::Security), &target(dir.path()), &cancel)
        .await
        .unwrap();
    assert_eq!(session.aws_workload_id, "aws-shop");
    assert_eq!(session.status, SessionStatus::Created);

    let done = h.engine.execute_review(session, Some(&recorder), &cancel).await.unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.checkpoint, Checkpoint::MilestoneCreated);
    assert_eq!(done.milestone_id.as_deref(), Some("1"));
    assert_eq!(done.answers_submitted, 2);

    let model = done.workload_model.as_ref().unwrap();
    assert_eq!(model.resources.len(), 3);
    assert!(model.metadata.contains_key("semantic_analysis"));
    assert_eq!(h.model.semantic_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.model.evaluation_calls.load(Ordering::SeqCst), 2);

    // one listing for questions, one for the improvement plan, security only
    assert_eq!(*h.wafr.list_calls.lock().unwrap(), vec!["security", "security"]);
    let updates = h.wafr.updates.lock().unwrap();
    assert_eq!(updates.len(), 2);
    assert!(updates.iter().all(|u| u.notes.starts_with("Automated analysis by Waffle")));
    drop(updates);

    let results = done.results.as_ref().unwrap();
    assert_eq!(results.summary.total_questions, 2);
    assert_eq!(results.summary.questions_evaluated, 2);
    assert_eq!(results.improvement_plan.len(), 2);
    assert_eq!(h.model.guidance_calls.load(Ordering::SeqCst), 1);
    assert_eq!(results.improvement_plan.items[0].description, "Enable default encryption");

    assert_eq!(
        *recorder.steps.lock().unwrap(),
        vec!["iac_analysis", "question_retrieval", "question_evaluation", "answer_submission", "improvement_plan", "milestone_creation"]
    );
    assert_eq!(recorder.completions.lock().unwrap().len(), 1);

    let stored = h.store.load_session(&done.session_id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert!(h.engine.get_results(&done.session_id).await.is_ok());

    let milestone = h.engine.get_milestone(&done.session_id, &cancel).await.unwrap().unwrap();
    assert_eq!(milestone.number, 1);
    assert!(milestone.name.starts_with("waffle-"));
    assert_eq!(milestone.risk_counts[&AnswerRisk::None], 2);
}

#[tokio::test]
async fn unfinished_sessions_have_no_results_or_milestone() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(FakeWafr::default());
    let cancel = CancellationToken::new();
    let session = h
        .engine
        .initiate_review("shop", ReviewScope::Pillar(Pillar::Security), &target(dir.path()), &cancel)
        .await
        .unwrap();

    let status = waffle_engine::session_status(h.store.as_ref(), &session.session_id).await.unwrap();
    assert_eq!(status.stages_completed, 0);
    let err = waffle_engine::completed_session(h.store.as_ref(), &session.session_id).await.unwrap_err();
    assert!(err.is(Sentinel::InvalidSessionStatus));
    let err = h.engine.get_milestone(&session.session_id, &cancel).await.unwrap_err();
    assert!(err.is(Sentinel::InvalidSessionStatus));
    assert!(h.wafr.milestones.lock().unwrap().is_empty());
}

#[tokio::test]
async fn resume_after_analysis_skips_reanalysis() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(FakeWafr::default());
    let cancel = CancellationToken::new();
    let session = h
        .engine
        .initiate_review("shop", ReviewScope::Question("rel_q1".into()), &target(dir.path()), &cancel)
        .await
        .unwrap();

    // Simulate a run that stored its model and then failed.
    let mut failed = session.clone();
    let analyzer = IacAnalyzer::new(Arc::new(Redactor::new()), FileLimits::default());
    failed.workload_model = Some(analyzer.analyze(dir.path(), None, &cancel).await.unwrap());
    failed.checkpoint = Checkpoint::IacAnalysisComplete;
    failed.status = SessionStatus::Failed;
    // Analysis would now fail if it ran again.
    failed.working_directory = Some(dir.path().join("missing"));
    h.store.save_session(&failed).await.unwrap();

    let done = h.engine.resume_session(&session.session_id, None, &cancel).await.unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.checkpoint, Checkpoint::MilestoneCreated);
    assert_eq!(h.model.semantic_calls.load(Ordering::SeqCst), 0);
    assert_eq!(done.questions.len(), 1);
    assert_eq!(done.questions[0].id, "rel_q1");
}

#[tokio::test]
async fn completed_sessions_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(FakeWafr::default());
    let cancel = CancellationToken::new();
    let session = h.engine.initiate_review("shop", ReviewScope::Workload, &target(dir.path()), &cancel).await.unwrap();
    let done = h.engine.execute_review(session, None, &cancel).await.unwrap();
    assert_eq!(done.results.as_ref().unwrap().summary.total_questions, 12);

    let err = h.engine.resume_session(&done.session_id, None, &cancel).await.unwrap_err();
    assert!(err.is(Sentinel::SessionAlreadyCompleted));
}

#[tokio::test]
async fn failed_submission_marks_session_failed() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(FakeWafr { fail_updates: true, ..Default::default() });
    let cancel = CancellationToken::new();
    let session = h
        .engine
        .initiate_review("shop", ReviewScope::Pillar(Pillar::Reliability), &target(dir.path()), &cancel)
        .await
        .unwrap();
    let id = session.session_id.clone();
    let err = h.engine.execute_review(session, None, &cancel).await.unwrap_err();
    assert_eq!(err.error_code(), Some("ValidationException"));

    let stored: ReviewSession = h.store.load_session(&id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Failed);
    assert_eq!(stored.checkpoint, Checkpoint::QuestionsEvaluated);
    assert!(stored.error.is_some());

    let status = h.engine.get_status(&id).await.unwrap();
    assert_eq!(status.stages_completed, 3);
    assert!(h.engine.get_results(&id).await.unwrap_err().is(Sentinel::InvalidSessionStatus));
}

#[tokio::test]
async fn missing_workload_id_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(FakeWafr::default());
    let err = h
        .engine
        .initiate_review(" ", ReviewScope::Workload, &target(dir.path()), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is(Sentinel::InvalidWorkloadId));
    assert!(h.store.list_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_review_fails_and_can_resume() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(FakeWafr::default());
    let cancel = CancellationToken::new();
    let session = h
        .engine
        .initiate_review("shop", ReviewScope::Pillar(Pillar::Security), &target(dir.path()), &cancel)
        .await
        .unwrap();
    let id = session.session_id.clone();
    cancel.cancel();
    let err = h.engine.execute_review(session, None, &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(h.store.load_session(&id).await.unwrap().status, SessionStatus::Failed);

    let done = h.engine.resume_session(&id, None, &CancellationToken::new()).await.unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
}

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_wellarchitected::primitives::DateTime as SdkDateTime;
use aws_sdk_wellarchitected::types::{self as wa, ReportFormat, WorkloadEnvironment};
use aws_sdk_wellarchitected::Client;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, instrument};
use waffle_core::retry::SERVICE_UNAVAILABLE;
use waffle_core::{Choice, Error, Result};
use waffle_wafr::{
    AnswerPage, AnswerRisk, AnswerSummary, AnswerUpdate, MilestoneRecord, ReportPage, RiskCounts, WafrClient, WorkloadDefinition,
    WorkloadReport,
};

use crate::errors::{error_code, error_message};

const PAGE_SIZE: i32 = 50;
/// GetConsolidatedReport caps pages at 15.
const REPORT_PAGE_SIZE: i32 = 15;
const REVIEW_OWNER: &str = "Waffle";

#[derive(Clone)]
pub struct WellArchitectedClient {
    client: Client,
}

impl WellArchitectedClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self { client: Client::new(config) }
    }
}

fn wafr_error<E, R>(operation: &str, err: aws_sdk_wellarchitected::error::SdkError<E, R>) -> Error
where
    E: aws_sdk_wellarchitected::error::ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    Error::wafr(operation, error_code(&err, SERVICE_UNAVAILABLE), error_message(&err))
}

fn convert_choice(c: &wa::Choice) -> Choice {
    Choice {
        id: c.choice_id().unwrap_or_default().to_string(),
        title: c.title().unwrap_or_default().to_string(),
        description: c.description().unwrap_or_default().to_string(),
    }
}

pub(crate) fn convert_answer(pillar_id: &str, a: &wa::AnswerSummary) -> AnswerSummary {
    AnswerSummary {
        question_id: a.question_id().unwrap_or_default().to_string(),
        pillar_id: a.pillar_id().unwrap_or(pillar_id).to_string(),
        title: a.question_title().unwrap_or_default().to_string(),
        choices: a.choices().iter().map(convert_choice).collect(),
        selected_choices: a.selected_choices().to_vec(),
        risk: a.risk().map(|r| AnswerRisk::parse(r.as_str())).unwrap_or_default(),
    }
}

fn convert_risk_counts(counts: Option<&HashMap<wa::Risk, i32>>) -> RiskCounts {
    counts.into_iter().flatten().map(|(risk, n)| (AnswerRisk::parse(risk.as_str()), *n)).collect()
}

fn convert_time(t: &SdkDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(t.secs(), t.subsec_nanos())
}

pub(crate) fn convert_milestone(requested: i32, m: &wa::Milestone) -> MilestoneRecord {
    MilestoneRecord {
        number: m.milestone_number().unwrap_or(requested),
        name: m.milestone_name().unwrap_or_default().to_string(),
        recorded_at: m.recorded_at().and_then(convert_time),
        risk_counts: convert_risk_counts(m.workload().and_then(|w| w.risk_counts())),
    }
}

pub(crate) fn convert_report_metric(m: &wa::ConsolidatedReportMetric) -> WorkloadReport {
    WorkloadReport {
        workload_id: m.workload_id().unwrap_or_default().to_string(),
        workload_name: m.workload_name().unwrap_or_default().to_string(),
        risk_counts: convert_risk_counts(m.risk_counts()),
    }
}

#[async_trait]
impl WafrClient for WellArchitectedClient {
    #[instrument(skip_all, fields(name = %workload.name))]
    async fn create_workload(&self, workload: &WorkloadDefinition) -> Result<String> {
        let out = self
            .client
            .create_workload()
            .workload_name(&workload.name)
            .description(&workload.description)
            .environment(WorkloadEnvironment::from(workload.environment.as_str()))
            .review_owner(REVIEW_OWNER)
            .set_aws_regions(Some(workload.aws_regions.clone()))
            .set_lenses(Some(workload.lenses.clone()))
            .send()
            .await
            .map_err(|e| wafr_error("CreateWorkload", e))?;
        out.workload_id()
            .map(str::to_string)
            .ok_or_else(|| Error::wafr("CreateWorkload", "InvalidResponse", "response carried no workload id"))
    }

    async fn list_answers(&self, workload_id: &str, lens_alias: &str, pillar_id: &str, next_token: Option<&str>) -> Result<AnswerPage> {
        let out = self
            .client
            .list_answers()
            .workload_id(workload_id)
            .lens_alias(lens_alias)
            .pillar_id(pillar_id)
            .max_results(PAGE_SIZE)
            .set_next_token(next_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| wafr_error("ListAnswers", e))?;
        let answers: Vec<AnswerSummary> = out.answer_summaries().iter().map(|a| convert_answer(pillar_id, a)).collect();
        debug!(pillar = pillar_id, count = answers.len(), "listed answer page");
        Ok(AnswerPage { answers, next_token: out.next_token().map(str::to_string) })
    }

    async fn update_answer(&self, update: &AnswerUpdate) -> Result<()> {
        self.client
            .update_answer()
            .workload_id(&update.workload_id)
            .lens_alias(&update.lens_alias)
            .question_id(&update.question_id)
            .set_selected_choices(Some(update.selected_choices.clone()))
            .notes(&update.notes)
            .is_applicable(update.is_applicable)
            .send()
            .await
            .map_err(|e| wafr_error("UpdateAnswer", e))?;
        Ok(())
    }

    async fn create_milestone(&self, workload_id: &str, milestone_name: &str) -> Result<i32> {
        let out = self
            .client
            .create_milestone()
            .workload_id(workload_id)
            .milestone_name(milestone_name)
            .send()
            .await
            .map_err(|e| wafr_error("CreateMilestone", e))?;
        out.milestone_number()
            .ok_or_else(|| Error::wafr("CreateMilestone", "InvalidResponse", "response carried no milestone number"))
    }

    async fn get_milestone(&self, workload_id: &str, milestone_number: i32) -> Result<MilestoneRecord> {
        let out = self
            .client
            .get_milestone()
            .workload_id(workload_id)
            .milestone_number(milestone_number)
            .send()
            .await
            .map_err(|e| wafr_error("GetMilestone", e))?;
        out.milestone()
            .map(|m| convert_milestone(milestone_number, m))
            .ok_or_else(|| Error::wafr("GetMilestone", "InvalidResponse", "response carried no milestone"))
    }

    async fn get_consolidated_report(&self, next_token: Option<&str>) -> Result<ReportPage> {
        let out = self
            .client
            .get_consolidated_report()
            .format(ReportFormat::Json)
            .max_results(REPORT_PAGE_SIZE)
            .set_next_token(next_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| wafr_error("GetConsolidatedReport", e))?;
        let workloads: Vec<WorkloadReport> = out.metrics().iter().map(convert_report_metric).collect();
        debug!(count = workloads.len(), "listed consolidated report page");
        Ok(ReportPage { workloads, next_token: out.next_token().map(str::to_string) })
    }
}

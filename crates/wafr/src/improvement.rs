use tracing::{debug, warn};
use waffle_bedrock::BedrockAdapter;
use waffle_core::{
    BestPractice, CancellationToken, Effort, ImprovementPlan, ImprovementPlanItem, Pillar, Resource, Result, Risk,
    RiskLevel, WafrQuestion, WorkloadModel,
};

use crate::client::AnswerSummary;

/// Terraform type prefixes considered relevant to each pillar.
pub fn pillar_resource_prefixes(pillar: Pillar) -> &'static [&'static str] {
    match pillar {
        Pillar::Security => &[
            "aws_s3_bucket",
            "aws_kms_key",
            "aws_iam_role",
            "aws_iam_policy",
            "aws_security_group",
            "aws_vpc",
            "aws_subnet",
        ],
        Pillar::Reliability => &[
            "aws_autoscaling_group",
            "aws_elb",
            "aws_lb",
            "aws_rds_instance",
            "aws_dynamodb_table",
            "aws_backup_plan",
        ],
        Pillar::Performance => &["aws_instance", "aws_lambda_function", "aws_cloudfront_distribution", "aws_elasticache_cluster"],
        Pillar::CostOptimization => &["aws_instance", "aws_rds_instance", "aws_s3_bucket", "aws_ebs_volume"],
        Pillar::OperationalExcellence => &[
            "aws_cloudwatch_log_group",
            "aws_cloudwatch_metric_alarm",
            "aws_sns_topic",
            "aws_lambda_function",
        ],
        Pillar::Sustainability => &["aws_instance", "aws_autoscaling_group", "aws_lambda_function"],
    }
}

pub fn affected_resources(pillar: Pillar, model: &WorkloadModel) -> Vec<String> {
    model
        .resources_with_type_prefix(pillar_resource_prefixes(pillar))
        .map(|r| r.address.clone())
        .collect()
}

pub fn question_from_answer(pillar: Pillar, answer: &AnswerSummary) -> WafrQuestion {
    WafrQuestion {
        id: answer.question_id.clone(),
        pillar,
        title: answer.title.clone(),
        description: String::new(),
        best_practices: answer.choices.iter().filter(|c| !c.is_none_of_these()).map(BestPractice::from).collect(),
        choices: answer.choices.clone(),
    }
}

/// Turns a High/Medium answer into a risk and its plan item; other answers
/// yield nothing.
pub fn plan_item_for_answer(pillar: Pillar, answer: &AnswerSummary, model: &WorkloadModel) -> Option<ImprovementPlanItem> {
    let severity = answer.risk.severity()?;
    let question = question_from_answer(pillar, answer);
    let missing: Vec<BestPractice> = answer
        .choices
        .iter()
        .filter(|c| !c.is_none_of_these() && !answer.selected_choices.contains(&c.id))
        .map(BestPractice::from)
        .collect();
    let affected = affected_resources(pillar, model);
    let risk = Risk {
        id: format!("risk-{}", answer.question_id),
        question,
        pillar,
        severity,
        description: format!("{} risk: {}", severity_word(severity), answer.title),
        affected_resources: affected.clone(),
        missing_best_practices: missing.clone(),
    };
    let description = match missing.len() {
        0 => format!("Review the answer to \"{}\"", answer.title),
        1 => format!("Implement the missing best practice for \"{}\": {}", answer.title, missing[0].title),
        n => format!("Implement {n} missing best practices for \"{}\"", answer.title),
    };
    Some(ImprovementPlanItem {
        id: format!("improvement-{}", answer.question_id),
        priority: severity.priority(missing.len()),
        estimated_effort: Effort::estimate(missing.len(), affected.len()),
        risk,
        description,
        best_practices: missing,
        affected_resources: affected,
    })
}

fn severity_word(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::High => "High",
        RiskLevel::Medium => "Medium",
        RiskLevel::None => "No",
    }
}

/// Asks the model for concrete guidance on the `limit` highest-priority
/// items. Items whose guidance fails keep their synthesized text.
pub async fn enrich_improvement_plan(
    mut plan: ImprovementPlan,
    model: &WorkloadModel,
    adapter: &BedrockAdapter,
    limit: usize,
    cancel: &CancellationToken,
) -> Result<ImprovementPlan> {
    plan.sort_by_priority();
    for item in plan.items.iter_mut().take(limit) {
        let resources: Vec<Resource> = model
            .resources
            .iter()
            .filter(|r| item.affected_resources.contains(&r.address))
            .cloned()
            .collect();
        match adapter.generate_improvement_guidance(&item.risk, &resources, cancel).await {
            Ok(guidance) => {
                item.description = guidance.description;
                if !guidance.best_practices.is_empty() {
                    item.best_practices = guidance.best_practices;
                }
                debug!(item = %item.id, "enriched improvement item");
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => warn!(item = %item.id, error = %e, "keeping synthesized improvement item"),
        }
    }
    Ok(plan)
}

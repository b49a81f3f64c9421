use chrono::Utc;
use std::collections::HashSet;
use waffle_core::{BestPractice, ImprovementPlan, QuestionEvaluation, ReviewResults, ReviewSummary, Risk, RiskLevel};

/// Evaluations below this confidence are flagged as risks.
pub const RISK_CONFIDENCE_THRESHOLD: f64 = 0.5;
pub const HIGH_RISK_BELOW: f64 = 0.3;
pub const MEDIUM_RISK_BELOW: f64 = 0.7;

/// A Medium risk for every evaluation the model was unsure about or that
/// selected nothing.
pub fn extract_risks(evaluations: &[QuestionEvaluation]) -> Vec<Risk> {
    evaluations
        .iter()
        .filter(|e| e.confidence < RISK_CONFIDENCE_THRESHOLD || e.selected_choices.is_empty())
        .map(|e| {
            let selected: HashSet<&str> = e.selected_choices.iter().map(|c| c.id.as_str()).collect();
            let missing: Vec<BestPractice> = e
                .question
                .best_practices
                .iter()
                .filter(|bp| !selected.contains(bp.id.as_str()))
                .cloned()
                .collect();
            let mut affected: Vec<String> = Vec::new();
            for r in e.evidence.iter().flat_map(|ev| ev.resources.iter()) {
                if !affected.contains(r) {
                    affected.push(r.clone());
                }
            }
            Risk {
                id: format!("risk-{}", e.question.id),
                question: e.question.clone(),
                pillar: e.question.pillar,
                severity: RiskLevel::Medium,
                description: format!("Potential gap in \"{}\": the infrastructure does not clearly demonstrate the recommended practices", e.question.title),
                affected_resources: affected,
                missing_best_practices: missing,
            }
        })
        .collect()
}

pub fn summarize(total_questions: usize, evaluations: &[QuestionEvaluation], plan: &ImprovementPlan) -> ReviewSummary {
    let confidences: Vec<f64> = evaluations.iter().map(|e| e.confidence).collect();
    let average = if confidences.is_empty() { 0.0 } else { confidences.iter().sum::<f64>() / confidences.len() as f64 };
    ReviewSummary {
        total_questions,
        questions_evaluated: evaluations.len(),
        high_risks: confidences.iter().filter(|c| **c < HIGH_RISK_BELOW).count(),
        medium_risks: confidences.iter().filter(|c| (HIGH_RISK_BELOW..MEDIUM_RISK_BELOW).contains(*c)).count(),
        average_confidence: average,
        improvement_plan_items: plan.len(),
    }
}

/// Final results: extracted risks first, then plan risks not already
/// covered by the same question.
pub fn build_results(
    total_questions: usize,
    evaluations: Vec<QuestionEvaluation>,
    plan: ImprovementPlan,
    milestone_id: Option<String>,
) -> ReviewResults {
    let mut risks = extract_risks(&evaluations);
    let mut seen: HashSet<String> = risks.iter().map(|r| r.id.clone()).collect();
    for item in &plan.items {
        if seen.insert(item.risk.id.clone()) {
            risks.push(item.risk.clone());
        }
    }
    let summary = summarize(total_questions, &evaluations, &plan);
    ReviewResults { evaluations, risks, improvement_plan: plan, summary, milestone_id, completed_at: Utc::now() }
}

use waffle_core::{QuestionEvaluation, SourceType, WorkloadModel};

pub const NO_RESOURCES_FACTOR: f64 = 0.3;
pub const NO_RESOURCES_CAP: f64 = 0.4;
pub const FEW_RESOURCES_THRESHOLD: usize = 5;
pub const FEW_RESOURCES_FACTOR: f64 = 0.8;
pub const UNGROUNDED_EVIDENCE_FACTOR: f64 = 0.85;
pub const NON_PLAN_FACTOR: f64 = 0.9;

/// Scales the model's self-reported confidence by how much infrastructure
/// actually backs it.
pub fn adjust_confidence(evaluation: Option<&QuestionEvaluation>, model: Option<&WorkloadModel>) -> f64 {
    let (Some(evaluation), Some(model)) = (evaluation, model) else {
        return 0.0;
    };
    let mut c = evaluation.confidence;
    let count = model.resources.len();
    if count == 0 {
        c = (c * NO_RESOURCES_FACTOR).min(NO_RESOURCES_CAP);
    } else if count < FEW_RESOURCES_THRESHOLD {
        c *= FEW_RESOURCES_FACTOR;
    }
    if evaluation.evidence.iter().all(|e| e.resources.is_empty()) {
        c *= UNGROUNDED_EVIDENCE_FACTOR;
    }
    if model.source_type != SourceType::Plan {
        c *= NON_PLAN_FACTOR;
    }
    if c.is_nan() {
        return 0.0;
    }
    c.clamp(0.0, 1.0)
}

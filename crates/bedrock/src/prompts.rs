use serde_json::{json, Value as Json};
use waffle_core::{Resource, Risk, WafrQuestion, WorkloadModel};

/// Upper bound on resources described in a single prompt.
pub const MAX_PROMPT_RESOURCES: usize = 150;
const MAX_PROPERTY_CHARS: usize = 1500;

pub const SYSTEM_PROMPT: &str = "You are an AWS Well-Architected Framework reviewer. You analyze Terraform \
infrastructure-as-code and answer strictly from the evidence in the configuration. Always reply with a single \
JSON object and nothing else.";

fn compact_properties(resource: &Resource) -> Json {
    let raw = Json::Object(resource.properties.clone()).to_string();
    if raw.len() <= MAX_PROPERTY_CHARS {
        return Json::Object(resource.properties.clone());
    }
    let mut cut = MAX_PROPERTY_CHARS;
    while !raw.is_char_boundary(cut) {
        cut -= 1;
    }
    Json::String(format!("{}...(truncated)", &raw[..cut]))
}

/// One JSON object per line describing `resources`, capped at
/// [`MAX_PROMPT_RESOURCES`].
pub fn resource_digest(resources: &[Resource]) -> String {
    let mut lines: Vec<String> = resources
        .iter()
        .take(MAX_PROMPT_RESOURCES)
        .map(|r| {
            json!({
                "address": r.address,
                "type": r.resource_type,
                "module": r.module_path,
                "file": r.source_file,
                "depends_on": r.dependencies,
                "properties": compact_properties(r),
            })
            .to_string()
        })
        .collect();
    if resources.len() > MAX_PROMPT_RESOURCES {
        lines.push(format!("... {} more resources omitted", resources.len() - MAX_PROMPT_RESOURCES));
    }
    lines.join("\n")
}

pub fn semantic_analysis(resources: &[Resource]) -> String {
    format!(
        r#"Analyze the following Terraform resources ({count} total) and describe the architecture.

Resources:
{digest}

Reply with JSON of this shape:
{{
  "summary": "one paragraph describing the workload",
  "architecture_patterns": ["..."],
  "security_observations": ["..."],
  "reliability_observations": ["..."],
  "performance_observations": ["..."],
  "cost_observations": ["..."],
  "operational_observations": ["..."],
  "recommendations": ["..."]
}}"#,
        count = resources.len(),
        digest = resource_digest(resources),
    )
}

pub fn question_evaluation(question: &WafrQuestion, model: &WorkloadModel) -> String {
    let choices = question
        .choices
        .iter()
        .map(|c| format!("- {}: {}{}", c.id, c.title, if c.description.is_empty() { String::new() } else { format!(" ({})", c.description) }))
        .collect::<Vec<_>>()
        .join("\n");
    let semantic = model
        .metadata
        .get("semantic_analysis")
        .and_then(|v| v.get("summary"))
        .and_then(Json::as_str)
        .map(|s| format!("\nArchitecture summary: {s}\n"))
        .unwrap_or_default();
    format!(
        r#"Evaluate this AWS Well-Architected question against the infrastructure below.

Pillar: {pillar}
Question {id}: {title}
{description}

Choices:
{choices}
{semantic}
Infrastructure ({count} resources, source: {source}):
{digest}

Select only the choices the configuration demonstrably implements. Reply with JSON:
{{
  "selected_choices": ["choice_id"],
  "evidence": [{{"choice_id": "choice_id", "explanation": "why", "resources": ["resource.address"], "confidence": 0.0}}],
  "confidence": 0.0,
  "notes": "short rationale"
}}
Confidence values must be between 0 and 1."#,
        pillar = question.pillar.title(),
        id = question.id,
        title = question.title,
        description = question.description,
        count = model.resources.len(),
        source = model.source_type,
        digest = resource_digest(&model.resources),
    )
}

pub fn improvement_guidance(risk: &Risk, resources: &[Resource]) -> String {
    let missing = risk
        .missing_best_practices
        .iter()
        .map(|bp| format!("- {}: {}", bp.id, bp.title))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"A Well-Architected review found a {severity} risk.

Pillar: {pillar}
Question {id}: {title}
Risk: {description}

Missing best practices:
{missing}

Affected resources:
{digest}

Propose concrete Terraform-level remediation. Reply with JSON:
{{
  "description": "what to change and why",
  "best_practices": [{{"id": "...", "title": "...", "description": "..."}}],
  "implementation_steps": ["..."],
  "estimated_effort": "LOW|MEDIUM|HIGH"
}}"#,
        severity = risk.severity,
        pillar = risk.pillar.title(),
        id = risk.question.id,
        title = risk.question.title,
        description = risk.description,
        digest = resource_digest(resources),
    )
}

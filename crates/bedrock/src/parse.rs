use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::sync::OnceLock;
use waffle_core::{BestPractice, Effort, Error, Evidence, ImprovementPlanItem, QuestionEvaluation, Result, Risk, WafrQuestion};

const RESPONSE: &str = "bedrock-response";

/// Model view of the workload as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticAnalysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub architecture_patterns: Vec<String>,
    #[serde(default)]
    pub security_observations: Vec<String>,
    #[serde(default)]
    pub reliability_observations: Vec<String>,
    #[serde(default)]
    pub performance_observations: Vec<String>,
    #[serde(default)]
    pub cost_observations: Vec<String>,
    #[serde(default)]
    pub operational_observations: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Set when the reply only parsed in part.
    #[serde(default)]
    pub partial: bool,
}

/// Drops a surrounding triple-backtick fence (optionally tagged).
pub fn strip_fences(text: &str) -> &str {
    let t = text.trim();
    let Some(mut body) = t.strip_prefix("```") else {
        return t;
    };
    if let Some(nl) = body.find('\n') {
        let tag = body[..nl].trim();
        if tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            body = &body[nl + 1..];
        }
    }
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Outermost `{...}` span, for replies with prose around the object.
fn object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn decode<T: for<'de> Deserialize<'de>>(text: &str, context: &str) -> Result<T> {
    let body = strip_fences(text);
    match serde_json::from_str(body) {
        Ok(v) => Ok(v),
        Err(first) => match object_span(body).map(serde_json::from_str::<T>) {
            Some(Ok(v)) => Ok(v),
            _ => Err(Error::parsing(RESPONSE, context, first)),
        },
    }
}

fn check_unit(value: f64, what: &str) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::parsing(RESPONSE, what, Error::validation("confidence", value, "must be between 0 and 1")))
    }
}

pub fn parse_semantic_analysis(text: &str) -> SemanticAnalysis {
    if let Ok(analysis) = decode::<SemanticAnalysis>(text, "semantic analysis") {
        return analysis;
    }
    partial_semantic_analysis(text)
}

fn string_list(v: Option<&Json>) -> Vec<String> {
    match v {
        Some(Json::Array(items)) => items.iter().filter_map(|i| i.as_str().map(str::to_string)).collect(),
        Some(Json::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn field_regexes() -> &'static (Regex, Regex, Regex) {
    static RE: OnceLock<(Regex, Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        (
            Regex::new(r#""summary"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("summary pattern"),
            Regex::new(r#""(\w+)"\s*:\s*\[([^\]]*)"#).expect("list pattern"),
            Regex::new(r#""((?:[^"\\]|\\.)*)""#).expect("string pattern"),
        )
    })
}

/// Best-effort recovery from a reply that isn't valid JSON: loose JSON
/// values first, then field-by-field pattern matching.
fn partial_semantic_analysis(text: &str) -> SemanticAnalysis {
    let body = strip_fences(text);
    let mut out = SemanticAnalysis { partial: true, ..Default::default() };

    if let Some(Ok(Json::Object(map))) = object_span(body).map(serde_json::from_str::<Json>) {
        out.summary = map.get("summary").and_then(Json::as_str).unwrap_or_default().to_string();
        out.architecture_patterns = string_list(map.get("architecture_patterns"));
        out.security_observations = string_list(map.get("security_observations"));
        out.reliability_observations = string_list(map.get("reliability_observations"));
        out.performance_observations = string_list(map.get("performance_observations"));
        out.cost_observations = string_list(map.get("cost_observations"));
        out.operational_observations = string_list(map.get("operational_observations"));
        out.recommendations = string_list(map.get("recommendations"));
        return out;
    }

    let (summary_re, list_re, string_re) = field_regexes();
    if let Some(c) = summary_re.captures(body) {
        out.summary = c[1].replace("\\\"", "\"").replace("\\n", "\n");
    }
    for c in list_re.captures_iter(body) {
        let items: Vec<String> = string_re.captures_iter(&c[2]).map(|s| s[1].replace("\\\"", "\"")).collect();
        let slot = match &c[1] {
            "architecture_patterns" => &mut out.architecture_patterns,
            "security_observations" => &mut out.security_observations,
            "reliability_observations" => &mut out.reliability_observations,
            "performance_observations" => &mut out.performance_observations,
            "cost_observations" => &mut out.cost_observations,
            "operational_observations" => &mut out.operational_observations,
            "recommendations" => &mut out.recommendations,
            _ => continue,
        };
        *slot = items;
    }
    if out.summary.is_empty() {
        out.summary = body.chars().take(500).collect();
    }
    out
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChoiceRef {
    Id(String),
    Object { id: String },
}

impl ChoiceRef {
    fn id(&self) -> &str {
        match self {
            ChoiceRef::Id(id) | ChoiceRef::Object { id } => id,
        }
    }
}

#[derive(Deserialize)]
struct RawEvidence {
    choice_id: String,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    resources: Vec<String>,
    #[serde(default)]
    confidence: f64,
}

#[derive(Deserialize)]
struct RawEvaluation {
    #[serde(default)]
    selected_choices: Vec<ChoiceRef>,
    #[serde(default)]
    evidence: Vec<RawEvidence>,
    confidence: f64,
    #[serde(default)]
    notes: String,
}

/// Strict parse; callers degrade on error. Unknown choice ids are dropped.
pub fn parse_evaluation(question: &WafrQuestion, text: &str) -> Result<QuestionEvaluation> {
    let raw: RawEvaluation = decode(text, "question evaluation")?;
    check_unit(raw.confidence, "question evaluation confidence")?;
    for e in &raw.evidence {
        check_unit(e.confidence, "evidence confidence")?;
    }
    let mut selected = Vec::new();
    for r in &raw.selected_choices {
        if let Some(choice) = question.choice(r.id()) {
            if !selected.iter().any(|c: &waffle_core::Choice| c.id == choice.id) {
                selected.push(choice.clone());
            }
        }
    }
    Ok(QuestionEvaluation {
        question: question.clone(),
        selected_choices: selected,
        evidence: raw
            .evidence
            .into_iter()
            .map(|e| Evidence { choice_id: e.choice_id, explanation: e.explanation, resources: e.resources, confidence: e.confidence })
            .collect(),
        confidence: raw.confidence,
        notes: raw.notes,
    })
}

/// Placeholder used when a reply can't be understood.
pub fn degraded_evaluation(question: &WafrQuestion, reason: &str) -> QuestionEvaluation {
    QuestionEvaluation {
        question: question.clone(),
        selected_choices: Vec::new(),
        evidence: Vec::new(),
        confidence: 0.0,
        notes: format!("Automated evaluation failed: {reason}"),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPractice {
    Title(String),
    Full {
        #[serde(default)]
        id: String,
        title: String,
        #[serde(default)]
        description: String,
    },
}

#[derive(Deserialize)]
struct RawGuidance {
    description: String,
    #[serde(default)]
    best_practices: Vec<RawPractice>,
    #[serde(default)]
    implementation_steps: Vec<String>,
    #[serde(default)]
    estimated_effort: Option<String>,
}

fn parse_effort(raw: Option<&str>) -> Option<Effort> {
    match raw?.trim().to_ascii_uppercase().as_str() {
        "LOW" => Some(Effort::Low),
        "MEDIUM" => Some(Effort::Medium),
        "HIGH" => Some(Effort::High),
        _ => None,
    }
}

pub fn parse_guidance(risk: &Risk, text: &str) -> Result<ImprovementPlanItem> {
    let raw: RawGuidance = decode(text, "improvement guidance")?;
    let mut description = raw.description.trim().to_string();
    if !raw.implementation_steps.is_empty() {
        description.push_str("\n\nImplementation steps:");
        for (i, step) in raw.implementation_steps.iter().enumerate() {
            description.push_str(&format!("\n{}. {}", i + 1, step));
        }
    }
    let mut best_practices: Vec<BestPractice> = raw
        .best_practices
        .into_iter()
        .enumerate()
        .map(|(i, p)| match p {
            RawPractice::Title(title) => BestPractice { id: format!("{}-bp-{}", risk.question.id, i + 1), title, description: String::new() },
            RawPractice::Full { id, title, description } => BestPractice {
                id: if id.is_empty() { format!("{}-bp-{}", risk.question.id, i + 1) } else { id },
                title,
                description,
            },
        })
        .collect();
    if best_practices.is_empty() {
        best_practices = risk.missing_best_practices.clone();
    }
    let missing = risk.missing_best_practices.len();
    Ok(ImprovementPlanItem {
        id: format!("improvement-{}", risk.question.id),
        risk: risk.clone(),
        description,
        best_practices,
        affected_resources: risk.affected_resources.clone(),
        priority: risk.severity.priority(missing),
        estimated_effort: parse_effort(raw.estimated_effort.as_deref())
            .unwrap_or_else(|| Effort::estimate(missing, risk.affected_resources.len())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use waffle_core::{Choice, Pillar, RiskLevel};

    fn question() -> WafrQuestion {
        WafrQuestion {
            id: "sec_data_1".into(),
            pillar: Pillar::Security,
            title: "How do you protect data at rest?".into(),
            description: String::new(),
            best_practices: Vec::new(),
            choices: vec![
                Choice { id: "sec_data_1_enc".into(), title: "Encrypt at rest".into(), description: String::new() },
                Choice { id: "sec_data_1_keys".into(), title: "Manage keys".into(), description: String::new() },
                Choice { id: "sec_data_1_no".into(), title: "None of these".into(), description: String::new() },
            ],
        }
    }

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("  {\"a\":1} "), "{\"a\":1}");
        let inner = r#"{"notes":"use ```hcl``` blocks"}"#;
        assert_eq!(strip_fences(inner), inner);
    }

    #[test]
    fn evaluation_keeps_backticks_inside_strings() {
        let reply = r#"{"selected_choices":["sec_data_1_enc"],"evidence":[],"confidence":0.8,"notes":"wrap policies in ```hcl``` blocks"}"#;
        let e = parse_evaluation(&question(), reply).unwrap();
        assert_eq!(e.selected_choice_ids(), vec!["sec_data_1_enc"]);
        assert_eq!(e.notes, "wrap policies in ```hcl``` blocks");
    }

    #[test]
    fn evaluation_parses_prose_wrapped_fence() {
        let reply = "Here you go:\n```json\n{\"selected_choices\": [\"sec_data_1_enc\"], \"confidence\": 0.6}\n```\nthanks";
        let e = parse_evaluation(&question(), reply).unwrap();
        assert_eq!(e.selected_choice_ids(), vec!["sec_data_1_enc"]);
        assert_eq!(e.confidence, 0.6);
    }

    #[test]
    fn evaluation_parses_fenced_reply() {
        let reply = r#"```json
{"selected_choices": ["sec_data_1_enc", {"id": "sec_data_1_keys"}, "bogus"],
 "evidence": [{"choice_id": "sec_data_1_enc", "explanation": "SSE enabled", "resources": ["aws_s3_bucket.logs"], "confidence": 0.9}],
 "confidence": 0.8, "notes": "buckets encrypted"}
```"#;
        let e = parse_evaluation(&question(), reply).unwrap();
        assert_eq!(e.selected_choice_ids(), vec!["sec_data_1_enc", "sec_data_1_keys"]);
        assert_eq!(e.evidence[0].resources, vec!["aws_s3_bucket.logs"]);
        assert_eq!(e.confidence, 0.8);
    }

    #[test]
    fn out_of_range_confidence_is_a_parse_error() {
        let err = parse_evaluation(&question(), r#"{"selected_choices": [], "confidence": 1.7}"#).unwrap_err();
        assert!(matches!(err, Error::IacParsing { .. }));
        let err = parse_evaluation(
            &question(),
            r#"{"selected_choices": [], "confidence": 0.5, "evidence": [{"choice_id": "x", "confidence": -0.1}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::IacParsing { .. }));
    }

    #[test]
    fn semantic_analysis_falls_back_to_partial() {
        let full = parse_semantic_analysis(r#"{"summary": "three tier app", "architecture_patterns": ["vpc"]}"#);
        assert!(!full.partial);
        assert_eq!(full.architecture_patterns, vec!["vpc"]);

        let broken = r#"```json
{"summary": "static site on S3", "security_observations": ["public bucket", "no logging"], "recommendations": ["enable
```"#;
        let partial = parse_semantic_analysis(broken);
        assert!(partial.partial);
        assert_eq!(partial.summary, "static site on S3");
        assert_eq!(partial.security_observations, vec!["public bucket", "no logging"]);

        let prose = parse_semantic_analysis("The workload is a small serverless API.");
        assert!(prose.partial);
        assert_eq!(prose.summary, "The workload is a small serverless API.");
    }

    #[test]
    fn guidance_adopts_reply_and_keeps_priority_rule() {
        let q = question();
        let risk = Risk {
            id: "risk-sec_data_1".into(),
            question: q.clone(),
            pillar: Pillar::Security,
            severity: RiskLevel::High,
            description: "data at rest".into(),
            affected_resources: vec!["aws_s3_bucket.logs".into()],
            missing_best_practices: vec![BestPractice::from(&q.choices[0]), BestPractice::from(&q.choices[1])],
        };
        let item = parse_guidance(
            &risk,
            r#"{"description": "Enable SSE-KMS", "best_practices": ["Use KMS"], "implementation_steps": ["add kms key"], "estimated_effort": "medium"}"#,
        )
        .unwrap();
        assert_eq!(item.id, "improvement-sec_data_1");
        assert_eq!(item.priority, 120);
        assert_eq!(item.estimated_effort, Effort::Medium);
        assert!(item.description.starts_with("Enable SSE-KMS"));
        assert!(item.description.contains("1. add kms key"));
        assert_eq!(item.best_practices[0].title, "Use KMS");

        assert!(parse_guidance(&risk, "not json at all").is_err());
    }
}

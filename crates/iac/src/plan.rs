use serde::Deserialize;
use serde_json::Value as Json;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};
use waffle_core::{cancellable, CancellationToken, Error, Properties, Resource, Result, Sentinel, SourceType, WorkloadModel};
use waffle_redact::Redactor;

use crate::convert::normalize;
use crate::runner::{self, Runner};

#[derive(Debug, Deserialize)]
struct PlanDocument {
    #[serde(default)]
    format_version: String,
    #[serde(default)]
    terraform_version: String,
    planned_values: Option<PlannedValues>,
}

#[derive(Debug, Deserialize)]
struct PlannedValues {
    root_module: Option<PlanModule>,
}

#[derive(Debug, Default, Deserialize)]
struct PlanModule {
    #[serde(default)]
    resources: Vec<PlanResource>,
    #[serde(default)]
    child_modules: Vec<PlanModule>,
}

#[derive(Debug, Deserialize)]
struct PlanResource {
    address: String,
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(default)]
    values: Option<Json>,
}

/// `module.a.module.b.aws_x.y` -> `module.a.module.b`.
pub fn module_path(address: &str) -> String {
    let segments: Vec<&str> = address.split('.').collect();
    let mut path = Vec::new();
    let mut i = 0;
    while i + 1 < segments.len() && segments[i] == "module" {
        path.push(format!("module.{}", segments[i + 1]));
        i += 2;
    }
    path.join(".")
}

fn collect(module: PlanModule, redactor: &Redactor, out: &mut Vec<Resource>, findings: &mut BTreeSet<String>) {
    for pr in module.resources {
        let props = match pr.values.map(normalize) {
            Some(Json::Object(map)) => map,
            _ => Properties::new(),
        };
        let (properties, found) = redactor.redact_properties(&props);
        findings.extend(found);
        let mut r = Resource::new(pr.resource_type, pr.address).with_properties(properties);
        r.is_from_plan = true;
        r.module_path = module_path(&r.address);
        out.push(r);
    }
    for child in module.child_modules {
        collect(child, redactor, out, findings);
    }
}

/// Builds a model from `terraform show -json` output.
pub fn parse_plan_json(label: &str, bytes: &[u8], redactor: &Redactor) -> Result<WorkloadModel> {
    let doc: PlanDocument =
        serde_json::from_slice(bytes).map_err(|e| Error::parsing(label, "decoding plan JSON", e))?;
    let root = doc
        .planned_values
        .ok_or_else(|| Error::parsing(label, "missing planned_values", Error::from(Sentinel::InvalidPlanFile)))?
        .root_module
        .unwrap_or_default();

    let mut resources = Vec::new();
    let mut findings = BTreeSet::new();
    collect(root, redactor, &mut resources, &mut findings);

    let mut model = WorkloadModel::new("terraform", SourceType::Plan, resources);
    model.metadata.insert("plan_file".into(), Json::from(label));
    model.metadata.insert("format_version".into(), Json::from(doc.format_version));
    model.metadata.insert("terraform_version".into(), Json::from(doc.terraform_version));
    model.metadata.insert("resource_count".into(), Json::from(model.resources.len()));
    if !findings.is_empty() {
        model.metadata.insert("redaction_findings".into(), Json::from(findings.into_iter().collect::<Vec<_>>()));
    }
    debug!(plan = label, resources = model.resources.len(), "parsed plan");
    Ok(model)
}

fn looks_like_json(bytes: &[u8]) -> bool {
    bytes.iter().find(|b| !b.is_ascii_whitespace()).is_some_and(|b| *b == b'{')
}

/// Reads a plan file, rendering binary plans through terraform/tofu first.
pub async fn parse_plan_file(
    path: &Path,
    working_dir: &Path,
    runner: Option<Runner>,
    redactor: &Redactor,
    cancel: &CancellationToken,
) -> Result<WorkloadModel> {
    let bytes = cancellable(cancel, async { tokio::fs::read(path).await.map_err(Error::from) })
        .await
        .map_err(|e| match e {
            Error::Cancelled => e,
            other => Error::file(path, "read", other),
        })?;
    let label = path.display().to_string();
    if looks_like_json(&bytes) {
        return parse_plan_json(&label, &bytes, redactor);
    }
    let r = runner::pick_runner(runner)
        .map_err(|e| Error::parsing(&label, "plan is not JSON and cannot be rendered", e))?;
    info!(plan = %label, runner = r.bin(), "plan is binary, rendering with show -json");
    let rendered = runner::show_json(r, path, working_dir, cancel).await?;
    parse_plan_json(&label, &rendered, redactor)
}

use serde_json::Value as Json;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};
use waffle_core::{CancellationToken, Resource, ResourceGraph, Result, SourceType, WorkloadModel};
use waffle_redact::Redactor;

use crate::files::{self, FileLimits, IacFile};
use crate::runner::Runner;
use crate::{deps, merge, plan, tf};

/// Turns a Terraform working directory (and optional plan) into a
/// [`WorkloadModel`].
#[derive(Clone)]
pub struct IacAnalyzer {
    redactor: Arc<Redactor>,
    limits: FileLimits,
    runner: Option<Runner>,
}

impl IacAnalyzer {
    pub fn new(redactor: Arc<Redactor>, limits: FileLimits) -> Self {
        Self { redactor, limits, runner: None }
    }

    pub fn with_runner(mut self, runner: Runner) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn limits(&self) -> FileLimits {
        self.limits
    }

    pub async fn retrieve_files(&self, working_dir: &Path, cancel: &CancellationToken) -> Result<Vec<IacFile>> {
        files::retrieve_files(working_dir, &self.limits, &self.redactor, cancel).await
    }

    pub fn validate_template(&self, files: &[IacFile]) -> Result<()> {
        tf::validate(files)
    }

    pub fn parse_hcl(&self, files: &[IacFile]) -> Result<WorkloadModel> {
        let parsed = tf::parse_files(files, &self.redactor)?;
        let terraform_files = files.iter().filter(|f| f.is_terraform()).count();
        let mut model = WorkloadModel::new("terraform", SourceType::Hcl, parsed.resources);
        model.metadata.insert("file_count".into(), Json::from(files.len()));
        model.metadata.insert("terraform_file_count".into(), Json::from(terraform_files));
        model.metadata.insert("module_count".into(), Json::from(parsed.modules.len()));
        model.metadata.insert("modules".into(), serde_json::to_value(&parsed.modules)?);
        if !parsed.findings.is_empty() {
            model.metadata.insert("redaction_findings".into(), Json::from(parsed.findings.into_iter().collect::<Vec<_>>()));
        }
        Ok(model)
    }

    pub async fn parse_plan(&self, plan_file: &Path, working_dir: &Path, cancel: &CancellationToken) -> Result<WorkloadModel> {
        plan::parse_plan_file(plan_file, working_dir, self.runner, &self.redactor, cancel).await
    }

    pub fn merge_models(&self, plan: Option<WorkloadModel>, source: Option<WorkloadModel>) -> Result<WorkloadModel> {
        merge::merge_models(plan, source)
    }

    /// The model's resources, first occurrence per address, in order.
    pub fn extract_resources(&self, model: &WorkloadModel) -> Vec<Resource> {
        let mut seen = HashSet::new();
        model.resources.iter().filter(|r| seen.insert(r.address.as_str())).cloned().collect()
    }

    pub fn infer_relationships(&self, resources: &[Resource]) -> ResourceGraph {
        deps::infer_relationships(resources)
    }

    /// Full pipeline: retrieve, validate, parse plan and HCL, merge, extract
    /// and link.
    #[instrument(skip_all, fields(dir = %working_dir.display()))]
    pub async fn analyze(
        &self,
        working_dir: &Path,
        plan_file: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<WorkloadModel> {
        let files = self.retrieve_files(working_dir, cancel).await?;
        self.validate_template(&files)?;
        let plan_model = match plan_file {
            Some(p) => Some(self.parse_plan(p, working_dir, cancel).await?),
            None => None,
        };
        let source_model = self.parse_hcl(&files)?;
        let mut model = match plan_model {
            Some(p) => self.merge_models(Some(p), Some(source_model))?,
            None => source_model,
        };

        let resources = self.extract_resources(&model);
        let graph = self.infer_relationships(&resources);
        model.resources = graph.nodes().cloned().collect();
        model.metadata.insert("resource_count".into(), Json::from(model.resources.len()));
        model.metadata.insert("relationship_count".into(), Json::from(graph.edge_count()));
        model.metadata.insert("has_dependency_cycle".into(), Json::from(graph.dependency_order().is_err()));
        model.graph = graph;
        info!(
            resources = model.resources.len(),
            edges = model.graph.edge_count(),
            source = %model.source_type,
            "IaC analysis complete"
        );
        Ok(model)
    }
}

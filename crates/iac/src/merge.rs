use serde_json::Value as Json;
use std::collections::HashMap;
use tracing::debug;
use waffle_core::{Error, Result, Sentinel, SourceType, WorkloadModel};

pub const MERGE_STRATEGY: &str = "configuration_first";

/// Merges a plan model into a source model. Source declarations win; the
/// plan only fills gaps and contributes resources the source doesn't name.
pub fn merge_models(plan: Option<WorkloadModel>, source: Option<WorkloadModel>) -> Result<WorkloadModel> {
    let (plan, source) = match (plan, source) {
        (None, None) => {
            return Err(Error::parsing("", "merging models: neither plan nor source model", Error::from(Sentinel::NoFilesProvided)))
        }
        (Some(plan), None) => return Ok(plan),
        (None, Some(source)) => return Ok(source),
        (Some(plan), Some(source)) => (plan, source),
    };

    let source_count = source.resources.len();
    let plan_count = plan.resources.len();
    let mut resources = source.resources;
    let by_address: HashMap<String, usize> =
        resources.iter().enumerate().map(|(i, r)| (r.address.clone(), i)).collect();

    let mut plan_only = 0usize;
    for p in plan.resources {
        match by_address.get(&p.address) {
            Some(&i) => {
                let r = &mut resources[i];
                for (k, v) in p.properties {
                    r.properties.entry(k).or_insert(v);
                }
                if p.dependencies.len() > r.dependencies.len() {
                    r.dependencies = p.dependencies;
                }
                r.is_from_plan = true;
                if r.module_path.is_empty() {
                    r.module_path = p.module_path;
                }
            }
            None => {
                plan_only += 1;
                resources.push(p);
            }
        }
    }

    let mut metadata = source.metadata;
    for (k, v) in plan.metadata {
        metadata.entry(k).or_insert(v);
    }
    metadata.insert("merge_strategy".into(), Json::from(MERGE_STRATEGY));
    metadata.insert("source_resource_count".into(), Json::from(source_count));
    metadata.insert("plan_resource_count".into(), Json::from(plan_count));
    metadata.insert("plan_only_resource_count".into(), Json::from(plan_only));
    debug!(source = source_count, plan = plan_count, plan_only, "merged plan into source model");

    let mut merged = WorkloadModel::new(source.framework, SourceType::HclEnhanced, resources);
    merged.metadata = metadata;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use waffle_core::Resource;

    fn hcl_model() -> WorkloadModel {
        let mut bucket = Resource::new("aws_s3_bucket", "aws_s3_bucket.logs")
            .with_properties(json!({"bucket": "acme-logs", "acl": "${var.acl}"}).as_object().cloned().unwrap());
        bucket.source_file = "main.tf".into();
        bucket.source_line = 12;
        let mut m = WorkloadModel::new("terraform", SourceType::Hcl, vec![bucket]);
        m.metadata.insert("file_count".into(), json!(3));
        m
    }

    fn plan_model() -> WorkloadModel {
        let mut bucket = Resource::new("aws_s3_bucket", "aws_s3_bucket.logs")
            .with_properties(json!({"bucket": "acme-logs-plan", "acl": "private", "arn": "arn:aws:s3:::acme"}).as_object().cloned().unwrap());
        bucket.is_from_plan = true;
        bucket.dependencies = vec!["aws_kms_key.k".into()];
        let mut extra = Resource::new("aws_vpc", "module.net.aws_vpc.main");
        extra.is_from_plan = true;
        extra.module_path = "module.net".into();
        let mut m = WorkloadModel::new("terraform", SourceType::Plan, vec![bucket, extra]);
        m.metadata.insert("file_count".into(), json!(99));
        m.metadata.insert("terraform_version".into(), json!("1.7.5"));
        m
    }

    #[test]
    fn configuration_first_merge() {
        let merged = merge_models(Some(plan_model()), Some(hcl_model())).unwrap();
        assert_eq!(merged.source_type, SourceType::HclEnhanced);
        assert_eq!(merged.resources.len(), 2);

        let bucket = &merged.resources[0];
        assert_eq!(bucket.properties["bucket"], json!("acme-logs"));
        assert_eq!(bucket.properties["acl"], json!("${var.acl}"));
        assert_eq!(bucket.properties["arn"], json!("arn:aws:s3:::acme"));
        assert_eq!(bucket.dependencies, vec!["aws_kms_key.k".to_string()]);
        assert!(bucket.is_from_plan);
        assert_eq!((bucket.source_file.as_str(), bucket.source_line), ("main.tf", 12));

        assert_eq!(merged.resources[1].address, "module.net.aws_vpc.main");
        assert_eq!(merged.metadata["file_count"], json!(3));
        assert_eq!(merged.metadata["terraform_version"], json!("1.7.5"));
        assert_eq!(merged.metadata["merge_strategy"], json!("configuration_first"));
        assert_eq!(merged.metadata["source_resource_count"], json!(1));
        assert_eq!(merged.metadata["plan_resource_count"], json!(2));
        assert_eq!(merged.metadata["plan_only_resource_count"], json!(1));
    }

    #[test]
    fn single_side_passes_through() {
        let only_plan = merge_models(Some(plan_model()), None).unwrap();
        assert_eq!(only_plan.source_type, SourceType::Plan);
        let only_source = merge_models(None, Some(hcl_model())).unwrap();
        assert_eq!(only_source.source_type, SourceType::Hcl);
        let err = merge_models(None, None).unwrap_err();
        assert!(matches!(err, Error::IacParsing { .. }));
    }
}

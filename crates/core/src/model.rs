use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as Json};
use std::collections::HashSet;
use std::fmt;

use crate::graph::ResourceGraph;

pub type Properties = JsonMap<String, Json>;

/// A declared cloud resource, keyed by its Terraform address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub address: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub source_file: String,
    #[serde(default)]
    pub source_line: usize,
    #[serde(default)]
    pub is_from_plan: bool,
    #[serde(default)]
    pub module_path: String,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            id: address.clone(),
            resource_type: resource_type.into(),
            address,
            properties: Properties::new(),
            dependencies: Vec::new(),
            source_file: String::new(),
            source_line: 0,
            is_from_plan: false,
            module_path: String::new(),
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn is_data_source(&self) -> bool {
        self.address.starts_with("data.") || self.address.contains(".data.")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Plan,
    #[default]
    Hcl,
    HclEnhanced,
    Merged,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Plan => "plan",
            SourceType::Hcl => "hcl",
            SourceType::HclEnhanced => "hcl_enhanced",
            SourceType::Merged => "merged",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the review knows about the workload's infrastructure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkloadModel {
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub graph: ResourceGraph,
    pub framework: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub metadata: Properties,
}

impl WorkloadModel {
    pub fn new(framework: impl Into<String>, source_type: SourceType, resources: Vec<Resource>) -> Self {
        Self {
            resources,
            graph: ResourceGraph::default(),
            framework: framework.into(),
            source_type,
            metadata: Properties::new(),
        }
    }

    pub fn resource(&self, address: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.address == address)
    }

    /// Resources whose Terraform type starts with any of `prefixes`.
    pub fn resources_with_type_prefix<'a>(&'a self, prefixes: &'a [&'a str]) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources
            .iter()
            .filter(move |r| prefixes.iter().any(|p| r.resource_type.starts_with(p)))
    }

    pub fn resource_types(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.resources
            .iter()
            .filter(|r| seen.insert(r.resource_type.as_str()))
            .map(|r| r.resource_type.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&SourceType::HclEnhanced).unwrap(), "\"hcl_enhanced\"");
        let parsed: SourceType = serde_json::from_str("\"plan\"").unwrap();
        assert_eq!(parsed, SourceType::Plan);
    }

    #[test]
    fn type_prefix_filter() {
        let model = WorkloadModel::new(
            "terraform",
            SourceType::Hcl,
            vec![
                Resource::new("aws_s3_bucket", "aws_s3_bucket.logs"),
                Resource::new("aws_s3_bucket_policy", "aws_s3_bucket_policy.logs"),
                Resource::new("aws_instance", "aws_instance.web"),
            ],
        );
        let hits: Vec<_> = model.resources_with_type_prefix(&["aws_s3_bucket"]).map(|r| r.address.as_str()).collect();
        assert_eq!(hits, vec!["aws_s3_bucket.logs", "aws_s3_bucket_policy.logs"]);
        assert!(model.resource("aws_instance.web").is_some());
        assert_eq!(model.resource_types().len(), 3);
    }
}

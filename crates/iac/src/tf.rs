use hcl::eval::{Context, Evaluate};
use hcl::{Block, Body, Expression, ObjectKey};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;
use tracing::{debug, warn};
use waffle_core::{Error, Properties, Resource, Result};
use waffle_redact::Redactor;

use crate::convert::hcl_to_json;
use crate::files::IacFile;

/// Nested block names whose contents are kept on the resource.
pub const NESTED_BLOCKS: &[&str] = &[
    "ebs_block_device",
    "root_block_device",
    "lifecycle",
    "timeouts",
    "versioning_configuration",
    "logging",
    "cors_rule",
    "website",
    "filter",
    "tags",
    "ingress",
    "egress",
    "rule",
    "server_side_encryption_configuration",
    "apply_server_side_encryption_by_default",
    "server_side_encryption",
    "encryption_configuration",
    "point_in_time_recovery",
    "metadata_options",
    "vpc_config",
    "health_check",
    "expiration",
    "transition",
    "noncurrent_version_expiration",
    "statement",
    "condition",
    "principals",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleCall {
    pub name: String,
    pub source: Option<String>,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Default)]
pub struct ParsedHcl {
    pub resources: Vec<Resource>,
    pub modules: Vec<ModuleCall>,
    pub findings: BTreeSet<String>,
}

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^[ \t]*(resource|data|module)[ \t]+"?([\w-]+)"?(?:[ \t]+"?([\w-]+)"?)?[ \t]*\{"#)
            .expect("block header pattern")
    })
}

fn error_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:line (\d+))|(?:(\d+):\d+)").expect("error line pattern"))
}

/// 1-based header line per `(kind, label, label)`; the last label is empty
/// for modules.
fn header_lines(content: &str) -> HashMap<(String, String, String), usize> {
    let mut out = HashMap::new();
    for cap in header_regex().captures_iter(content) {
        let start = cap.get(0).map(|m| m.start()).unwrap_or(0);
        let line = content[..start].matches('\n').count() + 1;
        let key = (
            cap[1].to_string(),
            cap[2].to_string(),
            cap.get(3).map(|m| m.as_str().to_string()).unwrap_or_default(),
        );
        out.entry(key).or_insert(line);
    }
    out
}

fn syntax_error(file: &str, err: &hcl::Error) -> Error {
    let detail = err.to_string();
    let line = error_line_regex()
        .captures(&detail)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    let summary = detail
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("invalid HCL")
        .to_string();
    Error::TerraformSyntax { file: file.to_string(), line, summary, detail: detail.trim().to_string() }
}

fn parse_body(file: &IacFile) -> Result<Body> {
    hcl::parse(&file.content).map_err(|e| syntax_error(&file.path, &e))
}

/// Parses every `.tf` file and fails on the first syntax error.
pub fn validate(files: &[IacFile]) -> Result<()> {
    let mut first = None;
    for file in files.iter().filter(|f| f.is_terraform()) {
        if let Err(e) = parse_body(file) {
            warn!(file = %file.path, error = %e, "terraform syntax error");
            first.get_or_insert(e);
        }
    }
    match first {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

pub fn parse_files(files: &[IacFile], redactor: &Redactor) -> Result<ParsedHcl> {
    let mut parsed = ParsedHcl::default();
    for file in files.iter().filter(|f| f.is_terraform()) {
        let body = parse_body(file)?;
        let lines = header_lines(&file.content);
        for block in body.blocks() {
            let labels: Vec<&str> = block.labels().iter().map(|l| l.as_str()).collect();
            match (block.identifier(), labels.as_slice()) {
                ("resource", [ty, name, ..]) => {
                    let line = lines.get(&("resource".into(), ty.to_string(), name.to_string())).copied().unwrap_or(0);
                    let r = build_resource(block, ty, format!("{ty}.{name}"), file, line, redactor, &mut parsed.findings);
                    parsed.resources.push(r);
                }
                ("data", [ty, name, ..]) => {
                    let line = lines.get(&("data".into(), ty.to_string(), name.to_string())).copied().unwrap_or(0);
                    let r = build_resource(block, ty, format!("data.{ty}.{name}"), file, line, redactor, &mut parsed.findings);
                    parsed.resources.push(r);
                }
                ("module", [name, ..]) => {
                    let line = lines.get(&("module".into(), name.to_string(), String::new())).copied().unwrap_or(0);
                    let source = block.body().attributes().find(|a| a.key() == "source").and_then(|a| match a.expr() {
                        Expression::String(s) => Some(s.clone()),
                        _ => None,
                    });
                    parsed.modules.push(ModuleCall { name: name.to_string(), source, file: file.path.clone(), line });
                }
                _ => {}
            }
        }
    }
    debug!(resources = parsed.resources.len(), modules = parsed.modules.len(), "parsed HCL");
    Ok(parsed)
}

fn build_resource(
    block: &Block,
    ty: &str,
    address: String,
    file: &IacFile,
    line: usize,
    redactor: &Redactor,
    findings: &mut BTreeSet<String>,
) -> Resource {
    let ctx = Context::new();
    let props = extract_body(block.body(), &ctx);
    let (properties, found) = redactor.redact_properties(&props);
    findings.extend(found);

    let mut r = Resource::new(ty, address).with_properties(properties);
    r.dependencies = explicit_dependencies(block.body());
    r.source_file = file.path.clone();
    r.source_line = line;
    r
}

fn explicit_dependencies(body: &Body) -> Vec<String> {
    let mut deps = Vec::new();
    for attr in body.attributes().filter(|a| a.key() == "depends_on") {
        if let Expression::Array(items) = attr.expr() {
            for item in items {
                let raw = raw_source(item);
                if !raw.is_empty() && !deps.contains(&raw) {
                    deps.push(raw);
                }
            }
        }
    }
    deps
}

fn raw_source(expr: &Expression) -> String {
    hcl::format::to_string(expr).map(|s| s.trim().to_string()).unwrap_or_default()
}

pub(crate) fn extract_body(body: &Body, ctx: &Context) -> Properties {
    let mut props = Properties::new();
    for attr in body.attributes() {
        props.insert(attr.key().to_string(), expr_to_json(attr.expr(), ctx));
    }

    let mut nested: Vec<(String, Vec<Json>)> = Vec::new();
    for block in body.blocks().filter(|b| NESTED_BLOCKS.contains(&b.identifier())) {
        let value = Json::Object(extract_body(block.body(), ctx));
        match nested.iter_mut().find(|(k, _)| k == block.identifier()) {
            Some((_, values)) => values.push(value),
            None => nested.push((block.identifier().to_string(), vec![value])),
        }
    }
    for (key, mut values) in nested {
        let value = if values.len() == 1 { values.remove(0) } else { Json::Array(values) };
        props.insert(key, value);
    }
    props
}

/// Evaluates `expr` without variables; unresolved parts keep their source
/// as `${...}` while arrays and objects keep their shape.
pub(crate) fn expr_to_json(expr: &Expression, ctx: &Context) -> Json {
    if let Ok(v) = expr.evaluate(ctx) {
        return hcl_to_json(v);
    }
    match expr {
        Expression::Array(items) => Json::Array(items.iter().map(|e| expr_to_json(e, ctx)).collect()),
        Expression::Object(obj) => Json::Object(
            obj.iter()
                .map(|(k, v)| (object_key(k), expr_to_json(v, ctx)))
                .collect(),
        ),
        other => Json::String(format!("${{{}}}", raw_source(other))),
    }
}

fn object_key(key: &ObjectKey) -> String {
    match key {
        ObjectKey::Identifier(id) => id.to_string(),
        ObjectKey::Expression(Expression::String(s)) => s.clone(),
        ObjectKey::Expression(e) => raw_source(e),
        #[allow(unreachable_patterns)]
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MAIN: &str = r#"
provider "aws" {
  region = "us-east-1"
}

resource "aws_s3_bucket" "logs" {
  bucket = "acme-logs"
  force_destroy = false

  versioning_configuration {
    status = "Enabled"
  }

  tags = {
    Name = "logs"
    Env  = var.env
  }
}

resource "aws_instance" "web" {
  ami           = data.aws_ami.ubuntu.id
  instance_type = "t3.micro"
  count         = 2

  ebs_block_device {
    device_name = "/dev/sdb"
    volume_size = 20
  }

  ebs_block_device {
    device_name = "/dev/sdc"
    volume_size = 40
  }

  depends_on = [aws_s3_bucket.logs]
}

data "aws_ami" "ubuntu" {
  most_recent = true
}

module "network" {
  source = "./modules/network"
}
"#;

    fn parse(content: &str) -> ParsedHcl {
        parse_files(&[IacFile::new("main.tf", content)], &Redactor::new()).unwrap()
    }

    #[test]
    fn resources_data_and_modules() {
        let parsed = parse(MAIN);
        let addrs: Vec<_> = parsed.resources.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(addrs, vec!["aws_s3_bucket.logs", "aws_instance.web", "data.aws_ami.ubuntu"]);
        assert_eq!(parsed.modules.len(), 1);
        assert_eq!(parsed.modules[0].name, "network");
        assert_eq!(parsed.modules[0].source.as_deref(), Some("./modules/network"));
        assert_eq!(parsed.modules[0].line, 42);
    }

    #[test]
    fn attributes_evaluate_or_keep_source() {
        let parsed = parse(MAIN);
        let bucket = &parsed.resources[0];
        assert_eq!(bucket.source_line, 6);
        assert_eq!(bucket.source_file, "main.tf");
        assert_eq!(bucket.properties["bucket"], json!("acme-logs"));
        assert_eq!(bucket.properties["versioning_configuration"], json!({"status": "Enabled"}));
        assert_eq!(bucket.properties["tags"]["Name"], json!("logs"));
        assert_eq!(bucket.properties["tags"]["Env"], json!("${var.env}"));

        let web = &parsed.resources[1];
        assert_eq!(web.properties["ami"], json!("${data.aws_ami.ubuntu.id}"));
        assert_eq!(web.properties["count"], json!(2));
        assert!(web.properties["count"].is_i64());
    }

    #[test]
    fn repeated_nested_blocks_become_a_list() {
        let parsed = parse(MAIN);
        let devices = parsed.resources[1].properties["ebs_block_device"].as_array().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1]["volume_size"], json!(40));
    }

    #[test]
    fn depends_on_becomes_explicit_dependency() {
        let parsed = parse(MAIN);
        assert_eq!(parsed.resources[1].dependencies, vec!["aws_s3_bucket.logs".to_string()]);
    }

    #[test]
    fn properties_are_redacted() {
        let src = r#"
resource "aws_db_instance" "db" {
  engine   = "postgres"
  password = "hunter2hunter2"
}
"#;
        let parsed = parse(src);
        assert_eq!(parsed.resources[0].properties["password"], json!("[REDACTED]"));
        assert!(parsed.findings.contains("Password"));
    }

    #[test]
    fn syntax_errors_name_file_and_line() {
        let files = vec![
            IacFile::new("ok.tf", "resource \"aws_vpc\" \"v\" {}\n"),
            IacFile::new("broken.tf", "resource \"aws_vpc\" \"v\" {\n  cidr_block = \n"),
            IacFile::new("vars.tfvars", "this is not = = hcl"),
        ];
        match validate(&files).unwrap_err() {
            Error::TerraformSyntax { file, summary, .. } => {
                assert_eq!(file, "broken.tf");
                assert!(!summary.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(validate(&files[..1]).is_ok());
    }
}

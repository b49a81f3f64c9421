use serde_json::Value as Json;
use tracing::debug;
use waffle_core::{Resource, ResourceGraph};

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | '"' | '\'' | '[' | ']' | '{' | '}' | '(' | ')')
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// `word` contains `address` as a whole reference: not glued to a longer
/// identifier on the left and ending at the word end, `.` or `[`.
fn contains_address(word: &str, address: &str) -> bool {
    word.match_indices(address).any(|(i, _)| {
        let before_ok = word[..i].chars().next_back().map_or(true, |c| !is_ident(c));
        let after_ok = word[i + address.len()..].chars().next().map_or(true, |c| c == '.' || c == '[');
        before_ok && after_ok
    })
}

fn match_word(word: &str, graph: &ResourceGraph, out: &mut Vec<String>) {
    let mut push = |addr: &str| {
        if !out.iter().any(|a| a == addr) {
            out.push(addr.to_string());
        }
    };
    for node in graph.nodes() {
        if contains_address(word, &node.address) {
            push(&node.address);
        }
    }
    let segments: Vec<&str> = word.trim_start_matches('$').split('.').collect();
    if segments.len() >= 2 {
        let candidate = format!("{}.{}", segments[0], segments[1]);
        if graph.contains(&candidate) {
            push(&candidate);
        }
    }
    if segments.len() >= 3 && segments[0] == "data" {
        let candidate = format!("data.{}.{}", segments[1], segments[2]);
        if graph.contains(&candidate) {
            push(&candidate);
        }
    }
    if segments.len() >= 4 && segments[0] == "module" {
        let candidate = format!("module.{}.{}.{}", segments[1], segments[2], segments[3]);
        if graph.contains(&candidate) {
            push(&candidate);
        }
    }
}

fn scan(value: &Json, graph: &ResourceGraph, out: &mut Vec<String>) {
    match value {
        Json::String(s) => {
            for word in s.split(is_delimiter).filter(|w| w.contains('.')) {
                match_word(word, graph, out);
            }
        }
        Json::Array(items) => items.iter().for_each(|v| scan(v, graph, out)),
        Json::Object(map) => map.values().for_each(|v| scan(v, graph, out)),
        _ => {}
    }
}

/// Addresses `resource` refers to, in first-seen order. Explicit
/// dependencies are kept when their target is known.
pub fn resolve_dependencies(resource: &Resource, graph: &ResourceGraph) -> Vec<String> {
    let mut found = Vec::new();
    for value in resource.properties.values() {
        scan(value, graph, &mut found);
    }
    for dep in &resource.dependencies {
        if graph.contains(dep) && !found.contains(dep) {
            found.push(dep.clone());
        }
    }
    found.retain(|a| a != &resource.address);
    found
}

/// Builds the dependency graph for `resources`; each node's `dependencies`
/// is replaced with what was resolved.
pub fn infer_relationships(resources: &[Resource]) -> ResourceGraph {
    let mut graph = ResourceGraph::from_resources(resources);
    let resolved: Vec<(String, Vec<String>)> = graph
        .nodes()
        .map(|r| (r.address.clone(), resolve_dependencies(r, &graph)))
        .collect();
    for (address, deps) in resolved {
        for dep in &deps {
            graph.add_edge(&address, dep);
        }
        if let Some(node) = graph.node_mut(&address) {
            node.dependencies = deps;
        }
    }
    debug!(nodes = graph.len(), edges = graph.edge_count(), "inferred relationships");
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn res(ty: &str, addr: &str, props: Json) -> Resource {
        Resource::new(ty, addr).with_properties(props.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn interpolated_references_become_edges() {
        let resources = vec![
            res("aws_vpc", "aws_vpc.main", json!({"cidr_block": "10.0.0.0/16"})),
            res("aws_subnet", "aws_subnet.a", json!({"vpc_id": "${aws_vpc.main.id}"})),
            res(
                "aws_instance",
                "aws_instance.web",
                json!({
                    "subnet_id": "${aws_subnet.a.id}",
                    "ami": "${data.aws_ami.ubuntu.id}",
                    "vpc_security_group_ids": ["${aws_security_group.web.id}"]
                }),
            ),
            res("aws_security_group", "aws_security_group.web", json!({"vpc_id": "${aws_vpc.main.id}"})),
            res("aws_ami", "data.aws_ami.ubuntu", json!({"most_recent": true})),
        ];
        let graph = infer_relationships(&resources);
        assert_eq!(graph.dependencies_of("aws_subnet.a"), vec!["aws_vpc.main"]);
        assert_eq!(
            graph.dependencies_of("aws_instance.web"),
            vec!["data.aws_ami.ubuntu", "aws_subnet.a", "aws_security_group.web"]
        );
        assert!(graph.dependencies_of("aws_vpc.main").is_empty());
        assert_eq!(graph.node("aws_instance.web").unwrap().dependencies.len(), 3);
        let dependents = graph.dependents_of("aws_vpc.main");
        assert_eq!(dependents, vec!["aws_subnet.a", "aws_security_group.web"]);
    }

    #[test]
    fn module_and_indexed_references_resolve() {
        let resources = vec![
            res("aws_vpc", "module.net.aws_vpc.main", json!({})),
            res("aws_instance", "aws_instance.web", json!({})),
            res(
                "aws_eip",
                "aws_eip.ip",
                json!({"instance": "${aws_instance.web[0].id}", "vpc": "module.net.aws_vpc.main.id"}),
            ),
        ];
        let graph = infer_relationships(&resources);
        assert_eq!(graph.dependencies_of("aws_eip.ip"), vec!["aws_instance.web", "module.net.aws_vpc.main"]);
    }

    #[test]
    fn bare_literal_reference_resolves() {
        let bucket = res("aws_s3_bucket", "aws_s3_bucket.example", json!({"bucket": "acme-data"}));
        let versioning = res(
            "aws_s3_bucket_versioning",
            "aws_s3_bucket_versioning.example",
            json!({"bucket": "aws_s3_bucket.example.id", "versioning_configuration": {"status": "Enabled"}}),
        );
        let graph = infer_relationships(&[bucket, versioning.clone()]);
        assert_eq!(resolve_dependencies(&versioning, &graph), vec!["aws_s3_bucket.example"]);
        assert_eq!(graph.dependencies_of("aws_s3_bucket_versioning.example"), vec!["aws_s3_bucket.example"]);
        assert!(graph.dependencies_of("aws_s3_bucket.example").is_empty());
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn no_false_match_on_prefixes_or_self() {
        let resources = vec![
            res("aws_s3_bucket", "aws_s3_bucket.logs", json!({"bucket": "${aws_s3_bucket.logs_archive.id}"})),
            res("aws_s3_bucket", "aws_s3_bucket.logs_archive", json!({"name": "${aws_s3_bucket.logs_archive.arn}"})),
        ];
        let graph = infer_relationships(&resources);
        assert_eq!(graph.dependencies_of("aws_s3_bucket.logs"), vec!["aws_s3_bucket.logs_archive"]);
        assert!(graph.dependencies_of("aws_s3_bucket.logs_archive").is_empty());
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn explicit_dependencies_fold_in_only_when_known() {
        let mut web = res("aws_instance", "aws_instance.web", json!({}));
        web.dependencies = vec!["aws_iam_role.app".into(), "aws_iam_role.missing".into()];
        let resources = vec![res("aws_iam_role", "aws_iam_role.app", json!({})), web];
        let graph = infer_relationships(&resources);
        assert_eq!(graph.dependencies_of("aws_instance.web"), vec!["aws_iam_role.app"]);
        assert_eq!(graph.node("aws_instance.web").unwrap().dependencies, vec!["aws_iam_role.app".to_string()]);
    }
}

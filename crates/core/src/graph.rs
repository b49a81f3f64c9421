use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::model::Resource;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("dependency cycle detected at {0}")]
pub struct DependencyCycle(pub String);

/// Resources keyed by address, with `dependent -> dependency` edges.
///
/// Nodes live in an arena; the address map is a sidecar index into it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "GraphRepr", from = "GraphRepr")]
pub struct ResourceGraph {
    graph: DiGraph<Resource, ()>,
    index: HashMap<String, NodeIndex>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a node-only graph; the first resource wins on duplicate addresses.
    pub fn from_resources(resources: &[Resource]) -> Self {
        let mut g = Self::new();
        for r in resources {
            g.add_node(r.clone());
        }
        g
    }

    pub fn add_node(&mut self, resource: Resource) -> bool {
        if self.index.contains_key(&resource.address) {
            return false;
        }
        let address = resource.address.clone();
        let ix = self.graph.add_node(resource);
        self.index.insert(address, ix);
        true
    }

    /// Adds `from -> to`. Both ends must already be nodes; duplicates are ignored.
    pub fn add_edge(&mut self, from: &str, to: &str) -> bool {
        let (Some(&a), Some(&b)) = (self.index.get(from), self.index.get(to)) else {
            return false;
        };
        if self.graph.find_edge(a, b).is_some() {
            return false;
        }
        self.graph.add_edge(a, b, ());
        true
    }

    pub fn contains(&self, address: &str) -> bool {
        self.index.contains_key(address)
    }

    pub fn node(&self, address: &str) -> Option<&Resource> {
        self.index.get(address).map(|&ix| &self.graph[ix])
    }

    pub fn node_mut(&mut self, address: &str) -> Option<&mut Resource> {
        let ix = *self.index.get(address)?;
        Some(&mut self.graph[ix])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Resource> {
        self.graph.node_indices().map(move |ix| &self.graph[ix])
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Addresses `address` depends on, in insertion order.
    pub fn dependencies_of(&self, address: &str) -> Vec<&str> {
        self.neighbours(address, Direction::Outgoing)
    }

    /// Addresses that depend on `address`, in insertion order.
    pub fn dependents_of(&self, address: &str) -> Vec<&str> {
        self.neighbours(address, Direction::Incoming)
    }

    fn neighbours(&self, address: &str, dir: Direction) -> Vec<&str> {
        let Some(&ix) = self.index.get(address) else {
            return Vec::new();
        };
        // petgraph walks adjacency lists newest-first
        let mut out: Vec<&str> = self
            .graph
            .edges_directed(ix, dir)
            .map(|e| {
                let other = if dir == Direction::Outgoing { e.target() } else { e.source() };
                self.graph[other].address.as_str()
            })
            .collect();
        out.reverse();
        out
    }

    /// `address -> [dependency]` for every node with at least one edge.
    pub fn edges(&self) -> BTreeMap<String, Vec<String>> {
        self.index
            .keys()
            .filter_map(|addr| {
                let deps = self.dependencies_of(addr);
                (!deps.is_empty()).then(|| (addr.clone(), deps.into_iter().map(str::to_string).collect()))
            })
            .collect()
    }

    /// Addresses ordered so every dependency precedes its dependents.
    pub fn dependency_order(&self) -> Result<Vec<&str>, DependencyCycle> {
        let ordered = toposort(&self.graph, None)
            .map_err(|cycle| DependencyCycle(self.graph[cycle.node_id()].address.clone()))?;
        Ok(ordered.into_iter().rev().map(|ix| self.graph[ix].address.as_str()).collect())
    }
}

#[derive(Serialize, Deserialize, Default)]
struct GraphRepr {
    #[serde(default)]
    nodes: BTreeMap<String, Resource>,
    #[serde(default)]
    edges: BTreeMap<String, Vec<String>>,
}

impl From<ResourceGraph> for GraphRepr {
    fn from(g: ResourceGraph) -> Self {
        let edges = g.edges();
        let nodes = g.nodes().map(|r| (r.address.clone(), r.clone())).collect();
        GraphRepr { nodes, edges }
    }
}

impl From<GraphRepr> for ResourceGraph {
    fn from(repr: GraphRepr) -> Self {
        let mut g = ResourceGraph::new();
        for (address, mut resource) in repr.nodes {
            resource.address = address;
            g.add_node(resource);
        }
        for (from, deps) in &repr.edges {
            for to in deps {
                g.add_edge(from, to);
            }
        }
        g
    }
}

//! Wiring graph construction and traversal.

use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use bundlewire_core::manifest::parse_resource_ref;
use bundlewire_core::model::{namespace, ResourceGraph, ResourceId};
use bundlewire_core::wiring::{Wire, Wirings};

use crate::resolver::Resolution;

/// A resource in the wiring graph.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct WiredNode {
    pub resource: ResourceId,
    pub name: String,
    pub version: String,
    pub fragment: bool,
    /// Resolved by this run rather than taken from existing wirings.
    pub new: bool,
}

impl WiredNode {
    /// `name/version` identifier.
    pub fn key(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

impl fmt::Display for WiredNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)?;
        if self.fragment {
            write!(f, " (fragment)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WireKind {
    Import,
    RequireBundle,
    Host,
    Generic,
}

impl WireKind {
    fn of(namespace: &str) -> Self {
        match namespace {
            namespace::PACKAGE => WireKind::Import,
            namespace::BUNDLE => WireKind::RequireBundle,
            namespace::HOST => WireKind::Host,
            _ => WireKind::Generic,
        }
    }

    fn header(self) -> &'static str {
        match self {
            WireKind::Import => "[imports]",
            WireKind::RequireBundle => "[required bundles]",
            WireKind::Host => "[fragment hosts]",
            WireKind::Generic => "[capabilities]",
        }
    }
}

/// Edge label: every wire from one resource to one provider of one kind.
#[derive(Debug, Clone)]
pub struct WireEdge {
    pub kind: WireKind,
    /// Package names for imports, namespaces for generic wires.
    pub labels: Vec<String>,
}

/// Resources and the wires between them, backed by petgraph.
pub struct WiringGraph {
    graph: DiGraph<WiredNode, WireEdge>,
    index: HashMap<ResourceId, NodeIndex>,
    pub roots: Vec<NodeIndex>,
}

impl WiringGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            roots: Vec::new(),
        }
    }

    /// Build the graph of `roots` from existing wirings plus the wires a
    /// resolve produced.
    pub fn build(
        resources: &ResourceGraph,
        wirings: &Wirings,
        resolution: Option<&Resolution>,
        roots: &[ResourceId],
    ) -> Self {
        let mut g = Self::new();
        for (&resource, wiring) in wirings {
            let from = g.add_resource(resources, resource, false);
            g.add_wires(resources, from, &wiring.wires);
        }
        if let Some(resolution) = resolution {
            for (&resource, wires) in &resolution.wires {
                let from = g.add_resource(resources, resource, true);
                g.add_wires(resources, from, wires);
            }
        }
        for &root in roots {
            if let Some(&idx) = g.index.get(&root) {
                if !g.roots.contains(&idx) {
                    g.roots.push(idx);
                }
            }
        }
        g
    }

    fn add_resource(&mut self, resources: &ResourceGraph, resource: ResourceId, new: bool) -> NodeIndex {
        let r = resources.resource(resource);
        let idx = self.add_node(WiredNode {
            resource,
            name: r.symbolic_name.clone(),
            version: r.version.to_string(),
            fragment: resources.is_fragment(resource),
            new,
        });
        if new {
            self.graph[idx].new = true;
        }
        idx
    }

    fn add_wires(&mut self, resources: &ResourceGraph, from: NodeIndex, wires: &[Wire]) {
        for wire in wires {
            let provider = wire.provider(resources);
            let to = self.add_resource(resources, provider, false);
            let requirement = resources.requirement(wire.requirement);
            let capability = resources.capability(wire.capability.id());
            let kind = WireKind::of(&requirement.namespace);
            let label = match kind {
                WireKind::Import => capability.package_name().unwrap_or_default().to_string(),
                WireKind::Generic => requirement.namespace.clone(),
                WireKind::RequireBundle | WireKind::Host => String::new(),
            };
            self.add_edge(from, to, kind, label);
        }
    }

    /// Add or retrieve the node of a resource.
    pub fn add_node(&mut self, node: WiredNode) -> NodeIndex {
        if let Some(&idx) = self.index.get(&node.resource) {
            return idx;
        }
        let resource = node.resource;
        let idx = self.graph.add_node(node);
        self.index.insert(resource, idx);
        idx
    }

    /// Add a wire from `from` to `to`, merging labels into an existing edge of the same kind.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, kind: WireKind, label: String) {
        let existing = self
            .graph
            .edges(from)
            .find(|e| e.target() == to && e.weight().kind == kind)
            .map(|e| e.id());
        match existing {
            Some(edge) => {
                let labels = &mut self.graph[edge].labels;
                if !label.is_empty() && !labels.contains(&label) {
                    labels.push(label);
                }
            }
            None => {
                let labels = if label.is_empty() { Vec::new() } else { vec![label] };
                self.graph.add_edge(from, to, WireEdge { kind, labels });
            }
        }
    }

    pub fn find(&self, resource: ResourceId) -> Option<NodeIndex> {
        self.index.get(&resource).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> &WiredNode {
        &self.graph[idx]
    }

    /// Resources this run resolved, sorted by key.
    pub fn new_nodes(&self) -> Vec<&WiredNode> {
        let mut nodes: Vec<&WiredNode> = self.graph.node_weights().filter(|n| n.new).collect();
        nodes.sort_by_key(|n| n.key());
        nodes
    }

    /// Providers a resource is wired to, in kind then name order.
    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &WireEdge)> {
        let mut deps: Vec<(NodeIndex, &WireEdge)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
            .collect();
        deps.sort_by_key(|(target, edge)| (edge.kind, self.graph[*target].key()));
        deps
    }

    /// Resources wired to this one.
    pub fn dependents_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &WireEdge)> {
        let mut deps: Vec<(NodeIndex, &WireEdge)> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.source(), e.weight()))
            .collect();
        deps.sort_by_key(|(source, _)| self.graph[*source].key());
        deps
    }

    /// Print the wiring tree of every root, grouping direct wires by kind.
    pub fn print_tree(&self, max_depth: Option<usize>) -> String {
        let mut output = String::new();
        for (n, &root) in self.roots.iter().enumerate() {
            if n > 0 {
                output.push('\n');
            }
            output.push_str(&format!("{}\n", self.graph[root]));

            let deps = self.dependencies_of(root);
            let mut kinds: Vec<WireKind> = deps.iter().map(|(_, e)| e.kind).collect();
            kinds.dedup();
            let show_headers = kinds.len() > 1;

            let mut visited = HashSet::new();
            visited.insert(root);
            for (s, kind) in kinds.iter().enumerate() {
                if show_headers {
                    output.push_str(&format!("{}\n", kind.header()));
                }
                let section: Vec<_> = deps.iter().filter(|(_, e)| e.kind == *kind).collect();
                let is_last_section = s == kinds.len() - 1;
                for (i, (idx, edge)) in section.iter().enumerate() {
                    let is_last = i == section.len() - 1 && is_last_section;
                    self.print_subtree(&mut output, *idx, edge, "", is_last, 1, max_depth, &mut visited);
                }
            }
        }
        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        edge: &WireEdge,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        let node = &self.graph[idx];
        if edge.labels.is_empty() {
            output.push_str(&format!("{prefix}{connector}{node}\n"));
        } else {
            output.push_str(&format!("{prefix}{connector}{node} ({})\n", edge.labels.join(", ")));
        }

        if let Some(max) = max_depth {
            if depth >= max {
                return;
            }
        }

        // Cycles through require-bundle or uses are common; print each once per path.
        if !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let deps = self.dependencies_of(idx);
        let count = deps.len();
        for (i, (child, child_edge)) in deps.iter().enumerate() {
            self.print_subtree(
                output,
                *child,
                child_edge,
                &child_prefix,
                i == count - 1,
                depth + 1,
                max_depth,
                visited,
            );
        }

        visited.remove(&idx);
    }

    /// Path from the first root that reaches `target_key` to it.
    ///
    /// Accepts `name/version`, `name@version` or a bare symbolic name.
    pub fn find_path(&self, target_key: &str) -> Option<Vec<&WiredNode>> {
        let target = self.resolve_key(target_key)?;
        for &root in &self.roots {
            let mut path = Vec::new();
            let mut visited = HashSet::new();
            if self.dfs_path(root, target, &mut path, &mut visited) {
                return Some(path.iter().map(|&idx| &self.graph[idx]).collect());
            }
        }
        None
    }

    /// Resolve a user-provided key to a node index.
    pub fn resolve_key(&self, key: &str) -> Option<NodeIndex> {
        let mut nodes: Vec<NodeIndex> = self.graph.node_indices().collect();
        nodes.sort_by_key(|&idx| self.graph[idx].key());

        if let Some(&idx) = nodes.iter().find(|&&idx| self.graph[idx].key() == key) {
            return Some(idx);
        }
        let (name, version) = parse_resource_ref(key).ok()?;
        let version = version.map(|v| v.to_string());
        nodes.into_iter().find(|&idx| {
            let node = &self.graph[idx];
            node.name == name && version.as_ref().map_or(true, |v| *v == node.version)
        })
    }

    fn dfs_path(
        &self,
        current: NodeIndex,
        target: NodeIndex,
        path: &mut Vec<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
    ) -> bool {
        path.push(current);
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            path.pop();
            return false;
        }
        for (next, _) in self.dependencies_of(current) {
            if self.dfs_path(next, target, path, visited) {
                return true;
            }
        }
        path.pop();
        false
    }

    /// Print who is wired to `target_key`, recursively.
    pub fn print_inverted_tree(&self, target_key: &str) -> String {
        let mut output = String::new();
        let Some(idx) = self.resolve_key(target_key) else {
            return output;
        };
        output.push_str(&format!("{}\n", self.graph[idx]));

        let mut visited = HashSet::new();
        visited.insert(idx);
        let dependents = self.dependents_of(idx);
        let count = dependents.len();
        for (i, (dep_idx, _)) in dependents.iter().enumerate() {
            self.print_inverted_subtree(&mut output, *dep_idx, "", i == count - 1, &mut visited);
        }
        output
    }

    fn print_inverted_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        output.push_str(&format!("{prefix}{connector}{}\n", self.graph[idx]));

        if !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let dependents = self.dependents_of(idx);
        let count = dependents.len();
        for (i, (dep_idx, _)) in dependents.iter().enumerate() {
            self.print_inverted_subtree(output, *dep_idx, &child_prefix, i == count - 1, visited);
        }

        visited.remove(&idx);
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WiringGraph {
    fn default() -> Self {
        Self::new()
    }
}

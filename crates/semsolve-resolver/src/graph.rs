//! Dependency graph of a finished resolution, and cycle detection.

use std::collections::HashMap;
use std::fmt;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use petgraph::Direction;
use semver::Version;

/// A node in the resolved dependency graph.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ResolvedNode {
    pub name: String,
    /// `None` for the root.
    pub version: Option<Version>,
}

impl fmt::Display for ResolvedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

/// Edge label: the range the dependent declared.
#[derive(Debug, Clone)]
pub struct DepEdge {
    pub range: String,
}

/// A resolved dependency graph backed by petgraph.
pub struct DependencyGraph {
    graph: DiGraph<ResolvedNode, DepEdge>,
    /// Lookup from library name to node index. The root is not indexed.
    index: HashMap<String, NodeIndex>,
    pub root: Option<NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            root: None,
        }
    }

    /// Add the root node. Its name is display-only.
    pub fn add_root(&mut self, name: &str) -> NodeIndex {
        let idx = self.graph.add_node(ResolvedNode {
            name: name.to_string(),
            version: None,
        });
        self.root = Some(idx);
        idx
    }

    /// Add or retrieve a library node.
    pub fn add_node(&mut self, node: ResolvedNode) -> NodeIndex {
        if let Some(&idx) = self.index.get(&node.name) {
            return idx;
        }
        let name = node.name.clone();
        let idx = self.graph.add_node(node);
        self.index.insert(name, idx);
        idx
    }

    /// Add a dependency edge from `from` to `to`.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: DepEdge) {
        if !self.graph.edges(from).any(|e| e.target() == to) {
            self.graph.add_edge(from, to, edge);
        }
    }

    /// Look up a library node by name.
    pub fn find(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> &ResolvedNode {
        &self.graph[idx]
    }

    /// All library nodes (excluding root), sorted by name.
    pub fn all_nodes(&self) -> Vec<&ResolvedNode> {
        let mut nodes: Vec<&ResolvedNode> = self
            .graph
            .node_indices()
            .filter(|&idx| Some(idx) != self.root)
            .map(|idx| &self.graph[idx])
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    /// Direct dependencies of a node, in the order they were added.
    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DepEdge)> {
        self.neighbours(idx, Direction::Outgoing)
    }

    fn neighbours(&self, idx: NodeIndex, direction: Direction) -> Vec<(NodeIndex, &DepEdge)> {
        let mut neighbours: Vec<(NodeIndex, &DepEdge)> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| match direction {
                Direction::Outgoing => (e.target(), e.weight()),
                Direction::Incoming => (e.source(), e.weight()),
            })
            .collect();
        // petgraph yields the most recently added edge first
        neighbours.reverse();
        neighbours
    }

    /// Print the dependency tree to a string.
    pub fn print_tree(&self, max_depth: Option<usize>) -> String {
        let Some(root) = self.root else {
            return String::new();
        };
        let label = |edge: &DepEdge| format!("({})", edge.range);
        self.render(root, Direction::Outgoing, max_depth, &label)
    }

    /// Shortest chain of requirements from the root to a library.
    pub fn find_path(&self, name: &str) -> Option<Vec<&ResolvedNode>> {
        let root = self.root?;
        let target = self.find(name)?;

        let mut parents: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut bfs = Bfs::new(&self.graph, root);
        while let Some(idx) = bfs.next(&self.graph) {
            if idx == target {
                break;
            }
            for (child, _) in self.dependencies_of(idx) {
                if child != root {
                    parents.entry(child).or_insert(idx);
                }
            }
        }

        let mut path = vec![target];
        let mut current = target;
        while current != root {
            current = *parents.get(&current)?;
            path.push(current);
        }
        path.reverse();
        Some(path.into_iter().map(|idx| &self.graph[idx]).collect())
    }

    /// Print who requires a library, up to the root.
    pub fn print_inverted_tree(&self, name: &str) -> String {
        let Some(idx) = self.find(name) else {
            return String::new();
        };
        let label = |edge: &DepEdge| format!("(requires {})", edge.range);
        self.render(idx, Direction::Incoming, None, &label)
    }

    /// Render everything reachable from `start` along `direction`. A node
    /// already on the current branch is printed but not expanded again.
    fn render(
        &self,
        start: NodeIndex,
        direction: Direction,
        max_depth: Option<usize>,
        label: &dyn Fn(&DepEdge) -> String,
    ) -> String {
        let mut output = format!("{}\n", self.graph[start]);
        let mut branch = vec![start];
        let style = RenderStyle {
            direction,
            max_depth,
            label,
        };
        self.render_children(&mut output, start, "", 1, &style, &mut branch);
        output
    }

    fn render_children(
        &self,
        output: &mut String,
        parent: NodeIndex,
        prefix: &str,
        depth: usize,
        style: &RenderStyle<'_>,
        branch: &mut Vec<NodeIndex>,
    ) {
        let children = self.neighbours(parent, style.direction);
        let last = children.len().saturating_sub(1);
        for (i, (child, edge)) in children.into_iter().enumerate() {
            let (connector, indent) = if i == last {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            output.push_str(&format!(
                "{prefix}{connector}{} {}\n",
                self.graph[child],
                (style.label)(edge)
            ));

            let within_depth = style.max_depth.map_or(true, |max| depth < max);
            if within_depth && !branch.contains(&child) {
                branch.push(child);
                let child_prefix = format!("{prefix}{indent}");
                self.render_children(output, child, &child_prefix, depth + 1, style, branch);
                branch.pop();
            }
        }
    }

    /// Number of nodes (excluding root).
    pub fn len(&self) -> usize {
        let total = self.graph.node_count();
        if self.root.is_some() {
            total.saturating_sub(1)
        } else {
            total
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct RenderStyle<'a> {
    direction: Direction,
    max_depth: Option<usize>,
    label: &'a dyn Fn(&DepEdge) -> String,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Find a dependency cycle among `from -> to` edges.
///
/// Returns the libraries of one strongly connected component that forms a
/// cycle (sorted by name), or an empty list if the edges are acyclic.
pub fn find_cycle<'a>(edges: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<String> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();
    let mut self_loops = Vec::new();
    for (from, to) in edges {
        if from == to {
            self_loops.push(from);
        }
        let a = *index.entry(from).or_insert_with(|| graph.add_node(from));
        let b = *index.entry(to).or_insert_with(|| graph.add_node(to));
        graph.add_edge(a, b, ());
    }

    let mut cycle = tarjan_scc(&graph)
        .into_iter()
        .filter(|component| component.len() > 1)
        .map(|component| {
            let mut names: Vec<String> = component.iter().map(|&i| graph[i].to_string()).collect();
            names.sort();
            names
        })
        .min()
        .unwrap_or_default();
    if cycle.is_empty() {
        self_loops.sort_unstable();
        if let Some(lib) = self_loops.first() {
            cycle.push(lib.to_string());
        }
    }
    cycle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, version: &str) -> ResolvedNode {
        ResolvedNode {
            name: name.to_string(),
            version: Some(Version::parse(version).unwrap()),
        }
    }

    fn edge(range: &str) -> DepEdge {
        DepEdge {
            range: range.to_string(),
        }
    }

    /// root -> a -> c, root -> b
    fn sample() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        let root = g.add_root("app");
        let a = g.add_node(node("a", "1.0.0"));
        let b = g.add_node(node("b", "2.0.0"));
        let c = g.add_node(node("c", "3.0.0"));
        g.add_edge(root, a, edge("^1.0.0"));
        g.add_edge(root, b, edge("^2.0.0"));
        g.add_edge(a, c, edge("~3.0.0"));
        g
    }

    #[test]
    fn add_and_find() {
        let mut g = DependencyGraph::new();
        let idx = g.add_node(node("lib", "1.0.0"));
        assert_eq!(g.find("lib"), Some(idx));
        assert_eq!(g.node(idx).to_string(), "lib@1.0.0");
    }

    #[test]
    fn duplicate_add_returns_same_index() {
        let mut g = DependencyGraph::new();
        let idx1 = g.add_node(node("lib", "1.0.0"));
        let idx2 = g.add_node(node("lib", "1.0.0"));
        assert_eq!(idx1, idx2);
    }

    #[test]
    fn root_is_not_counted() {
        let g = sample();
        assert_eq!(g.len(), 3);
        assert!(g.find("app").is_none());
        let names: Vec<&str> = g.all_nodes().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn tree_printing() {
        let tree = sample().print_tree(None);
        assert_eq!(
            tree,
            "app\n├── a@1.0.0 (^1.0.0)\n│   └── c@3.0.0 (~3.0.0)\n└── b@2.0.0 (^2.0.0)\n"
        );
    }

    #[test]
    fn tree_depth_limit() {
        let tree = sample().print_tree(Some(1));
        assert!(tree.contains("a@1.0.0"));
        assert!(!tree.contains("c@3.0.0"));
    }

    #[test]
    fn find_path_exists() {
        let g = sample();
        let path = g.find_path("c").unwrap();
        let names: Vec<&str> = path.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["app", "a", "c"]);
    }

    #[test]
    fn find_path_prefers_shortest_chain() {
        let mut g = sample();
        let root = g.root.unwrap();
        let c = g.find("c").unwrap();
        g.add_edge(root, c, edge("^3.0.0"));
        let names: Vec<String> = g
            .find_path("c")
            .unwrap()
            .iter()
            .map(|n| n.name.clone())
            .collect();
        assert_eq!(names, vec!["app", "c"]);
    }

    #[test]
    fn tree_stops_at_cycles() {
        let mut g = sample();
        let a = g.find("a").unwrap();
        let c = g.find("c").unwrap();
        g.add_edge(c, a, edge("^1.0.0"));
        let tree = g.print_tree(None);
        assert_eq!(
            tree,
            "app\n├── a@1.0.0 (^1.0.0)\n│   └── c@3.0.0 (~3.0.0)\n│       └── a@1.0.0 (^1.0.0)\n└── b@2.0.0 (^2.0.0)\n"
        );
    }

    #[test]
    fn find_path_not_found() {
        assert!(sample().find_path("missing").is_none());
    }

    #[test]
    fn inverted_tree() {
        let inv = sample().print_inverted_tree("c");
        assert!(inv.starts_with("c@3.0.0\n"));
        assert!(inv.contains("a@1.0.0 (requires ~3.0.0)"));
        assert!(inv.contains("app (requires ^1.0.0)"));
    }

    #[test]
    fn cycle_detection() {
        assert!(find_cycle([("a", "b"), ("b", "c")]).is_empty());
        assert_eq!(
            find_cycle([("a", "b"), ("b", "c"), ("c", "b")]),
            vec!["b".to_string(), "c".to_string()]
        );
        assert_eq!(find_cycle([("a", "a")]), vec!["a".to_string()]);
    }
}

use log::warn;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::documents::{BridgeTarget, UnifiedCallGraph, UnifiedNode};

/// Who defines a symbol: an interpreted package (`name:version`) or a
/// compiled library (install-root relative path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    Package(String),
    Library(String),
}

impl Owner {
    pub fn package(&self) -> Option<&str> {
        match self {
            Owner::Package(p) => Some(p),
            Owner::Library(_) => None,
        }
    }

    pub fn library(&self) -> Option<&str> {
        match self {
            Owner::Library(l) => Some(l),
            Owner::Package(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolNode {
    pub name: String,
    pub owner: Owner,
    pub bridges: Vec<BridgeTarget>,
}

impl SymbolNode {
    pub fn new(name: impl Into<String>, owner: Owner) -> Self {
        Self {
            name: name.into(),
            owner,
            bridges: Vec::new(),
        }
    }

    pub fn with_bridges(mut self, bridges: Vec<BridgeTarget>) -> Self {
        self.bridges = bridges;
        self
    }
}

/// Arena for one merge pass. Ids are handed out sequentially and a
/// `(name, owner)` pair never gets a second id.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<SymbolNode>,
    edges: Vec<(u64, u64)>,
    edge_set: HashSet<(u64, u64)>,
    node_map: HashMap<(String, Owner), u64>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `node`, or return the id already assigned to its `(name, owner)`.
    pub fn add_node(&mut self, node: SymbolNode) -> u64 {
        let key = (node.name.clone(), node.owner.clone());
        if let Some(&id) = self.node_map.get(&key) {
            return id;
        }
        let id = self.nodes.len() as u64;
        self.nodes.push(node);
        self.node_map.insert(key, id);
        id
    }

    /// Append bridges to a node, skipping ones it already carries.
    pub fn merge_bridges(&mut self, id: u64, bridges: &[BridgeTarget]) {
        if let Some(node) = self.nodes.get_mut(id as usize) {
            for b in bridges {
                if !node.bridges.contains(b) {
                    node.bridges.push(b.clone());
                }
            }
        }
    }

    /// Record a call edge once. Returns `false` when an endpoint is unknown.
    pub fn add_edge(&mut self, src: u64, dst: u64) -> bool {
        let len = self.nodes.len() as u64;
        if src >= len || dst >= len {
            return false;
        }
        if self.edge_set.insert((src, dst)) {
            self.edges.push((src, dst));
        }
        true
    }

    pub fn node(&self, id: u64) -> Option<&SymbolNode> {
        self.nodes.get(id as usize)
    }

    pub fn find(&self, name: &str, owner: &Owner) -> Option<u64> {
        self.node_map.get(&(name.to_string(), owner.clone())).copied()
    }

    /// Move a node to a different owner, keeping its id.
    pub fn set_owner(&mut self, id: u64, owner: Owner) {
        let Some(node) = self.nodes.get_mut(id as usize) else {
            return;
        };
        if node.owner == owner {
            return;
        }
        self.node_map.remove(&(node.name.clone(), node.owner.clone()));
        node.owner = owner;
        self.node_map.insert((node.name.clone(), node.owner.clone()), id);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &SymbolNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (i as u64, n))
    }

    pub fn build(self) -> UnifiedCallGraph {
        UnifiedCallGraph {
            nodes: self
                .nodes
                .iter()
                .enumerate()
                .map(|(i, n)| (i as u64, UnifiedNode::from(n)))
                .collect(),
            edges: self.edges,
        }
    }
}

/// A petgraph view of a unified call graph, keyed by the document's ids.
pub struct IndexedGraph {
    pub graph: DiGraph<u64, ()>,
    index: HashMap<u64, NodeIndex>,
    /// Edges naming an id that has no node.
    pub dangling_edges: usize,
}

impl IndexedGraph {
    pub fn from_unified(cg: &UnifiedCallGraph) -> Self {
        let mut graph = DiGraph::with_capacity(cg.node_count(), cg.edge_count());
        let mut index = HashMap::with_capacity(cg.node_count());
        for &id in cg.nodes.keys() {
            index.insert(id, graph.add_node(id));
        }

        let mut dangling_edges = 0;
        for &(src, dst) in &cg.edges {
            match (index.get(&src), index.get(&dst)) {
                (Some(&s), Some(&d)) => {
                    graph.add_edge(s, d, ());
                }
                _ => {
                    dangling_edges += 1;
                    warn!("edge [{src}, {dst}] refers to a node that does not exist");
                }
            }
        }

        Self {
            graph,
            index,
            dangling_edges,
        }
    }

    pub fn node_index(&self, id: u64) -> Option<NodeIndex> {
        self.index.get(&id).copied()
    }

    pub fn id(&self, idx: NodeIndex) -> u64 {
        self.graph[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_and_owner_share_one_id() {
        let mut gb = GraphBuilder::new();
        let pkg = Owner::Package("app:1.0".to_string());
        let a = gb.add_node(SymbolNode::new("app.main", pkg.clone()));
        let b = gb.add_node(SymbolNode::new("app.main", pkg));
        let c = gb.add_node(SymbolNode::new(
            "app.main",
            Owner::Package("other:2.0".to_string()),
        ));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(gb.node_count(), 2);
    }

    #[test]
    fn add_edge_rejects_unknown_ids() {
        let mut gb = GraphBuilder::new();
        let a = gb.add_node(SymbolNode::new("f", Owner::Library("a.so".to_string())));
        assert!(gb.add_edge(a, a));
        assert!(!gb.add_edge(a, 7));
        assert_eq!(gb.edge_count(), 1);
    }
}

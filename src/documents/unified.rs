use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::BridgeTarget;
use crate::core::graph::{Owner, SymbolNode};

/// Serialized form of a merged call graph. The reachable subgraph uses the
/// same shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedCallGraph {
    #[serde(default)]
    pub nodes: BTreeMap<u64, UnifiedNode>,
    #[serde(default)]
    pub edges: Vec<(u64, u64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bridges: Vec<BridgeTarget>,
}

impl UnifiedNode {
    /// Library ownership wins when a malformed node carries both tags.
    pub fn owner(&self) -> Option<Owner> {
        match (&self.library, &self.package) {
            (Some(lib), _) => Some(Owner::Library(lib.clone())),
            (None, Some(pkg)) => Some(Owner::Package(pkg.clone())),
            (None, None) => None,
        }
    }

    pub fn to_symbol(&self) -> Option<SymbolNode> {
        Some(SymbolNode {
            name: self.name.clone(),
            owner: self.owner()?,
            bridges: self.bridges.clone(),
        })
    }
}

impl From<&SymbolNode> for UnifiedNode {
    fn from(node: &SymbolNode) -> Self {
        let (package, library) = match &node.owner {
            Owner::Package(p) => (Some(p.clone()), None),
            Owner::Library(l) => (None, Some(l.clone())),
        };
        Self {
            name: node.name.clone(),
            package,
            library,
            bridges: node.bridges.clone(),
        }
    }
}

impl UnifiedCallGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of every node whose name equals `name`, ascending.
    pub fn ids_named(&self, name: &str) -> Vec<u64> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.name == name)
            .map(|(id, _)| *id)
            .collect()
    }
}

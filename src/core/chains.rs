use log::{debug, info, warn};
use petgraph::graph::NodeIndex;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

use super::graph::IndexedGraph;
use crate::documents::UnifiedCallGraph;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChainReport {
    pub symbol: String,
    pub symbol_present: bool,
    /// Nodes nothing calls.
    pub roots: usize,
    /// One shortest chain per root that reaches the symbol, in calling order.
    pub chains: Vec<Vec<String>>,
    /// `chains / roots`, or `None` when that ratio is undefined.
    pub centrality: Option<f64>,
}

impl ChainReport {
    fn absent(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            ..Self::default()
        }
    }
}

/// Finds how a symbol is reached from the roots of a (usually reachable)
/// call graph.
pub struct ChainCalculator {
    symbol: String,
}

impl ChainCalculator {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }

    pub fn calculate(&self, cg: &UnifiedCallGraph) -> ChainReport {
        let matches = cg.ids_named(&self.symbol);
        let Some(&target_id) = matches.first() else {
            debug!("Symbol {} not in call graph", self.symbol);
            return ChainReport::absent(&self.symbol);
        };
        if matches.len() > 1 {
            warn!(
                "{} nodes are named {}; using id {target_id}",
                matches.len(),
                self.symbol
            );
        }

        let indexed = IndexedGraph::from_unified(cg);
        let Some(target) = indexed.node_index(target_id) else {
            return ChainReport::absent(&self.symbol);
        };

        let mut roots: Vec<NodeIndex> = indexed
            .graph
            .node_indices()
            .filter(|&n| {
                indexed
                    .graph
                    .neighbors_directed(n, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .collect();
        roots.sort_by_key(|&n| indexed.id(n));

        let parents = callers_towards(&indexed, target);

        let mut chains: Vec<Vec<String>> = Vec::new();
        for &root in &roots {
            if root != target && !parents.contains_key(&root) {
                continue;
            }
            // Walking parents from a root runs in calling order already.
            let mut chain = Vec::new();
            let mut cursor = root;
            loop {
                chain.push(node_name(cg, indexed.id(cursor)));
                match parents.get(&cursor) {
                    Some(&next) => cursor = next,
                    None => break,
                }
            }
            chains.push(chain);
        }
        chains.sort_by_key(Vec::len);

        let centrality = if roots.is_empty() {
            None
        } else {
            Some(chains.len() as f64 / roots.len() as f64)
        };

        info!(
            "{}: {} chains from {} roots",
            self.symbol,
            chains.len(),
            roots.len()
        );

        ChainReport {
            symbol: self.symbol.clone(),
            symbol_present: true,
            roots: roots.len(),
            chains,
            centrality,
        }
    }
}

/// Breadth-first search against edge direction. For every node that can
/// reach `target`, records the next hop on one shortest path towards it.
fn callers_towards(indexed: &IndexedGraph, target: NodeIndex) -> HashMap<NodeIndex, NodeIndex> {
    let mut next_hop: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue = VecDeque::from([target]);

    while let Some(node) = queue.pop_front() {
        let mut callers: Vec<NodeIndex> = indexed
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .collect();
        callers.sort_by_key(|&c| indexed.id(c));
        callers.dedup();
        for caller in callers {
            if caller == target || next_hop.contains_key(&caller) {
                continue;
            }
            next_hop.insert(caller, node);
            queue.push_back(caller);
        }
    }
    next_hop
}

fn node_name(cg: &UnifiedCallGraph, id: u64) -> String {
    cg.nodes
        .get(&id)
        .map(|n| n.name.clone())
        .unwrap_or_else(|| id.to_string())
}

use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};

use super::graph::{GraphBuilder, Owner, SymbolNode};
use crate::documents::{BridgeTarget, NativeCallGraph, UnifiedCallGraph};

/// Egress recorded for a `(symbol, library)` pair that a bridge points at.
/// Lower than any real count, so bridge-exposed definitions always win.
pub const BRIDGE_SENTINEL: i64 = -1;

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub graph: UnifiedCallGraph,
    /// Bridges whose native symbol appears in no library graph.
    pub unresolved_bridges: Vec<BridgeTarget>,
    /// Native nodes whose owning library changed during collision resolution.
    pub relocated: usize,
}

/// Merges native per-library call graphs into an interpreted-side graph and
/// decides which library owns each native symbol name.
#[derive(Default)]
pub struct NativeMerger {
    builder: GraphBuilder,
    native_by_name: HashMap<String, u64>,
    /// symbol name -> library ordinal -> egress count.
    egress: HashMap<String, BTreeMap<usize, i64>>,
    libraries: Vec<String>,
    library_ordinals: HashMap<String, usize>,
}

impl NativeMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(mut self, interpreted: &UnifiedCallGraph, natives: &[NativeCallGraph]) -> MergeOutcome {
        self.add_interpreted(interpreted);
        for native in natives {
            self.add_native(native);
        }
        let unresolved_bridges = self.connect_bridges();
        let relocated = self.decide_owners();

        info!(
            "Unified {} libraries: {} nodes, {} edges, {} unresolved bridges, {} relocated symbols",
            natives.len(),
            self.builder.node_count(),
            self.builder.edge_count(),
            unresolved_bridges.len(),
            relocated
        );

        MergeOutcome {
            graph: self.builder.build(),
            unresolved_bridges,
            relocated,
        }
    }

    fn library_ordinal(&mut self, library: &str) -> usize {
        if let Some(&ordinal) = self.library_ordinals.get(library) {
            return ordinal;
        }
        let ordinal = self.libraries.len();
        self.libraries.push(library.to_string());
        self.library_ordinals.insert(library.to_string(), ordinal);
        ordinal
    }

    fn add_interpreted(&mut self, cg: &UnifiedCallGraph) {
        let mut old_to_new = HashMap::with_capacity(cg.node_count());
        for (&old, node) in &cg.nodes {
            let Some(symbol) = node.to_symbol() else {
                warn!("node {old} ({}) has neither package nor library", node.name);
                continue;
            };
            let library = symbol.owner.library().map(str::to_string);
            let name = symbol.name.clone();
            let id = self.builder.add_node(symbol);
            if let Some(library) = library {
                let ordinal = self.library_ordinal(&library);
                self.native_by_name.entry(name.clone()).or_insert(id);
                self.egress.entry(name).or_default().entry(ordinal).or_insert(0);
            }
            old_to_new.insert(old, id);
        }
        for &(src, dst) in &cg.edges {
            match (old_to_new.get(&src), old_to_new.get(&dst)) {
                (Some(&s), Some(&d)) => {
                    self.builder.add_edge(s, d);
                }
                _ => warn!("dropping interpreted edge [{src}, {dst}] with unknown endpoint"),
            }
        }
    }

    fn add_native(&mut self, native: &NativeCallGraph) {
        let ordinal = self.library_ordinal(&native.library);
        let mut old_to_new: HashMap<u64, u64> = HashMap::with_capacity(native.nodes.len());

        for (&old, symbol) in &native.nodes {
            let id = match self.native_by_name.get(&symbol.name) {
                Some(&id) => id,
                None => {
                    let node = SymbolNode::new(symbol.name.clone(), Owner::Library(native.library.clone()));
                    let id = self.builder.add_node(node);
                    self.native_by_name.insert(symbol.name.clone(), id);
                    id
                }
            };
            self.egress
                .entry(symbol.name.clone())
                .or_default()
                .insert(ordinal, 0);
            old_to_new.insert(old, id);
        }

        let mut dropped = 0;
        for &(src, dst) in &native.edges {
            let (Some(&s), Some(&d)) = (old_to_new.get(&src), old_to_new.get(&dst)) else {
                dropped += 1;
                continue;
            };
            self.builder.add_edge(s, d);
            let Some(src_name) = native.nodes.get(&src).map(|n| n.name.as_str()) else {
                continue;
            };
            *self
                .egress
                .entry(src_name.to_string())
                .or_default()
                .entry(ordinal)
                .or_insert(0) += 1;
        }
        if dropped > 0 {
            warn!("{}: dropped {dropped} edges with unknown endpoints", native.library);
        }
        debug!(
            "merged {} ({} symbols, {} edges)",
            native.library,
            native.nodes.len(),
            native.edges.len()
        );
    }

    fn connect_bridges(&mut self) -> Vec<BridgeTarget> {
        let callers: Vec<(u64, Vec<BridgeTarget>)> = self
            .builder
            .iter()
            .filter(|(_, n)| n.owner.package().is_some() && !n.bridges.is_empty())
            .map(|(id, n)| (id, n.bridges.clone()))
            .collect();

        let mut unresolved = Vec::new();
        for (caller, bridges) in callers {
            for bridge in bridges {
                let Some(&native) = self.native_by_name.get(&bridge.symbol) else {
                    warn!("bridge target {} ({}) not found in any library graph", bridge.symbol, bridge.library);
                    unresolved.push(bridge);
                    continue;
                };
                self.builder.add_edge(caller, native);
                let ordinal = self.library_ordinals.get(&bridge.library).copied();
                match (ordinal, self.egress.get_mut(&bridge.symbol)) {
                    (Some(ordinal), Some(counts)) if counts.contains_key(&ordinal) => {
                        counts.insert(ordinal, BRIDGE_SENTINEL);
                    }
                    _ => debug!(
                        "bridge names {} for {}, which has no graph defining it",
                        bridge.library, bridge.symbol
                    ),
                }
            }
        }
        unresolved
    }

    /// Give every name defined by several libraries to the one with the
    /// lowest egress for it, ties going to the library seen first.
    fn decide_owners(&mut self) -> usize {
        let mut relocated = 0;
        for (name, &id) in &self.native_by_name {
            let Some(counts) = self.egress.get(name).filter(|c| c.len() > 1) else {
                continue;
            };
            let Some((&ordinal, _)) = counts.iter().min_by_key(|&(&ord, &count)| (count, ord)) else {
                continue;
            };
            let library = &self.libraries[ordinal];
            let current = self.builder.node(id).and_then(|n| n.owner.library());
            if current != Some(library.as_str()) {
                debug!("{name}: owner -> {library} (egress {counts:?})");
                self.builder.set_owner(id, Owner::Library(library.clone()));
                relocated += 1;
            }
        }
        relocated
    }
}

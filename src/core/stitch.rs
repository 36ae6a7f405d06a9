use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::graph::{GraphBuilder, Owner, SymbolNode};
use super::oracle::FqnOracle;
use super::resolver::{ExternalResolver, CONSTRUCTOR_SUFFIX};
use crate::config::ResolverConfig;
use crate::documents::{PartialCallGraph, UnifiedCallGraph};

/// How the external calls of one package fared during stitching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalStats {
    pub total: usize,
    pub found: usize,
    pub missed: usize,
    /// Calls into builtins, the standard library or unreliable prefixes.
    pub ignored: usize,
    /// Entries whose endpoints could not be read or mapped.
    pub malformed: usize,
    pub which_missed: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StitchOutcome {
    /// Interpreted-side nodes and edges only.
    pub graph: UnifiedCallGraph,
    pub stats: BTreeMap<String, ExternalStats>,
}

/// Merges the partial call graphs of an application and its dependencies
/// into one index space.
pub struct Stitcher<'a> {
    resolver: ExternalResolver<'a>,
}

struct Placed<'d> {
    doc: &'d PartialCallGraph,
    package: String,
    local_to_global: HashMap<u64, u64>,
}

impl<'a> Stitcher<'a> {
    pub fn new(config: &'a ResolverConfig, oracle: &'a dyn FqnOracle) -> Self {
        Self {
            resolver: ExternalResolver::new(config, oracle),
        }
    }

    pub fn stitch(&mut self, docs: &[PartialCallGraph]) -> StitchOutcome {
        let mut builder = GraphBuilder::new();
        // Name lookup for call resolution; the first package to define a name
        // keeps it.
        let mut by_name: HashMap<String, u64> = HashMap::new();
        let mut stats: BTreeMap<String, ExternalStats> = BTreeMap::new();

        let placed: Vec<Placed> = docs
            .iter()
            .map(|doc| place_internals(doc, &mut builder, &mut by_name))
            .collect();

        for p in &placed {
            let malformed = add_internal_calls(p, &mut builder, &by_name);
            stats.entry(p.package.clone()).or_default().malformed += malformed;
        }

        let mut not_found: BTreeSet<String> = BTreeSet::new();
        for p in &placed {
            let entry = stats.entry(p.package.clone()).or_default();
            self.resolve_external_calls(p, &mut builder, &by_name, entry);
            info!(
                "{}: {} external calls, {} found, {} missed, {} ignored",
                p.package, entry.total, entry.found, entry.missed, entry.ignored
            );
            not_found.extend(entry.which_missed.iter().cloned());
        }

        let totals = stats.values().fold((0, 0, 0), |acc, s| {
            (acc.0 + s.found, acc.1 + s.missed, acc.2 + s.ignored)
        });
        info!(
            "Stitched {} packages: {} nodes, {} edges; externals found {}, missed {}, ignored {}",
            docs.len(),
            builder.node_count(),
            builder.edge_count(),
            totals.0,
            totals.1,
            totals.2
        );
        info!("Oracle lookups: {}", self.resolver.oracle_lookups());
        for name in &not_found {
            debug!("unresolved external: {name}");
        }

        StitchOutcome {
            graph: builder.build(),
            stats,
        }
    }

    fn resolve_external_calls(
        &mut self,
        placed: &Placed,
        builder: &mut GraphBuilder,
        by_name: &HashMap<String, u64>,
        stats: &mut ExternalStats,
    ) {
        let doc = placed.doc;
        let mut denied: HashSet<u64> = HashSet::new();
        let mut variants: HashMap<u64, Vec<String>> = HashMap::new();
        for (idx, ns) in doc.external_namespaces() {
            if self.resolver.is_denied(&ns.namespace) {
                debug!("{}: ignoring external {}", placed.package, ns.namespace);
                denied.insert(idx);
                continue;
            }
            let name = ExternalResolver::external_name(&ns.namespace);
            variants.insert(idx, self.resolver.name_variants(name));
        }

        let mut unresolved: BTreeSet<String> = BTreeSet::new();
        stats.total += doc.graph.external_calls.len();

        for edge in doc.external_edges() {
            let Some((src, dst)) = edge else {
                stats.malformed += 1;
                continue;
            };
            if denied.contains(&dst) {
                stats.ignored += 1;
                continue;
            }
            let (Some(&caller), Some(names)) =
                (placed.local_to_global.get(&src), variants.get(&dst))
            else {
                debug!("{}: external call [{src}, {dst}] has unknown endpoints", placed.package);
                stats.malformed += 1;
                continue;
            };

            let mut targets = lookup(&ExternalResolver::direct_candidates(names), by_name);
            if targets.is_empty() {
                targets = lookup(&self.resolver.oracle_candidates(names), by_name);
            }

            if targets.is_empty() {
                debug!("No node found for external call to {} from {}", names[0], placed.package);
                stats.missed += 1;
                unresolved.insert(names[0].clone());
                continue;
            }
            stats.found += 1;
            for target in targets {
                builder.add_edge(caller, target);
            }
        }

        stats.which_missed = unresolved.into_iter().collect();
    }
}

fn place_internals<'d>(
    doc: &'d PartialCallGraph,
    builder: &mut GraphBuilder,
    by_name: &mut HashMap<String, u64>,
) -> Placed<'d> {
    let package = doc.package_id();
    let mut local_to_global = HashMap::new();
    for (idx, ns) in doc.internal_namespaces() {
        let name = ns.dotted_name();
        if name.is_empty() {
            warn!("{package}: namespace {:?} has an empty name", ns.namespace);
            continue;
        }
        let node = SymbolNode::new(name.clone(), Owner::Package(package.clone()));
        let id = builder.add_node(node);
        builder.merge_bridges(id, &ns.bridges());
        by_name.entry(name).or_insert(id);
        local_to_global.insert(idx, id);
    }
    Placed {
        doc,
        package,
        local_to_global,
    }
}

/// Re-point internal calls, adding the construction edge to `<callee>.__init__`
/// when such a child exists. Returns the number of unusable entries.
fn add_internal_calls(
    placed: &Placed,
    builder: &mut GraphBuilder,
    by_name: &HashMap<String, u64>,
) -> usize {
    let owner = Owner::Package(placed.package.clone());
    let mut malformed = 0;
    for edge in placed.doc.internal_edges() {
        let mapped = edge.and_then(|(s, d)| {
            Some((*placed.local_to_global.get(&s)?, *placed.local_to_global.get(&d)?))
        });
        let Some((src, dst)) = mapped else {
            warn!("{}: skipping unusable internal call {edge:?}", placed.package);
            malformed += 1;
            continue;
        };
        builder.add_edge(src, dst);

        let Some(callee) = builder.node(dst) else {
            continue;
        };
        let init_name = format!("{}{CONSTRUCTOR_SUFFIX}", callee.name);
        let init = builder
            .find(&init_name, &owner)
            .or_else(|| by_name.get(&init_name).copied());
        if let Some(init) = init.filter(|&i| i != dst) {
            debug!("Also added edge to __init__ for {}", init_name);
            builder.add_edge(src, init);
        }
    }
    malformed
}

fn lookup(candidates: &[String], by_name: &HashMap<String, u64>) -> Vec<u64> {
    let mut ids: Vec<u64> = Vec::new();
    for id in candidates.iter().filter_map(|c| by_name.get(c)) {
        if !ids.contains(id) {
            ids.push(*id);
        }
    }
    ids
}

use log::{info, warn};
use petgraph::visit::Dfs;
use std::collections::HashSet;
use std::fmt;

use super::graph::IndexedGraph;
use crate::documents::UnifiedCallGraph;
use crate::error::{EngineError, EngineResult};

/// Version given to applications identified by an `owner/repo` pair.
const REPOSITORY_VERSION: &str = "1";

/// Identity of the application whose entrypoints seed reachability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageIdentity {
    pub name: String,
    pub version: String,
}

impl PackageIdentity {
    /// Accepts `name:version` or a repository-style `owner/repo`.
    pub fn parse(raw: &str) -> EngineResult<Self> {
        if let Some((name, version)) = raw.split_once(':') {
            if !name.is_empty() && !version.is_empty() {
                return Ok(Self {
                    name: name.to_string(),
                    version: version.to_string(),
                });
            }
        } else if raw.contains('/') && !raw.starts_with('/') && !raw.ends_with('/') {
            return Ok(Self {
                name: raw.to_string(),
                version: REPOSITORY_VERSION.to_string(),
            });
        }
        Err(EngineError::UnrecognizedPackage(raw.to_string()))
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReachOutcome {
    /// The reachable subgraph, ids preserved from the input.
    pub graph: UnifiedCallGraph,
    pub entrypoints: usize,
    /// Kept edges whose source is reachable but destination is not.
    pub inconsistencies: usize,
}

pub struct ReachabilityDetector {
    package: String,
}

impl ReachabilityDetector {
    pub fn new(identity: &PackageIdentity) -> Self {
        Self {
            package: identity.to_string(),
        }
    }

    pub fn reach(&self, cg: &UnifiedCallGraph) -> ReachOutcome {
        let indexed = IndexedGraph::from_unified(cg);

        let entrypoints: Vec<u64> = cg
            .nodes
            .iter()
            .filter(|(_, n)| n.package.as_deref() == Some(self.package.as_str()))
            .map(|(id, _)| *id)
            .collect();
        info!("Entrypoints for {}: {}", self.package, entrypoints.len());

        let reachable = self.reachable_ids(&indexed, &entrypoints);

        let mut out = UnifiedCallGraph::default();
        for (id, node) in &cg.nodes {
            if reachable.contains(id) {
                out.nodes.insert(*id, node.clone());
            }
        }
        let mut inconsistencies = 0;
        for &(src, dst) in &cg.edges {
            match (reachable.contains(&src), reachable.contains(&dst)) {
                (true, true) => out.edges.push((src, dst)),
                (true, false) => {
                    inconsistencies += 1;
                    warn!("dst of edge [{src}, {dst}] is not in reachable nodes while src is");
                }
                _ => {}
            }
        }

        info!(
            "Reached {} of {} nodes and {} of {} edges",
            out.node_count(),
            cg.node_count(),
            out.edge_count(),
            cg.edge_count()
        );

        ReachOutcome {
            graph: out,
            entrypoints: entrypoints.len(),
            inconsistencies,
        }
    }

    fn reachable_ids(&self, indexed: &IndexedGraph, entrypoints: &[u64]) -> HashSet<u64> {
        let mut reachable = HashSet::new();
        let Some(&first) = entrypoints.first() else {
            return reachable;
        };
        let Some(start) = indexed.node_index(first) else {
            return reachable;
        };

        // One walker for all entrypoints so shared descendants are visited once.
        let mut dfs = Dfs::new(&indexed.graph, start);
        for &entry in entrypoints {
            let Some(idx) = indexed.node_index(entry) else {
                continue;
            };
            dfs.move_to(idx);
            while let Some(nx) = dfs.next(&indexed.graph) {
                reachable.insert(indexed.id(nx));
            }
        }
        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_parse_both_formats() {
        let pypi = PackageIdentity::parse("app:1.0").unwrap();
        assert_eq!(pypi.to_string(), "app:1.0");
        let repo = PackageIdentity::parse("octo/widget").unwrap();
        assert_eq!(repo.to_string(), "octo/widget:1");
        assert!(PackageIdentity::parse("widget").is_err());
        assert!(PackageIdentity::parse("app:").is_err());
    }
}

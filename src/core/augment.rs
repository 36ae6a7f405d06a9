use log::{debug, error, info, warn};
use std::collections::{BTreeSet, HashMap};

use crate::documents::partial::CALL_MARKER;
use crate::documents::{BridgeDocument, BridgeRecord, DocumentSet, ImportMap, Namespace};

/// Outcome of applying one package's bridge document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AugmentReport {
    /// Bridges attached to an existing namespace.
    pub matched: usize,
    /// Bridges for which a namespace had to be synthesized.
    pub created: usize,
    /// Internal bridges whose caller is missing from the package's own graph.
    pub unmatched: usize,
    /// Bridges that could not be tied to any known package document.
    pub dropped: usize,
    /// Packages whose documents were modified.
    pub changed_packages: BTreeSet<String>,
}

/// Attaches bridge records to the namespaces of partial call graphs.
pub struct BridgeAugmenter<'a> {
    import_map: &'a ImportMap,
    toplevels: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> BridgeAugmenter<'a> {
    pub fn new(import_map: &'a ImportMap) -> Self {
        let mut toplevels: HashMap<&str, Vec<&str>> = HashMap::new();
        for (toplevel, package) in import_map {
            toplevels
                .entry(package.as_str())
                .or_default()
                .push(toplevel.as_str());
        }
        Self {
            import_map,
            toplevels,
        }
    }

    /// Apply the bridges discovered for `package`. Internal bridges land in
    /// `package`'s own document; external ones in the document of the package
    /// owning the caller's top-level import name.
    pub fn augment(
        &self,
        docs: &mut DocumentSet,
        package: &str,
        bridges: &BridgeDocument,
    ) -> AugmentReport {
        let mut report = AugmentReport::default();
        for bridge in &bridges.internal {
            self.apply_internal(docs, package, bridge, &mut report);
        }
        for bridge in &bridges.external {
            self.apply_external(docs, bridge, &mut report);
        }
        info!(
            "Augmented {package}: {} matched, {} created, {} unmatched, {} dropped",
            report.matched, report.created, report.unmatched, report.dropped
        );
        report
    }

    fn apply_internal(
        &self,
        docs: &mut DocumentSet,
        package: &str,
        bridge: &BridgeRecord,
        report: &mut AugmentReport,
    ) {
        let Some(doc) = docs.get_mut(package) else {
            warn!("No call graph for {package}; dropping bridge for {}", bridge.pyname);
            report.dropped += 1;
            return;
        };

        let target = bridge.target();
        let marked = format!("{}{CALL_MARKER}", bridge.pyname);
        let mut found = false;
        let mut changed = false;
        for ns in doc.internal_namespaces_mut() {
            if ns.namespace == bridge.pyname || ns.namespace == marked {
                changed |= ns.mark_bridge_target();
                changed |= ns.attach_bridge(&target);
                found = true;
            }
        }

        if found {
            report.matched += 1;
        } else {
            warn!(
                "Internal bridge caller {} not found in the call graph of {package}",
                bridge.pyname
            );
            report.unmatched += 1;
        }
        if changed {
            report.changed_packages.insert(package.to_string());
        }
    }

    fn apply_external(&self, docs: &mut DocumentSet, bridge: &BridgeRecord, report: &mut AugmentReport) {
        let Some((toplevel, dotted)) = bridge.external_parts() else {
            warn!("Malformed external bridge caller name {}", bridge.pyname);
            report.dropped += 1;
            return;
        };
        let Some(owner) = self.import_map.get(toplevel) else {
            error!("No package found for top-level import {toplevel}");
            report.dropped += 1;
            return;
        };
        let Some(doc) = docs.get_mut(owner) else {
            warn!("No call graph for {owner}; dropping bridge for {}", bridge.pyname);
            report.dropped += 1;
            return;
        };

        let Some((_, rest)) = dotted.split_once('.') else {
            warn!("External bridge caller {} names a bare module", bridge.pyname);
            report.dropped += 1;
            return;
        };
        let module = format!("/{toplevel}/");
        let synthesized = format!("{module}{rest}{CALL_MARKER}");
        let owner_toplevels = self.toplevels.get(owner.as_str()).cloned().unwrap_or_default();
        let marked = format!("{dotted}{CALL_MARKER}");

        let target = bridge.target();
        let mut found = false;
        let mut changed = false;
        for ns in doc.internal_namespaces_mut() {
            let qualified = qualify(&ns.namespace, toplevel, &owner_toplevels);
            if qualified == dotted || qualified == marked || ns.namespace == synthesized {
                changed |= ns.attach_bridge(&target);
                found = true;
                break;
            }
        }

        if found {
            report.matched += 1;
        } else {
            debug!("Synthesizing {synthesized} in {owner} for bridge {}", bridge.pyname);
            let mut ns = Namespace::new(synthesized);
            ns.attach_bridge(&target);
            doc.add_internal_namespace(&module, ns);
            report.created += 1;
            changed = true;
        }
        if changed {
            report.changed_packages.insert(owner.clone());
        }
    }
}

/// Dotted form of `namespace`, rooted at `toplevel` unless it already starts
/// with one of the owning package's top-level names.
fn qualify(namespace: &str, toplevel: &str, owner_toplevels: &[&str]) -> String {
    let dotted = namespace.replace('/', ".");
    let clean = dotted.trim_start_matches('.');
    let rooted = owner_toplevels.iter().any(|t| {
        clean
            .strip_prefix(t)
            .map(|rest| rest.starts_with('.'))
            .unwrap_or(false)
    });
    if rooted {
        clean.to_string()
    } else {
        format!("{toplevel}.{clean}")
    }
}

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::{parse_edge, BridgeTarget};

/// Call graph of a single package as produced by the static analyzer.
///
/// Fields this crate does not interpret are carried in `extra` so that an
/// augmented document can be written back without losing information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialCallGraph {
    pub product: String,
    pub version: String,
    /// Number of node indices the analyzer handed out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<u64>,
    #[serde(default)]
    pub modules: Modules,
    #[serde(default)]
    pub graph: CallSets,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Modules {
    #[serde(default)]
    pub internal: BTreeMap<String, ModuleEntry>,
    #[serde(default)]
    pub external: BTreeMap<String, ModuleEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleEntry {
    #[serde(rename = "sourceFile", default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default)]
    pub namespaces: BTreeMap<String, Namespace>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespace {
    pub namespace: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallSets {
    #[serde(rename = "internalCalls", default)]
    pub internal_calls: Vec<Value>,
    #[serde(rename = "externalCalls", default)]
    pub external_calls: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Marker the analyzer appends to namespaces that are invoked as calls.
pub const CALL_MARKER: &str = "()";

impl Namespace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            metadata: Map::new(),
        }
    }

    pub fn bridges(&self) -> Vec<BridgeTarget> {
        match self.metadata.get("bridges") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Attach `target` unless it is already present. Returns whether the
    /// metadata changed.
    pub fn attach_bridge(&mut self, target: &BridgeTarget) -> bool {
        let mut current = self.bridges();
        if current.contains(target) {
            return false;
        }
        current.push(target.clone());
        let encoded = current
            .iter()
            .map(|b| serde_json::json!({"symbol": b.symbol, "library": b.library}))
            .collect();
        self.metadata.insert("bridges".to_string(), Value::Array(encoded));
        true
    }

    pub fn has_call_marker(&self) -> bool {
        self.namespace.ends_with(CALL_MARKER)
    }

    /// Flag the namespace as a caller of native code by giving it the call
    /// marker. Returns whether the name changed.
    pub fn mark_bridge_target(&mut self) -> bool {
        if self.has_call_marker() {
            return false;
        }
        self.namespace.push_str(CALL_MARKER);
        true
    }

    /// The namespace as a dotted symbol name: separators normalized, edge dots
    /// trimmed, call marker stripped.
    pub fn dotted_name(&self) -> String {
        let dotted = self.namespace.replace('/', ".");
        let trimmed = dotted.trim_matches('.');
        trimmed
            .strip_suffix(CALL_MARKER)
            .unwrap_or(trimmed)
            .to_string()
    }
}

impl PartialCallGraph {
    pub fn new(product: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            version: version.into(),
            nodes: None,
            modules: Modules::default(),
            graph: CallSets::default(),
            extra: Map::new(),
        }
    }

    pub fn package_id(&self) -> String {
        format!("{}:{}", self.product, self.version)
    }

    /// Next free node index. Uses the recorded count, but never hands out an
    /// index that a namespace already occupies.
    pub fn next_index(&self) -> u64 {
        let highest = self
            .modules
            .internal
            .values()
            .chain(self.modules.external.values())
            .flat_map(|m| m.namespaces.keys())
            .filter_map(|k| k.parse::<u64>().ok())
            .max()
            .map(|m| m + 1)
            .unwrap_or(0);
        self.nodes.unwrap_or(0).max(highest)
    }

    pub fn internal_namespaces(&self) -> Vec<(u64, &Namespace)> {
        Self::indexed(&self.modules.internal, &self.package_id())
    }

    pub fn external_namespaces(&self) -> Vec<(u64, &Namespace)> {
        Self::indexed(&self.modules.external, &self.package_id())
    }

    pub fn internal_namespaces_mut(&mut self) -> impl Iterator<Item = &mut Namespace> {
        self.modules
            .internal
            .values_mut()
            .flat_map(|m| m.namespaces.values_mut())
    }

    /// Insert a namespace under `module`, creating the module with a bootstrap
    /// namespace for itself when it does not exist yet.
    pub fn add_internal_namespace(&mut self, module: &str, namespace: Namespace) -> u64 {
        let mut next = self.next_index();
        if !self.modules.internal.contains_key(module) {
            let mut entry = ModuleEntry {
                source_file: Some("__init__.py".to_string()),
                ..ModuleEntry::default()
            };
            entry
                .namespaces
                .insert(next.to_string(), Namespace::new(module));
            self.modules.internal.insert(module.to_string(), entry);
            next += 1;
        }
        if let Some(entry) = self.modules.internal.get_mut(module) {
            entry.namespaces.insert(next.to_string(), namespace);
        }
        self.nodes = Some(next + 1);
        next
    }

    pub fn internal_edges(&self) -> impl Iterator<Item = Option<(u64, u64)>> + '_ {
        self.graph.internal_calls.iter().map(parse_edge)
    }

    pub fn external_edges(&self) -> impl Iterator<Item = Option<(u64, u64)>> + '_ {
        self.graph.external_calls.iter().map(parse_edge)
    }

    fn indexed<'a>(
        modules: &'a BTreeMap<String, ModuleEntry>,
        package: &str,
    ) -> Vec<(u64, &'a Namespace)> {
        let mut out = Vec::new();
        for entry in modules.values() {
            for (key, ns) in &entry.namespaces {
                match key.parse::<u64>() {
                    Ok(idx) => out.push((idx, ns)),
                    Err(_) => warn!("{package}: skipping namespace with non-numeric index {key:?}"),
                }
            }
        }
        out.sort_by_key(|(idx, _)| *idx);
        out
    }
}

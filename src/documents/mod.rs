//! Document shapes exchanged with the external analyzers, plus the JSON I/O
//! helpers every stage uses to load and persist them.

pub mod bridges;
pub mod cache;
pub mod native;
pub mod partial;
pub mod unified;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{EngineError, EngineResult};

pub use bridges::{BridgeDocument, BridgeRecord, BridgeTarget};
pub use cache::NativeGraphCache;
pub use native::{NativeCallGraph, NativeSymbol};
pub use partial::{ModuleEntry, Namespace, PartialCallGraph};
pub use unified::{UnifiedCallGraph, UnifiedNode};

/// Top-level import name -> owning package (`name:version`).
pub type ImportMap = BTreeMap<String, String>;

pub fn read_json<T: DeserializeOwned>(path: &Path) -> EngineResult<T> {
    let file = File::open(path).map_err(|e| EngineError::io(path, e))?;
    let reader = BufReader::with_capacity(64 * 1024, file);
    serde_json::from_reader(reader).map_err(|e| EngineError::malformed(path, e))
}

/// Pretty-print `value` to `path`, creating parent directories as needed.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> EngineResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
        }
    }
    let file = File::create(path).map_err(|e| EngineError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| EngineError::malformed(path, e))?;
    writer.flush().map_err(|e| EngineError::io(path, e))
}

/// Parse one `[src, dst, ...]` edge entry. Endpoints may be integers or
/// numeric strings; anything else is rejected.
pub fn parse_edge(entry: &Value) -> Option<(u64, u64)> {
    let items = entry.as_array()?;
    if items.len() < 2 {
        return None;
    }
    Some((parse_index(&items[0])?, parse_index(&items[1])?))
}

fn parse_index(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The partial call graphs of one application and its dependency closure,
/// kept in insertion order (application first).
#[derive(Debug, Clone, Default)]
pub struct DocumentSet {
    docs: Vec<PartialCallGraph>,
    index: HashMap<String, usize>,
}

impl DocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document, replacing any earlier one for the same package.
    pub fn insert(&mut self, doc: PartialCallGraph) {
        let package = doc.package_id();
        match self.index.get(&package) {
            Some(&slot) => self.docs[slot] = doc,
            None => {
                self.index.insert(package, self.docs.len());
                self.docs.push(doc);
            }
        }
    }

    pub fn get(&self, package: &str) -> Option<&PartialCallGraph> {
        self.index.get(package).map(|&slot| &self.docs[slot])
    }

    pub fn get_mut(&mut self, package: &str) -> Option<&mut PartialCallGraph> {
        let slot = *self.index.get(package)?;
        self.docs.get_mut(slot)
    }

    pub fn contains(&self, package: &str) -> bool {
        self.index.contains_key(package)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartialCallGraph> {
        self.docs.iter()
    }

    pub fn as_slice(&self) -> &[PartialCallGraph] {
        &self.docs
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl FromIterator<PartialCallGraph> for DocumentSet {
    fn from_iter<I: IntoIterator<Item = PartialCallGraph>>(iter: I) -> Self {
        let mut set = DocumentSet::new();
        for doc in iter {
            set.insert(doc);
        }
        set
    }
}

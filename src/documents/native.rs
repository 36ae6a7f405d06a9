use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prefix the disassembler gives to functions it found no symbol for.
const ANONYMOUS_PREFIX: &str = "FUN_";

/// Call graph of one shared library, as extracted by the disassembler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeCallGraph {
    /// Library path relative to the install root, `/`-separated.
    pub library: String,
    #[serde(default)]
    pub nodes: BTreeMap<u64, NativeSymbol>,
    #[serde(default)]
    pub edges: Vec<(u64, u64)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeSymbol {
    pub name: String,
}

impl NativeCallGraph {
    pub fn new(library: impl Into<String>) -> Self {
        Self {
            library: library.into(),
            nodes: BTreeMap::new(),
            edges: Vec::new(),
        }
    }

    pub fn with_symbol(mut self, idx: u64, name: impl Into<String>) -> Self {
        self.nodes.insert(idx, NativeSymbol { name: name.into() });
        self
    }

    pub fn with_edge(mut self, src: u64, dst: u64) -> Self {
        self.edges.push((src, dst));
        self
    }

    pub fn symbol_count(&self) -> usize {
        self.nodes.len()
    }

    /// Anonymous functions share names like `FUN_00101a30` across unrelated
    /// libraries; suffix them with the library path so they stay distinct.
    pub fn qualify_anonymous_symbols(&mut self) -> usize {
        let suffix = self.library.replace('/', "_");
        let mut renamed = 0;
        for symbol in self.nodes.values_mut() {
            if symbol.name.starts_with(ANONYMOUS_PREFIX) && !symbol.name.ends_with(&suffix) {
                symbol.name = format!("{}_{}", symbol.name, suffix);
                renamed += 1;
            }
        }
        renamed
    }
}

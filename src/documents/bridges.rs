use serde::{Deserialize, Serialize};

/// One record produced by the runtime introspector: calling `pyname` from the
/// interpreted side ends up executing `cfunc` inside `library`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeRecord {
    pub pyname: String,
    pub cfunc: String,
    pub library: String,
}

impl BridgeRecord {
    pub fn target(&self) -> BridgeTarget {
        BridgeTarget {
            symbol: self.cfunc.clone(),
            library: self.library.clone(),
        }
    }

    /// Split an external caller name of the form `//<toplevel>//<dotted.name>`
    /// into its top-level import name and dotted name.
    pub fn external_parts(&self) -> Option<(&str, &str)> {
        let mut parts = self.pyname.split("//");
        let _leading = parts.next()?;
        let toplevel = parts.next()?;
        let dotted = parts.last()?;
        if toplevel.is_empty() || dotted.is_empty() {
            return None;
        }
        Some((toplevel, dotted))
    }
}

/// Bridge records discovered for one package, split by where the caller
/// name lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeDocument {
    /// Callers defined by the package itself.
    pub internal: Vec<BridgeRecord>,
    /// Callers reached through another package's exported name.
    pub external: Vec<BridgeRecord>,
}

impl BridgeDocument {
    pub fn len(&self) -> usize {
        self.internal.len() + self.external.len()
    }

    pub fn is_empty(&self) -> bool {
        self.internal.is_empty() && self.external.is_empty()
    }
}

/// The attached form of a bridge, stored on the caller's node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BridgeTarget {
    pub symbol: String,
    pub library: String,
}

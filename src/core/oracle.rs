//! Fully-qualified-name oracles.
//!
//! The stitcher asks an oracle to map a dependency's exported name (for
//! example `requests.get`) to the dotted path of the module that actually
//! defines it (`requests.api.get`). Answering that needs the interpreted
//! runtime, so the capability is injected behind [`FqnOracle`].

use dashmap::DashMap;
use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::documents::read_json;
use crate::error::{EngineError, EngineResult};

pub trait FqnOracle: Send + Sync {
    /// Canonical dotted path for `name`, or `None` when it cannot be found.
    fn resolve(&self, name: &str) -> Option<String>;
}

/// Never resolves anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOracle;

impl FqnOracle for NullOracle {
    fn resolve(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Answers from a precomputed `name -> fqn` table.
#[derive(Debug, Default, Clone)]
pub struct StaticOracle {
    table: HashMap<String, String>,
}

impl StaticOracle {
    pub fn new(table: HashMap<String, String>) -> Self {
        Self { table }
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        Ok(Self::new(read_json(path)?))
    }
}

impl FqnOracle for StaticOracle {
    fn resolve(&self, name: &str) -> Option<String> {
        self.table.get(name).cloned()
    }
}

impl<O: FqnOracle + ?Sized> FqnOracle for Box<O> {
    fn resolve(&self, name: &str) -> Option<String> {
        (**self).resolve(name)
    }
}

/// Remembers every answer, including misses, for the life of the process.
/// Safe to share between parallel application tasks.
pub struct MemoizedOracle<O> {
    inner: O,
    memo: DashMap<String, Option<String>>,
}

impl<O: FqnOracle> MemoizedOracle<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            memo: DashMap::new(),
        }
    }

    pub fn memoized(&self) -> usize {
        self.memo.len()
    }
}

impl<O: FqnOracle> FqnOracle for MemoizedOracle<O> {
    fn resolve(&self, name: &str) -> Option<String> {
        if let Some(hit) = self.memo.get(name) {
            return hit.clone();
        }
        let answer = self.inner.resolve(name);
        self.memo.insert(name.to_string(), answer.clone());
        answer
    }
}

/// Prints the defining module file and qualified name of `sys.argv[1]`.
const LOOKUP_SCRIPT: &str = r#"
import importlib, inspect, sys
parts = sys.argv[1].split('.')
for i in range(1, len(parts)):
    try:
        obj = importlib.import_module('.'.join(parts[:i]))
        for attr in parts[i:]:
            obj = getattr(obj, attr)
    except Exception:
        continue
    mod = inspect.getmodule(obj)
    path = getattr(mod, '__file__', None)
    if path:
        print(path)
        print(getattr(obj, '__qualname__', parts[-1]))
    break
"#;

/// Asks a live interpreter, with the dependency closure installed under
/// `install_root`, where a name is defined. A lookup that exceeds the timeout
/// or fails in any way is a miss.
pub struct CommandOracle {
    interpreter: String,
    install_root: PathBuf,
    timeout: Duration,
    runtime: tokio::runtime::Runtime,
}

impl CommandOracle {
    /// `install_root` must exist; it is resolved to an absolute path because
    /// the interpreter reports absolute module files.
    pub fn new(
        interpreter: impl Into<String>,
        install_root: impl Into<PathBuf>,
        timeout: Duration,
    ) -> EngineResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| EngineError::Oracle(format!("failed to start runtime: {e}")))?;
        let install_root = install_root.into();
        let install_root = install_root
            .canonicalize()
            .map_err(|e| EngineError::Oracle(format!("install root {}: {e}", install_root.display())))?;
        Ok(Self {
            interpreter: interpreter.into(),
            install_root,
            timeout,
            runtime,
        })
    }

    async fn lookup(&self, name: &str) -> EngineResult<Option<(String, String)>> {
        let mut command = tokio::process::Command::new(&self.interpreter);
        command
            .arg("-c")
            .arg(LOOKUP_SCRIPT)
            .arg(name)
            .env("PYTHONPATH", &self.install_root)
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| EngineError::Oracle(format!("lookup of {name} timed out")))?
            .map_err(|e| EngineError::Oracle(format!("failed to run {}: {e}", self.interpreter)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
        match (lines.next(), lines.next()) {
            (Some(path), Some(qualname)) => Ok(Some((path.to_string(), qualname.to_string()))),
            _ => Ok(None),
        }
    }
}

impl FqnOracle for CommandOracle {
    fn resolve(&self, name: &str) -> Option<String> {
        let found = match self.runtime.block_on(self.lookup(name)) {
            Ok(found) => found,
            Err(err) => {
                warn!("{err}");
                return None;
            }
        };
        let Some((module_file, qualname)) = found else {
            debug!("No object found for external name {name}");
            return None;
        };
        let module_file = Path::new(&module_file);
        let module_file = module_file
            .canonicalize()
            .unwrap_or_else(|_| module_file.to_path_buf());
        let module = module_path_to_dotted(&module_file, &self.install_root)?;
        Some(format!("{module}.{qualname}"))
    }
}

/// Dotted module path of `module_file` relative to `root`. Package
/// `__init__.py` files name their directory; extension modules drop their
/// platform tags (`_core.cpython-311-x86_64-linux-gnu.so` -> `_core`).
pub fn module_path_to_dotted(module_file: &Path, root: &Path) -> Option<String> {
    let rel = match module_file.strip_prefix(root) {
        Ok(rel) => rel,
        Err(_) => {
            debug!(
                "module path {} is not under {}",
                module_file.display(),
                root.display()
            );
            return None;
        }
    };
    let file_name = rel.file_name()?.to_str()?;
    let parent = rel.parent().unwrap_or_else(|| Path::new(""));

    let module = if file_name == "__init__.py" {
        parent.to_path_buf()
    } else if file_name.ends_with(".so") || file_name.contains(".so.") {
        parent.join(file_name.split('.').next()?)
    } else {
        rel.with_extension("")
    };

    let dotted: Vec<&str> = module
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    if dotted.is_empty() {
        return None;
    }
    Some(dotted.join("."))
}

use dashmap::DashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use super::{read_json, NativeCallGraph};
use crate::error::{EngineError, EngineResult};

const DEFAULT_MAX_MEMORY_ENTRIES: usize = 1000;

/// A parsed native call graph together with the file state it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedNativeGraph {
    pub graph: NativeCallGraph,
    pub timestamp: u64,
    pub file_size: u64,
}

/// Thread-safe cache of parsed native call graphs, shared by every
/// application task of a batch. Entries live in memory and, best effort, as
/// bincode files on disk; both are invalidated by modification time and size.
pub struct NativeGraphCache {
    memory_cache: DashMap<PathBuf, Arc<CachedNativeGraph>>,
    cache_dir: Option<PathBuf>,
    max_memory_entries: usize,
}

impl NativeGraphCache {
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        let cache_dir = cache_dir.and_then(|dir| match fs::create_dir_all(&dir) {
            Ok(()) => Some(dir),
            Err(err) => {
                warn!("Failed to initialize disk cache at {}: {err}", dir.display());
                None
            }
        });

        Self {
            memory_cache: DashMap::with_capacity(DEFAULT_MAX_MEMORY_ENTRIES),
            cache_dir,
            max_memory_entries: DEFAULT_MAX_MEMORY_ENTRIES,
        }
    }

    pub fn in_memory_only() -> Self {
        Self::new(None)
    }

    /// Load the graph at `path`, reusing a cached parse when the file is
    /// unchanged.
    pub fn load(&self, path: &Path) -> EngineResult<NativeCallGraph> {
        let (timestamp, file_size) = file_state(path)?;

        if let Some(entry) = self.memory_cache.get(path) {
            if entry.timestamp == timestamp && entry.file_size == file_size {
                return Ok(entry.graph.clone());
            }
        }

        if let Some(cache_path) = self.cache_path(path) {
            if let Ok(entry) = load_from_disk(&cache_path) {
                if entry.timestamp == timestamp && entry.file_size == file_size {
                    debug!("disk cache hit for {}", path.display());
                    let graph = entry.graph.clone();
                    self.remember(path, entry);
                    return Ok(graph);
                }
            }
        }

        let graph: NativeCallGraph = read_json(path)?;
        let entry = CachedNativeGraph {
            graph: graph.clone(),
            timestamp,
            file_size,
        };
        if let Some(cache_path) = self.cache_path(path) {
            if let Err(err) = store_to_disk(&cache_path, &entry) {
                warn!("Failed to cache {}: {err}", path.display());
            }
        }
        self.remember(path, entry);
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.memory_cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory_cache.is_empty()
    }

    fn remember(&self, path: &Path, entry: CachedNativeGraph) {
        if self.memory_cache.len() >= self.max_memory_entries {
            if let Some(victim) = self.memory_cache.iter().next() {
                let key = victim.key().clone();
                drop(victim);
                self.memory_cache.remove(&key);
            }
        }
        self.memory_cache.insert(path.to_path_buf(), Arc::new(entry));
    }

    fn cache_path(&self, file_path: &Path) -> Option<PathBuf> {
        let cache_dir = self.cache_dir.as_ref()?;

        let mut hasher = DefaultHasher::new();
        file_path.hash(&mut hasher);
        let hash = hasher.finish();

        Some(cache_dir.join(format!("native_{:x}.bincode", hash)))
    }
}

impl Default for NativeGraphCache {
    fn default() -> Self {
        Self::in_memory_only()
    }
}

fn file_state(path: &Path) -> EngineResult<(u64, u64)> {
    let metadata = fs::metadata(path).map_err(|e| EngineError::io(path, e))?;
    let timestamp = metadata
        .modified()
        .map_err(|e| EngineError::io(path, e))?
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    Ok((timestamp, metadata.len()))
}

fn load_from_disk(cache_path: &Path) -> anyhow::Result<CachedNativeGraph> {
    let data = fs::read(cache_path)?;
    Ok(bincode::deserialize(&data)?)
}

fn store_to_disk(cache_path: &Path, entry: &CachedNativeGraph) -> anyhow::Result<()> {
    let data = bincode::serialize(entry)?;
    fs::write(cache_path, data)?;
    Ok(())
}

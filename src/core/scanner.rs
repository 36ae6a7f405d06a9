use anyhow::Result;
use log::{debug, warn};
use rayon::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::reach::PackageIdentity;

pub const UNIFIED_FILE: &str = "unified.json";
pub const REACHED_FILE: &str = "reached.json";

/// How application directories are laid out under a data root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataLayout {
    /// `<owner>/<repo>/unified.json`, identity `owner/repo:1`.
    Repository,
    /// `<index>/<name>/<version>/unified.json`, identity `name:version`.
    Registry,
}

impl DataLayout {
    fn identity(self, rel_dir: &Path) -> Option<PackageIdentity> {
        let parts: Vec<&str> = rel_dir
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect();
        let raw = match (self, parts.as_slice()) {
            (DataLayout::Repository, [owner, repo, ..]) => format!("{owner}/{repo}"),
            (DataLayout::Registry, [_, name, version, ..]) => format!("{name}:{version}"),
            _ => return None,
        };
        PackageIdentity::parse(&raw).ok()
    }
}

/// One reachability task discovered under a data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachJob {
    pub identity: PackageIdentity,
    pub input: PathBuf,
    pub output: PathBuf,
}

pub struct CallGraphScanner {
    layout: DataLayout,
    native_pattern: Regex,
}

impl CallGraphScanner {
    pub fn new(layout: DataLayout) -> Self {
        Self {
            layout,
            // libfoo.so.json, libfoo.so.1.2.json, _core.cpython-311-x86_64-linux-gnu.so.json
            native_pattern: Regex::new(r"\.so(\.\d+)*\.json$").expect("Invalid native graph file regex"),
        }
    }

    /// Every `unified.json` under `root`, paired with the identity its
    /// directory names and a `reached.json` path mirrored under `out_root`.
    pub fn scan_unified(&self, root: &Path, out_root: &Path) -> Result<Vec<ReachJob>> {
        if !root.is_dir() {
            anyhow::bail!("{} is not a directory", root.display());
        }

        let entries: Vec<PathBuf> = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.file_name() == UNIFIED_FILE)
            .map(|e| e.into_path())
            .collect();

        let mut jobs: Vec<ReachJob> = entries
            .par_iter()
            .filter_map(|input| {
                let rel_dir = input.parent()?.strip_prefix(root).ok()?;
                let Some(identity) = self.layout.identity(rel_dir) else {
                    warn!("cannot derive a package from {}; skipping", input.display());
                    return None;
                };
                Some(ReachJob {
                    identity,
                    input: input.clone(),
                    output: out_root.join(rel_dir).join(REACHED_FILE),
                })
            })
            .collect();
        jobs.sort_by(|a, b| a.input.cmp(&b.input));
        debug!("found {} unified call graphs under {}", jobs.len(), root.display());
        Ok(jobs)
    }

    /// Native call graph documents under `root`, sorted by path so merge
    /// order is stable between runs.
    pub fn scan_native(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut found: Vec<PathBuf> = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .map(|n| self.native_pattern.is_match(n))
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        found.sort();
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_derive_identities() {
        let repo = DataLayout::Repository.identity(Path::new("octo/widget")).unwrap();
        assert_eq!(repo.to_string(), "octo/widget:1");
        let reg = DataLayout::Registry
            .identity(Path::new("pypi/requests/2.31.0"))
            .unwrap();
        assert_eq!(reg.to_string(), "requests:2.31.0");
        assert!(DataLayout::Registry.identity(Path::new("pypi/requests")).is_none());
    }
}

//! End-to-end orchestration: one application at a time through augment,
//! stitch, unify and reach, and batches of applications on a worker pool.

use anyhow::{bail, Context, Result};
use dashmap::DashMap;
use log::{debug, error, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::augment::BridgeAugmenter;
use super::oracle::{CommandOracle, FqnOracle, MemoizedOracle, NullOracle, StaticOracle};
use super::reach::{PackageIdentity, ReachOutcome, ReachabilityDetector};
use super::scanner::{CallGraphScanner, DataLayout, ReachJob, REACHED_FILE, UNIFIED_FILE};
use super::stitch::{ExternalStats, Stitcher};
use super::unify::NativeMerger;
use crate::config::EngineConfig;
use crate::documents::{
    read_json, write_json, BridgeDocument, DocumentSet, ImportMap, NativeCallGraph,
    NativeGraphCache, PartialCallGraph, UnifiedCallGraph,
};

pub const AUGMENTED_DIR: &str = "augmented";
pub const STITCHED_FILE: &str = "stitched.json";
pub const STATS_FILE: &str = "stats.json";

/// Everything one application run needs. Relative paths are taken from the
/// manifest's own directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineManifest {
    /// `name:version` or `owner/repo`.
    pub application: String,
    /// Package (`name:version`) -> partial call graph.
    pub partial_graphs: BTreeMap<String, PathBuf>,
    /// Package -> bridge document.
    pub bridges: BTreeMap<String, PathBuf>,
    pub import_map: Option<PathBuf>,
    pub native_graphs: Vec<PathBuf>,
    /// Directory searched for further `*.so*.json` native call graphs.
    pub native_dir: Option<PathBuf>,
    /// Precomputed `name -> fqn` answers.
    pub fqn_table: Option<PathBuf>,
    /// Dependency install root for live name lookups.
    pub install_root: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl PipelineManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let mut manifest: PipelineManifest =
            read_json(path).with_context(|| format!("reading manifest {}", path.display()))?;
        if let Some(base) = path.parent() {
            manifest.rebase(base);
        }
        Ok(manifest)
    }

    fn rebase(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.partial_graphs.values_mut().for_each(fix);
        self.bridges.values_mut().for_each(fix);
        self.native_graphs.iter_mut().for_each(fix);
        self.import_map.iter_mut().for_each(fix);
        self.native_dir.iter_mut().for_each(fix);
        self.fqn_table.iter_mut().for_each(fix);
        self.install_root.iter_mut().for_each(fix);
        fix(&mut self.output_dir);
    }

    pub fn reached_path(&self) -> PathBuf {
        self.output_dir.join(REACHED_FILE)
    }

    pub fn unified_path(&self) -> PathBuf {
        self.output_dir.join(UNIFIED_FILE)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub application: String,
    /// Outputs already existed and nothing was recomputed.
    pub skipped: bool,
    pub packages: usize,
    pub stats: BTreeMap<String, ExternalStats>,
    pub unresolved_bridges: usize,
    pub unified_nodes: usize,
    pub reached_nodes: usize,
    pub reached_edges: usize,
}

pub struct ApplicationPipeline<'a> {
    config: &'a EngineConfig,
    cache: &'a NativeGraphCache,
    oracles: Option<&'a OracleRegistry>,
    force: bool,
}

impl<'a> ApplicationPipeline<'a> {
    pub fn new(config: &'a EngineConfig, cache: &'a NativeGraphCache) -> Self {
        Self {
            config,
            cache,
            oracles: None,
            force: false,
        }
    }

    /// Take oracles from `registry`, so applications with the same lookup
    /// source share one memo.
    pub fn with_oracles(mut self, registry: &'a OracleRegistry) -> Self {
        self.oracles = Some(registry);
        self
    }

    /// Recompute outputs that already exist.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn run(&self, manifest: &PipelineManifest) -> Result<PipelineReport> {
        let start = Instant::now();
        let identity = PackageIdentity::parse(&manifest.application)?;
        let mut report = PipelineReport {
            application: identity.to_string(),
            ..PipelineReport::default()
        };

        if manifest.reached_path().exists() && !self.force {
            info!("{identity}: {} exists, skipping", manifest.reached_path().display());
            report.skipped = true;
            return Ok(report);
        }

        let unified = if manifest.unified_path().exists() && !self.force {
            info!("{identity}: reusing {}", manifest.unified_path().display());
            read_json(&manifest.unified_path())?
        } else {
            self.build_unified(manifest, &identity, &mut report)?
        };
        report.unified_nodes = unified.node_count();

        let reached = ReachabilityDetector::new(&identity).reach(&unified);
        write_json(&reached.graph, &manifest.reached_path())?;
        report.reached_nodes = reached.graph.node_count();
        report.reached_edges = reached.graph.edge_count();

        info!(
            "{identity}: done in {:.2}s ({} of {} nodes reachable)",
            start.elapsed().as_secs_f64(),
            report.reached_nodes,
            report.unified_nodes
        );
        Ok(report)
    }

    fn build_unified(
        &self,
        manifest: &PipelineManifest,
        identity: &PackageIdentity,
        report: &mut PipelineReport,
    ) -> Result<UnifiedCallGraph> {
        let application = identity.to_string();
        let mut docs = load_partials(manifest, &application)?;
        report.packages = docs.len();

        let import_map: ImportMap = match &manifest.import_map {
            Some(path) => optional(read_json(path), path)?.unwrap_or_default(),
            None => ImportMap::new(),
        };

        let augmenter = BridgeAugmenter::new(&import_map);
        let ordered = manifest
            .bridges
            .iter()
            .filter(|(pkg, _)| **pkg == application)
            .chain(manifest.bridges.iter().filter(|(pkg, _)| **pkg != application));
        for (package, path) in ordered {
            let Some(bridges) = optional::<BridgeDocument>(read_json(path), path)? else {
                continue;
            };
            augmenter.augment(&mut docs, package, &bridges);
        }
        let augmented_dir = manifest.output_dir.join(AUGMENTED_DIR);
        for doc in docs.iter() {
            let name = format!("{}.json", doc.package_id().replace('/', "_"));
            write_json(doc, &augmented_dir.join(name))?;
        }

        let oracle = match self.oracles {
            Some(registry) => registry.oracle_for(self.config, manifest)?,
            None => Arc::new(build_oracle(self.config, manifest)?),
        };
        let stitched = Stitcher::new(&self.config.resolver, &*oracle).stitch(docs.as_slice());
        write_json(&stitched.graph, &manifest.output_dir.join(STITCHED_FILE))?;
        write_json(&stitched.stats, &manifest.output_dir.join(STATS_FILE))?;
        report.stats = stitched.stats;

        let natives = self.load_natives(manifest)?;
        let merged = NativeMerger::new().merge(&stitched.graph, &natives);
        report.unresolved_bridges = merged.unresolved_bridges.len();
        write_json(&merged.graph, &manifest.unified_path())?;
        Ok(merged.graph)
    }

    fn load_natives(&self, manifest: &PipelineManifest) -> Result<Vec<NativeCallGraph>> {
        let paths = native_paths(manifest.native_graphs.clone(), manifest.native_dir.as_deref())?;
        Ok(read_native_graphs(&paths, self.cache, self.config.qualify_anonymous_symbols))
    }
}

/// Explicit paths followed by every native call graph found under `native_dir`.
pub fn native_paths(mut paths: Vec<PathBuf>, native_dir: Option<&Path>) -> Result<Vec<PathBuf>> {
    if let Some(dir) = native_dir {
        for path in CallGraphScanner::new(DataLayout::Registry).scan_native(dir)? {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    Ok(paths)
}

/// Load native call graphs through `cache`, skipping any that are missing or
/// malformed.
pub fn read_native_graphs(
    paths: &[PathBuf],
    cache: &NativeGraphCache,
    qualify_anonymous: bool,
) -> Vec<NativeCallGraph> {
    let mut natives = Vec::with_capacity(paths.len());
    for path in paths {
        match cache.load(path) {
            Ok(mut native) => {
                if qualify_anonymous {
                    native.qualify_anonymous_symbols();
                }
                natives.push(native);
            }
            Err(err) => warn!("skipping native call graph: {err}"),
        }
    }
    debug!("loaded {} of {} native call graphs", natives.len(), paths.len());
    natives
}

/// Load partial call graphs in the given order, skipping any that are missing
/// or malformed. Fails only when nothing could be loaded.
pub fn read_partial_graphs(paths: &[PathBuf]) -> Result<Vec<PartialCallGraph>> {
    let mut docs = Vec::with_capacity(paths.len());
    for path in paths {
        match read_json::<PartialCallGraph>(path) {
            Ok(doc) => docs.push(doc),
            Err(err) if err.is_missing() => warn!("skipping partial call graph: {err}"),
            Err(err) => error!("skipping partial call graph: {err}"),
        }
    }
    if docs.is_empty() && !paths.is_empty() {
        bail!("none of the {} partial call graphs could be loaded", paths.len());
    }
    Ok(docs)
}

/// Application document first, then dependencies in name order. Missing or
/// malformed dependency documents are skipped.
fn load_partials(manifest: &PipelineManifest, application: &str) -> Result<DocumentSet> {
    let app_path = manifest
        .partial_graphs
        .get(application)
        .with_context(|| format!("manifest names no partial call graph for {application}"))?;
    let app: PartialCallGraph = read_json(app_path)
        .with_context(|| format!("loading application call graph {}", app_path.display()))?;

    let mut docs = DocumentSet::new();
    docs.insert(app);
    for (package, path) in &manifest.partial_graphs {
        if package == application {
            continue;
        }
        match read_json::<PartialCallGraph>(path) {
            Ok(doc) => {
                if doc.package_id() != *package {
                    warn!("{} describes {}, listed as {package}", path.display(), doc.package_id());
                }
                docs.insert(doc);
            }
            Err(err) if err.is_missing() => warn!("{package}: {err}"),
            Err(err) => error!("{package}: {err}"),
        }
    }
    Ok(docs)
}

/// A missing optional document is `None`; anything else propagates.
fn optional<T>(loaded: crate::error::EngineResult<T>, path: &Path) -> Result<Option<T>> {
    match loaded {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_missing() => {
            debug!("{} not present", path.display());
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

pub type SharedOracle = MemoizedOracle<Box<dyn FqnOracle>>;

/// Precomputed table if the manifest has one, otherwise a live interpreter
/// when an install root is given, otherwise nothing resolves.
pub fn build_oracle(config: &EngineConfig, manifest: &PipelineManifest) -> Result<SharedOracle> {
    let inner: Box<dyn FqnOracle> = match (&manifest.fqn_table, &manifest.install_root) {
        (Some(table), _) => Box::new(StaticOracle::load(table)?),
        (None, Some(root)) => Box::new(CommandOracle::new(
            config.interpreter.clone(),
            root.clone(),
            Duration::from_secs(config.oracle_timeout_secs),
        )?),
        (None, None) => Box::new(NullOracle),
    };
    Ok(MemoizedOracle::new(inner))
}

/// Where an oracle gets its answers. Two manifests with the same source can
/// share memoized answers; different install roots cannot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum OracleSource {
    Table(PathBuf),
    Install(PathBuf),
    Nothing,
}

impl OracleSource {
    fn of(manifest: &PipelineManifest) -> Self {
        let canonical = |p: &PathBuf| p.canonicalize().unwrap_or_else(|_| p.clone());
        match (&manifest.fqn_table, &manifest.install_root) {
            (Some(table), _) => Self::Table(canonical(table)),
            (None, Some(root)) => Self::Install(canonical(root)),
            (None, None) => Self::Nothing,
        }
    }
}

/// Memoized oracles shared by every application of a batch, one per lookup
/// source.
#[derive(Default)]
pub struct OracleRegistry {
    oracles: DashMap<OracleSource, Arc<SharedOracle>>,
}

impl OracleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn oracle_for(&self, config: &EngineConfig, manifest: &PipelineManifest) -> Result<Arc<SharedOracle>> {
        let source = OracleSource::of(manifest);
        if let Some(oracle) = self.oracles.get(&source) {
            return Ok(Arc::clone(oracle.value()));
        }
        let built = Arc::new(build_oracle(config, manifest)?);
        Ok(Arc::clone(self.oracles.entry(source).or_insert(built).value()))
    }

    /// Distinct lookup sources seen so far.
    pub fn len(&self) -> usize {
        self.oracles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.oracles.is_empty()
    }
}

/// Reach one unified call graph on disk. Returns `None` when the output
/// already exists and `force` is off.
pub fn reach_file(job: &ReachJob, force: bool) -> Result<Option<ReachOutcome>> {
    if job.output.exists() && !force {
        debug!("{} exists, skipping", job.output.display());
        return Ok(None);
    }
    let unified: UnifiedCallGraph = read_json(&job.input)
        .with_context(|| format!("loading {}", job.input.display()))?;
    let outcome = ReachabilityDetector::new(&job.identity).reach(&unified);
    write_json(&outcome.graph, &job.output)?;
    info!("Wrote reached callgraph to {}", job.output.display());
    Ok(Some(outcome))
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub succeeded: Vec<String>,
    /// `(task, error)` pairs.
    pub failed: Vec<(String, String)>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Runs independent tasks on a dedicated worker pool. A failed task is
/// recorded and the rest carry on.
pub struct BatchRunner {
    pool: rayon::ThreadPool,
}

impl BatchRunner {
    /// `workers == 0` sizes the pool to the available parallelism.
    pub fn new(workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("unistitch-worker-{i}"))
            .build()
            .context("building worker pool")?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn run<T, L, F>(&self, tasks: &[T], label: L, task: F) -> BatchSummary
    where
        T: Sync,
        L: Fn(&T) -> String + Sync,
        F: Fn(&T) -> Result<()> + Sync,
    {
        let results: Vec<(String, Result<()>)> = self.pool.install(|| {
            tasks
                .par_iter()
                .map(|t| (label(t), task(t)))
                .collect()
        });

        let mut summary = BatchSummary::default();
        for (name, result) in results {
            match result {
                Ok(()) => summary.succeeded.push(name),
                Err(err) => {
                    error!("{name}: {err:#}");
                    summary.failed.push((name, format!("{err:#}")));
                }
            }
        }
        info!(
            "Batch finished: {} succeeded, {} failed",
            summary.succeeded.len(),
            summary.failed.len()
        );
        summary
    }
}

/// Per-library symbol counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeStats {
    pub num_syms: usize,
}

pub fn native_stats(paths: &[PathBuf], cache: &NativeGraphCache) -> BTreeMap<String, NativeStats> {
    let mut stats = BTreeMap::new();
    for path in paths {
        match cache.load(path) {
            Ok(native) => {
                stats.insert(
                    native.library.clone(),
                    NativeStats {
                        num_syms: native.symbol_count(),
                    },
                );
            }
            Err(err) => warn!("skipping {}: {err}", path.display()),
        }
    }
    stats
}

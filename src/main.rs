use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, LevelFilter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use unistitch::config::EngineConfig;
use unistitch::core::pipeline::build_oracle;
use unistitch::core::{
    native_paths, native_stats, reach_file, read_native_graphs, read_partial_graphs,
    ApplicationPipeline, BatchRunner, BridgeAugmenter, CallGraphScanner, ChainCalculator,
    DataLayout, NativeMerger, OracleRegistry, PackageIdentity, PipelineManifest, ReachabilityDetector,
    Stitcher,
};
use unistitch::documents::{
    read_json, write_json, BridgeDocument, DocumentSet, ImportMap, NativeGraphCache,
    PartialCallGraph, UnifiedCallGraph,
};
use unistitch::formatters::{ChainFormatter, SummaryFormatter};

#[derive(Debug, Parser)]
#[command(
    name = "unistitch",
    version = "0.1.0",
    author = "unistitch developers",
    about = "Cross-language call graph stitching, unification and reachability"
)]
struct Cli {
    /// Log level; RUST_LOG takes precedence when set
    #[arg(short, long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log: LogLevel,

    /// Engine configuration (JSON)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
#[value(rename_all = "kebab-case")]
enum Layout {
    /// <owner>/<repo>/unified.json
    Repository,
    /// <index>/<name>/<version>/unified.json
    Registry,
}

impl From<Layout> for DataLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Repository => DataLayout::Repository,
            Layout::Registry => DataLayout::Registry,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Attach one package's bridge records to the partial call graphs
    Augment {
        /// Package whose bridges are applied (name:version)
        #[arg(short, long)]
        package: String,
        #[arg(short, long, value_name = "FILE")]
        bridges: PathBuf,
        #[arg(short, long, value_name = "FILE")]
        import_map: Option<PathBuf>,
        /// Partial call graphs of the application and its dependencies
        #[arg(short, long = "graph", value_name = "FILE", required = true)]
        graphs: Vec<PathBuf>,
        /// Directory receiving the modified documents
        #[arg(short, long, value_name = "DIR")]
        output_dir: PathBuf,
    },
    /// Merge partial call graphs into one interpreted-side graph
    Stitch {
        #[arg(short, long = "graph", value_name = "FILE", required = true)]
        graphs: Vec<PathBuf>,
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        /// Per-package external call statistics
        #[arg(short, long, value_name = "FILE")]
        stats: Option<PathBuf>,
        /// Precomputed name -> fully qualified name table
        #[arg(long, value_name = "FILE")]
        fqn_table: Option<PathBuf>,
        /// Dependency install root for live name lookups
        #[arg(long, value_name = "DIR")]
        install_root: Option<PathBuf>,
    },
    /// Merge native library graphs into a stitched graph
    Unify {
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
        #[arg(short, long = "native", value_name = "FILE")]
        natives: Vec<PathBuf>,
        /// Directory searched for *.so*.json native graphs
        #[arg(long, value_name = "DIR")]
        native_dir: Option<PathBuf>,
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
    /// Keep what an application's entrypoints can reach
    Reach {
        /// name:version or owner/repo
        #[arg(short, long)]
        package: String,
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
    /// Reach every unified.json under a data root
    BatchReach {
        #[arg(short, long, value_name = "DIR")]
        root: PathBuf,
        #[arg(short, long, value_name = "DIR")]
        output_root: PathBuf,
        #[arg(long, value_enum, default_value_t = Layout::Repository)]
        layout: Layout,
        /// Recompute outputs that already exist
        #[arg(short, long)]
        force: bool,
    },
    /// Call chains towards a symbol and its centrality
    Chains {
        #[arg(short, long)]
        symbol: String,
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
        /// Write the chains as JSON here instead of printing them
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Run augment, stitch, unify and reach for one application
    Pipeline {
        #[arg(short, long, value_name = "FILE")]
        manifest: PathBuf,
        #[arg(short, long)]
        force: bool,
    },
    /// Run the pipeline for many applications in parallel
    Batch {
        #[arg(short, long = "manifest", value_name = "FILE", required = true)]
        manifests: Vec<PathBuf>,
        #[arg(short, long)]
        force: bool,
    },
    /// Symbol counts of native library graphs
    NativeStats {
        #[arg(short, long = "native", value_name = "FILE")]
        natives: Vec<PathBuf>,
        #[arg(long, value_name = "DIR")]
        native_dir: Option<PathBuf>,
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log.into())
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let config = EngineConfig::load_or_default(cli.config.as_deref())
        .context("loading engine configuration")?;
    let start_time = Instant::now();

    match cli.command {
        Command::Augment {
            package,
            bridges,
            import_map,
            graphs,
            output_dir,
        } => augment(&package, &bridges, import_map.as_deref(), &graphs, &output_dir)?,
        Command::Stitch {
            graphs,
            output,
            stats,
            fqn_table,
            install_root,
        } => {
            let docs = read_partial_graphs(&graphs)?;
            let manifest = PipelineManifest {
                fqn_table,
                install_root,
                ..PipelineManifest::default()
            };
            let oracle = build_oracle(&config, &manifest)?;
            let outcome = Stitcher::new(&config.resolver, &oracle).stitch(&docs);
            write_json(&outcome.graph, &output)?;
            if let Some(stats_path) = stats {
                write_json(&outcome.stats, &stats_path)?;
            }
            println!("{}", SummaryFormatter::new().stitch(&outcome.stats)?);
        }
        Command::Unify {
            input,
            natives,
            native_dir,
            output,
        } => {
            let stitched: UnifiedCallGraph = read_json(&input)
                .with_context(|| format!("loading {}", input.display()))?;
            let cache = NativeGraphCache::new(config.cache_dir.clone());
            let paths = native_paths(natives, native_dir.as_deref())?;
            let graphs = read_native_graphs(&paths, &cache, config.qualify_anonymous_symbols);
            let merged = NativeMerger::new().merge(&stitched, &graphs);
            write_json(&merged.graph, &output)?;
        }
        Command::Reach {
            package,
            input,
            output,
        } => {
            let identity = PackageIdentity::parse(&package)?;
            let unified: UnifiedCallGraph = read_json(&input)
                .with_context(|| format!("loading {}", input.display()))?;
            let outcome = ReachabilityDetector::new(&identity).reach(&unified);
            write_json(&outcome.graph, &output)?;
            info!("Wrote reached callgraph to {}", output.display());
        }
        Command::BatchReach {
            root,
            output_root,
            layout,
            force,
        } => {
            let jobs = CallGraphScanner::new(layout.into()).scan_unified(&root, &output_root)?;
            info!("Found {} unified call graphs", jobs.len());
            let runner = BatchRunner::new(config.workers)?;
            let summary = runner.run(
                jobs.as_slice(),
                |job| job.identity.to_string(),
                |job| reach_file(job, force).map(|_| ()),
            );
            println!("{}", SummaryFormatter::full().batch(&summary)?);
        }
        Command::Chains {
            symbol,
            input,
            output,
        } => {
            let reached: UnifiedCallGraph = read_json(&input)
                .with_context(|| format!("loading {}", input.display()))?;
            let report = ChainCalculator::new(symbol).calculate(&reached);
            if let Some(output) = output {
                ChainFormatter::json().format_to_file(&report, &output)?;
                info!("Wrote chains to {}", output.display());
            }
            print!("{}", ChainFormatter::text().format(&report)?);
        }
        Command::Pipeline { manifest, force } => {
            let manifest = PipelineManifest::load(&manifest)?;
            let cache = NativeGraphCache::new(config.cache_dir.clone());
            let report = ApplicationPipeline::new(&config, &cache)
                .with_force(force)
                .run(&manifest)?;
            println!("{}", SummaryFormatter::new().pipeline(&report)?);
        }
        Command::Batch { manifests, force } => {
            let cache = NativeGraphCache::new(config.cache_dir.clone());
            let oracles = OracleRegistry::new();
            let pipeline = ApplicationPipeline::new(&config, &cache)
                .with_oracles(&oracles)
                .with_force(force);
            let runner = BatchRunner::new(config.workers)?;
            info!("Running {} applications on {} workers", manifests.len(), runner.workers());
            let summary = runner.run(
                manifests.as_slice(),
                |path| path.display().to_string(),
                |path| {
                    let manifest = PipelineManifest::load(path)?;
                    pipeline.run(&manifest).map(|_| ())
                },
            );
            println!("{}", SummaryFormatter::full().batch(&summary)?);
        }
        Command::NativeStats {
            natives,
            native_dir,
            output,
        } => {
            let cache = NativeGraphCache::in_memory_only();
            let paths = native_paths(natives, native_dir.as_deref())?;
            let stats = native_stats(&paths, &cache);
            match output {
                Some(path) => write_json(&stats, &path)?,
                None => println!("{}", SummaryFormatter::full().native(&stats)?),
            }
        }
    }

    info!("Total execution time: {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

fn augment(
    package: &str,
    bridges_path: &Path,
    import_map: Option<&Path>,
    graphs: &[PathBuf],
    output_dir: &Path,
) -> Result<()> {
    let mut docs = DocumentSet::new();
    for path in graphs {
        let doc: PartialCallGraph =
            read_json(path).with_context(|| format!("loading {}", path.display()))?;
        docs.insert(doc);
    }
    let import_map: ImportMap = match import_map {
        Some(path) => read_json(path).with_context(|| format!("loading {}", path.display()))?,
        None => ImportMap::new(),
    };
    let bridges: BridgeDocument = read_json(bridges_path)
        .with_context(|| format!("loading {}", bridges_path.display()))?;

    let report = BridgeAugmenter::new(&import_map).augment(&mut docs, package, &bridges);
    for changed in &report.changed_packages {
        if let Some(doc) = docs.get(changed) {
            let path = output_dir.join(format!("{}.json", changed.replace('/', "_")));
            write_json(doc, &path)?;
            info!("Wrote {}", path.display());
        }
    }
    Ok(())
}

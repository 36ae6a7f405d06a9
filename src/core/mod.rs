pub mod augment;
pub mod chains;
pub mod graph;
pub mod oracle;
pub mod pipeline;
pub mod reach;
pub mod resolver;
pub mod scanner;
pub mod stitch;
pub mod unify;

pub use augment::{AugmentReport, BridgeAugmenter};
pub use chains::{ChainCalculator, ChainReport};
pub use graph::{GraphBuilder, IndexedGraph, Owner, SymbolNode};
pub use oracle::{CommandOracle, FqnOracle, MemoizedOracle, NullOracle, StaticOracle};
pub use pipeline::{
    native_paths, native_stats, reach_file, read_native_graphs, read_partial_graphs,
    ApplicationPipeline, BatchRunner, BatchSummary, NativeStats, OracleRegistry,
    PipelineManifest, PipelineReport,
};
pub use reach::{PackageIdentity, ReachOutcome, ReachabilityDetector};
pub use resolver::ExternalResolver;
pub use scanner::{CallGraphScanner, DataLayout, ReachJob};
pub use stitch::{ExternalStats, StitchOutcome, Stitcher};
pub use unify::{MergeOutcome, NativeMerger, BRIDGE_SENTINEL};

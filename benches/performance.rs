use criterion::{black_box, criterion_group, criterion_main, Criterion};
use unistitch::core::{ChainCalculator, NativeMerger, PackageIdentity, ReachabilityDetector};
use unistitch::documents::{BridgeTarget, NativeCallGraph, UnifiedCallGraph, UnifiedNode};

/// An application with `width` call trees of depth `depth`, each leaf
/// bridging into one of `libs` native libraries that share symbol names.
fn workload(width: u64, depth: u64, libs: usize) -> (UnifiedCallGraph, Vec<NativeCallGraph>) {
    let mut stitched = UnifiedCallGraph::default();
    let mut next = 0u64;
    for tree in 0..width {
        let mut parent = None;
        for level in 0..depth {
            let package = if level == 0 { "app:1.0" } else { "dep:2.0" };
            let mut node = UnifiedNode {
                name: format!("pkg{tree}.level{level}"),
                package: Some(package.to_string()),
                library: None,
                bridges: Vec::new(),
            };
            if level + 1 == depth {
                node.bridges.push(BridgeTarget {
                    symbol: format!("sym_{}", tree % 64),
                    library: format!("lib{}.so", tree as usize % libs),
                });
            }
            stitched.nodes.insert(next, node);
            if let Some(p) = parent {
                stitched.edges.push((p, next));
            }
            parent = Some(next);
            next += 1;
        }
    }

    let natives = (0..libs)
        .map(|l| {
            let mut lib = NativeCallGraph::new(format!("lib{l}.so"));
            for s in 0..256u64 {
                lib = lib.with_symbol(s, format!("sym_{s}"));
                if s > 0 && (s + l as u64) % 3 == 0 {
                    lib = lib.with_edge(s, s - 1);
                }
            }
            lib
        })
        .collect();
    (stitched, natives)
}

fn benchmark_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("unify_and_reach");
    let (stitched, natives) = workload(500, 8, 6);
    let identity = PackageIdentity::parse("app:1.0").unwrap();

    group.bench_function("unify", |b| {
        b.iter(|| black_box(NativeMerger::new().merge(black_box(&stitched), black_box(&natives))))
    });

    let unified = NativeMerger::new().merge(&stitched, &natives).graph;
    group.bench_function("reach", |b| {
        b.iter(|| black_box(ReachabilityDetector::new(&identity).reach(black_box(&unified))))
    });

    let reached = ReachabilityDetector::new(&identity).reach(&unified).graph;
    group.bench_function("chains", |b| {
        b.iter(|| black_box(ChainCalculator::new("sym_3").calculate(black_box(&reached))))
    });

    group.finish();
}

criterion_group!(benches, benchmark_pipeline);
criterion_main!(benches);

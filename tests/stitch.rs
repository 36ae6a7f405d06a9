use serde_json::json;
use std::collections::HashMap;
use unistitch::config::ResolverConfig;
use unistitch::core::oracle::{NullOracle, StaticOracle};
use unistitch::core::Stitcher;
use unistitch::documents::{PartialCallGraph, UnifiedCallGraph};

fn app_doc(external_calls: serde_json::Value) -> PartialCallGraph {
    serde_json::from_value(json!({
        "product": "app",
        "version": "1.0",
        "modules": {
            "internal": {
                "app/main.py": {
                    "sourceFile": "app/main.py",
                    "namespaces": {
                        "0": { "namespace": "/app/main/", "metadata": {} },
                        "1": { "namespace": "/app/main/run()", "metadata": {
                            "bridges": [{ "symbol": "do_work", "library": "app/_speed.so" }]
                        } }
                    }
                }
            },
            "external": {
                "requests": {
                    "namespaces": {
                        "2": { "namespace": "//requests//requests.get", "metadata": {} },
                        "3": { "namespace": "//requests//requests.Session", "metadata": {} },
                        "4": { "namespace": "//requests//requests.missing", "metadata": {} },
                        "5": { "namespace": "//requests//requests.fetch", "metadata": {} }
                    }
                },
                "os": {
                    "namespaces": {
                        "6": { "namespace": "//os//os.path.join", "metadata": {} }
                    }
                },
                ".builtin": {
                    "namespaces": {
                        "7": { "namespace": "//.builtin//len", "metadata": {} }
                    }
                }
            }
        },
        "graph": { "internalCalls": [["0", "1"]], "externalCalls": external_calls }
    }))
    .unwrap()
}

fn requests_doc() -> PartialCallGraph {
    serde_json::from_value(json!({
        "product": "requests",
        "version": "2.31.0",
        "modules": {
            "internal": {
                "requests/__init__.py": {
                    "namespaces": {
                        "0": { "namespace": "/requests/", "metadata": {} },
                        "1": { "namespace": "/requests/get()", "metadata": {} },
                        "2": { "namespace": "/requests/Session", "metadata": {} },
                        "3": { "namespace": "/requests/Session/__init__()", "metadata": {} }
                    }
                }
            },
            "external": {}
        },
        "graph": { "internalCalls": [[1, 2]], "externalCalls": [] }
    }))
    .unwrap()
}

fn id_of(graph: &UnifiedCallGraph, name: &str) -> u64 {
    let ids = graph.ids_named(name);
    assert_eq!(ids.len(), 1, "expected exactly one node named {name}");
    ids[0]
}

fn has_edge(graph: &UnifiedCallGraph, src: &str, dst: &str) -> bool {
    graph
        .edges
        .contains(&(id_of(graph, src), id_of(graph, dst)))
}

#[test]
fn internals_get_global_ids_in_document_order() {
    let docs = vec![app_doc(json!([])), requests_doc()];
    let cfg = ResolverConfig::default();
    let outcome = Stitcher::new(&cfg, &NullOracle).stitch(&docs);
    let g = &outcome.graph;

    assert_eq!(g.node_count(), 6);
    assert_eq!(id_of(g, "app.main"), 0);
    assert_eq!(id_of(g, "app.main.run"), 1);
    assert_eq!(id_of(g, "requests"), 2);
    assert_eq!(g.nodes[&1].package.as_deref(), Some("app:1.0"));
    assert_eq!(g.nodes[&1].bridges[0].symbol, "do_work");
    assert!(has_edge(g, "app.main", "app.main.run"));
}

#[test]
fn calling_a_class_also_calls_its_constructor() {
    let docs = vec![app_doc(json!([])), requests_doc()];
    let cfg = ResolverConfig::default();
    let g = Stitcher::new(&cfg, &NullOracle).stitch(&docs).graph;

    assert!(has_edge(&g, "requests.get", "requests.Session"));
    assert!(has_edge(&g, "requests.get", "requests.Session.__init__"));
}

#[test]
fn external_calls_are_resolved_ignored_or_missed() {
    let calls = json!([[1, 2], [1, 3], [1, 4], [1, 6], [1, 7]]);
    let docs = vec![app_doc(calls), requests_doc()];
    let cfg = ResolverConfig::default();
    let outcome = Stitcher::new(&cfg, &NullOracle).stitch(&docs);
    let g = &outcome.graph;

    let stats = &outcome.stats["app:1.0"];
    assert_eq!(stats.total, 5);
    assert_eq!(stats.found, 2);
    assert_eq!(stats.missed, 1);
    assert_eq!(stats.ignored, 2);
    assert_eq!(stats.which_missed, vec!["requests.missing".to_string()]);

    assert!(has_edge(g, "app.main.run", "requests.get"));
    assert!(has_edge(g, "app.main.run", "requests.Session"));
    assert!(has_edge(g, "app.main.run", "requests.Session.__init__"));
}

#[test]
fn stdlib_call_counts_as_neither_found_nor_missed() {
    let docs = vec![app_doc(json!([[1, 6]])), requests_doc()];
    let cfg = ResolverConfig::default();
    let outcome = Stitcher::new(&cfg, &NullOracle).stitch(&docs);

    let stats = &outcome.stats["app:1.0"];
    assert_eq!(stats.found, 0);
    assert_eq!(stats.missed, 0);
    assert_eq!(stats.ignored, 1);
    // one internal call in app, two (callee and constructor) in requests
    assert_eq!(outcome.graph.edge_count(), 3);
}

#[test]
fn oracle_resolves_reexported_names() {
    let docs = vec![app_doc(json!([[1, 5]])), requests_doc()];
    let cfg = ResolverConfig::default();

    let missed = Stitcher::new(&cfg, &NullOracle).stitch(&docs);
    assert_eq!(missed.stats["app:1.0"].missed, 1);

    let table: HashMap<String, String> =
        [("requests.fetch".to_string(), "requests.get".to_string())].into_iter().collect();
    let oracle = StaticOracle::new(table);
    let outcome = Stitcher::new(&cfg, &oracle).stitch(&docs);
    assert_eq!(outcome.stats["app:1.0"].found, 1);
    assert!(has_edge(&outcome.graph, "app.main.run", "requests.get"));
}

#[test]
fn string_method_calls_resolve_to_their_receiver() {
    let mut app = app_doc(json!([[1, 8]]));
    app.modules
        .external
        .get_mut("requests")
        .unwrap()
        .namespaces
        .insert(
            "8".to_string(),
            serde_json::from_value(json!({ "namespace": "//requests//requests.get.split" })).unwrap(),
        );
    let docs = vec![app, requests_doc()];
    let cfg = ResolverConfig::default();
    let outcome = Stitcher::new(&cfg, &NullOracle).stitch(&docs);

    assert_eq!(outcome.stats["app:1.0"].found, 1);
    assert!(has_edge(&outcome.graph, "app.main.run", "requests.get"));
}

#[test]
fn malformed_edges_are_counted_and_skipped() {
    let docs = vec![app_doc(json!([[1], [null, 2], [1, 2]])), requests_doc()];
    let cfg = ResolverConfig::default();
    let outcome = Stitcher::new(&cfg, &NullOracle).stitch(&docs);

    let stats = &outcome.stats["app:1.0"];
    assert_eq!(stats.malformed, 2);
    assert_eq!(stats.found, 1);
}

#[test]
fn no_two_nodes_share_name_and_package() {
    let mut app = app_doc(json!([]));
    app.modules
        .internal
        .get_mut("app/main.py")
        .unwrap()
        .namespaces
        .insert(
            "9".to_string(),
            serde_json::from_value(json!({ "namespace": "/app/main/run" })).unwrap(),
        );
    let docs = vec![app, requests_doc()];
    let cfg = ResolverConfig::default();
    let g = Stitcher::new(&cfg, &NullOracle).stitch(&docs).graph;

    let mut seen = std::collections::HashSet::new();
    for node in g.nodes.values() {
        assert!(seen.insert((node.name.clone(), node.package.clone())));
    }
}

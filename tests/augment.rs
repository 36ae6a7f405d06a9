use serde_json::{json, Value};
use unistitch::core::BridgeAugmenter;
use unistitch::documents::{BridgeDocument, DocumentSet, ImportMap, PartialCallGraph};

fn app_doc() -> PartialCallGraph {
    serde_json::from_value(json!({
        "product": "app",
        "version": "1.0",
        "nodes": 2,
        "generator": "static-analyzer 0.3",
        "modules": {
            "internal": {
                "app/main.py": {
                    "sourceFile": "app/main.py",
                    "namespaces": {
                        "0": { "namespace": "/app/main/", "metadata": {} },
                        "1": { "namespace": "/app/main/run", "metadata": {} }
                    }
                }
            },
            "external": {}
        },
        "graph": { "internalCalls": [[0, 1]], "externalCalls": [] }
    }))
    .unwrap()
}

fn numpy_doc() -> PartialCallGraph {
    serde_json::from_value(json!({
        "product": "numpy",
        "version": "1.26.0",
        "nodes": 2,
        "modules": {
            "internal": {
                "numpy/core/__init__.py": {
                    "sourceFile": "numpy/core/__init__.py",
                    "namespaces": {
                        "0": { "namespace": "/numpy/core/", "metadata": {} },
                        "1": { "namespace": "/core/add()", "metadata": {} }
                    }
                }
            },
            "external": {}
        },
        "graph": { "internalCalls": [], "externalCalls": [] }
    }))
    .unwrap()
}

fn docs() -> DocumentSet {
    [app_doc(), numpy_doc()].into_iter().collect()
}

fn import_map() -> ImportMap {
    [
        ("app".to_string(), "app:1.0".to_string()),
        ("numpy".to_string(), "numpy:1.26.0".to_string()),
    ]
    .into_iter()
    .collect()
}

fn bridges(value: Value) -> BridgeDocument {
    serde_json::from_value(value).unwrap()
}

fn snapshot(docs: &DocumentSet) -> Vec<Value> {
    docs.iter().map(|d| serde_json::to_value(d).unwrap()).collect()
}

#[test]
fn internal_bridge_marks_and_attaches() {
    let mut docs = docs();
    let map = import_map();
    let doc = bridges(json!({
        "internal": [{ "pyname": "/app/main/run", "cfunc": "do_work", "library": "app/_speed.so" }]
    }));

    let report = BridgeAugmenter::new(&map).augment(&mut docs, "app:1.0", &doc);
    assert_eq!(report.matched, 1);
    assert!(report.changed_packages.contains("app:1.0"));

    let app = serde_json::to_value(docs.get("app:1.0").unwrap()).unwrap();
    let ns = &app["modules"]["internal"]["app/main.py"]["namespaces"]["1"];
    assert_eq!(ns["namespace"], "/app/main/run()");
    assert_eq!(
        ns["metadata"]["bridges"],
        json!([{ "symbol": "do_work", "library": "app/_speed.so" }])
    );
    // fields the engine does not interpret survive
    assert_eq!(app["generator"], "static-analyzer 0.3");
}

#[test]
fn augmenting_twice_is_idempotent() {
    let map = import_map();
    let doc = bridges(json!({
        "internal": [{ "pyname": "/app/main/run", "cfunc": "do_work", "library": "app/_speed.so" }],
        "external": [
            { "pyname": "//numpy//numpy.core.add", "cfunc": "add_impl", "library": "numpy/core/_umath.so" },
            { "pyname": "//numpy//numpy.linalg.solve", "cfunc": "dgesv_", "library": "numpy/linalg/_lapack.so" }
        ]
    }));

    let mut docs = docs();
    let augmenter = BridgeAugmenter::new(&map);
    augmenter.augment(&mut docs, "app:1.0", &doc);
    let once = snapshot(&docs);

    let second = augmenter.augment(&mut docs, "app:1.0", &doc);
    assert_eq!(snapshot(&docs), once);
    assert!(second.changed_packages.is_empty());
    assert_eq!(second.created, 0);
}

#[test]
fn external_bridge_matches_namespace_rooted_at_toplevel() {
    let mut docs = docs();
    let map = import_map();
    let doc = bridges(json!({
        "external": [{ "pyname": "//numpy//numpy.core.add", "cfunc": "add_impl", "library": "numpy/core/_umath.so" }]
    }));

    let report = BridgeAugmenter::new(&map).augment(&mut docs, "app:1.0", &doc);
    assert_eq!(report.matched, 1);
    assert_eq!(report.created, 0);

    let numpy = docs.get("numpy:1.26.0").unwrap();
    let (_, ns) = numpy
        .internal_namespaces()
        .into_iter()
        .find(|(_, ns)| ns.namespace == "/core/add()")
        .unwrap();
    assert_eq!(ns.bridges().len(), 1);
    assert_eq!(ns.bridges()[0].symbol, "add_impl");
}

#[test]
fn unmatched_external_bridge_synthesizes_namespace() {
    let mut docs = docs();
    let map = import_map();
    let doc = bridges(json!({
        "external": [{ "pyname": "//numpy//numpy.linalg.solve", "cfunc": "dgesv_", "library": "numpy/linalg/_lapack.so" }]
    }));

    let report = BridgeAugmenter::new(&map).augment(&mut docs, "app:1.0", &doc);
    assert_eq!(report.created, 1);

    let numpy = docs.get("numpy:1.26.0").unwrap();
    let names: Vec<(u64, String)> = numpy
        .internal_namespaces()
        .into_iter()
        .map(|(i, ns)| (i, ns.namespace.clone()))
        .collect();
    assert!(names.contains(&(2, "/numpy/".to_string())));
    assert!(names.contains(&(3, "/numpy/linalg.solve()".to_string())));
    assert_eq!(numpy.nodes, Some(4));

    let synthesized = &numpy.modules.internal["/numpy/"];
    assert_eq!(synthesized.namespaces["3"].bridges()[0].symbol, "dgesv_");
}

#[test]
fn unknown_toplevel_is_dropped_without_changes() {
    let mut docs = docs();
    let before = snapshot(&docs);
    let map = import_map();
    let doc = bridges(json!({
        "external": [{ "pyname": "//scipy//scipy.linalg.solve", "cfunc": "dgesv_", "library": "scipy/_lapack.so" }]
    }));

    let report = BridgeAugmenter::new(&map).augment(&mut docs, "app:1.0", &doc);
    assert_eq!(report.dropped, 1);
    assert_eq!(snapshot(&docs), before);
}

#[test]
fn missing_internal_caller_is_counted() {
    let mut docs = docs();
    let map = import_map();
    let doc = bridges(json!({
        "internal": [{ "pyname": "/app/main/gone", "cfunc": "f", "library": "app/_speed.so" }]
    }));

    let report = BridgeAugmenter::new(&map).augment(&mut docs, "app:1.0", &doc);
    assert_eq!(report.unmatched, 1);
    assert_eq!(report.matched, 0);
}

use serde_json::json;
use unistitch::core::{ChainCalculator, PackageIdentity, ReachabilityDetector};
use unistitch::documents::UnifiedCallGraph;
use unistitch::formatters::ChainFormatter;

fn reached_app() -> UnifiedCallGraph {
    let unified: UnifiedCallGraph = serde_json::from_value(json!({
        "nodes": {
            "0": { "name": "app.main", "package": "app:1.0" },
            "1": { "name": "app.helper", "package": "app:1.0" },
            "2": { "name": "dep.vuln", "package": "dep:2.0" }
        },
        "edges": [[0, 1], [1, 2]]
    }))
    .unwrap();
    let identity = PackageIdentity::parse("app:1.0").unwrap();
    ReachabilityDetector::new(&identity).reach(&unified).graph
}

/// Two roots reach `sink` (one directly, one through a longer path), a third
/// root does not.
fn fan_in() -> UnifiedCallGraph {
    serde_json::from_value(json!({
        "nodes": {
            "0": { "name": "cli.main", "package": "app:1.0" },
            "1": { "name": "web.serve", "package": "app:1.0" },
            "2": { "name": "jobs.cron", "package": "app:1.0" },
            "3": { "name": "core.parse", "package": "app:1.0" },
            "4": { "name": "core.decode", "package": "app:1.0" },
            "5": { "name": "sink", "library": "lib/_codec.so" },
            "6": { "name": "jobs.cleanup", "package": "app:1.0" }
        },
        "edges": [[0, 5], [1, 3], [3, 4], [4, 5], [1, 4], [2, 6]]
    }))
    .unwrap()
}

#[test]
fn single_root_reaching_symbol_has_full_centrality() {
    let report = ChainCalculator::new("dep.vuln").calculate(&reached_app());
    assert!(report.symbol_present);
    assert_eq!(report.roots, 1);
    assert_eq!(
        report.chains,
        vec![vec![
            "app.main".to_string(),
            "app.helper".to_string(),
            "dep.vuln".to_string()
        ]]
    );
    assert_eq!(report.centrality, Some(1.0));
}

#[test]
fn chains_are_shortest_and_sorted_by_length() {
    let report = ChainCalculator::new("sink").calculate(&fan_in());
    assert_eq!(report.roots, 3);
    assert_eq!(
        report.chains,
        vec![
            vec!["cli.main".to_string(), "sink".to_string()],
            vec![
                "web.serve".to_string(),
                "core.decode".to_string(),
                "sink".to_string()
            ],
        ]
    );
    let centrality = report.centrality.unwrap();
    assert!((centrality - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn absent_symbol_gives_empty_report() {
    let report = ChainCalculator::new("nowhere").calculate(&fan_in());
    assert!(!report.symbol_present);
    assert!(report.chains.is_empty());
    assert_eq!(report.centrality, None);
}

#[test]
fn centrality_is_undefined_without_roots() {
    let cycle: UnifiedCallGraph = serde_json::from_value(json!({
        "nodes": {
            "0": { "name": "a", "package": "app:1.0" },
            "1": { "name": "b", "package": "app:1.0" }
        },
        "edges": [[0, 1], [1, 0]]
    }))
    .unwrap();
    let report = ChainCalculator::new("b").calculate(&cycle);
    assert!(report.symbol_present);
    assert_eq!(report.roots, 0);
    assert_eq!(report.centrality, None);
}

#[test]
fn centrality_stays_within_bounds() {
    let graph = fan_in();
    for node in graph.nodes.values() {
        let report = ChainCalculator::new(node.name.clone()).calculate(&graph);
        let c = report.centrality.unwrap();
        assert!((0.0..=1.0).contains(&c), "{} has centrality {c}", node.name);
    }
}

#[test]
fn text_listing_numbers_chains() {
    let report = ChainCalculator::new("dep.vuln").calculate(&reached_app());
    let text = ChainFormatter::text().format(&report).unwrap();
    assert_eq!(
        text,
        "Call chains to dep.vuln\n#[1]: app.main -> app.helper -> dep.vuln\nCENTRALITY: 1\n"
    );
}

#[test]
fn json_output_is_a_list_of_name_lists() {
    let dir = tempfile::TempDir::new().unwrap();
    let out = dir.path().join("chains/dep.vuln.json");
    let report = ChainCalculator::new("dep.vuln").calculate(&reached_app());
    ChainFormatter::json().format_to_file(&report, &out).unwrap();

    let written: Vec<Vec<String>> =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written, report.chains);
}

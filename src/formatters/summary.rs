use anyhow::Result;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::core::{BatchSummary, ExternalStats, NativeStats, PipelineReport};

/// JSON summaries printed at the end of a command. Compact output keeps only
/// the counters; full output adds the lists behind them.
pub struct SummaryFormatter {
    minimal: bool,
}

impl SummaryFormatter {
    pub fn new() -> Self {
        Self { minimal: true }
    }

    pub fn full() -> Self {
        Self { minimal: false }
    }

    pub fn batch(&self, summary: &BatchSummary) -> Result<String> {
        let mut out = json!({
            "total": summary.total(),
            "succeeded": summary.succeeded.len(),
            "failed": summary.failed.len(),
        });
        if !self.minimal {
            out["failures"] = summary
                .failed
                .iter()
                .map(|(task, err)| json!({ "task": task, "error": err }))
                .collect();
        }
        self.render(&out)
    }

    pub fn pipeline(&self, report: &PipelineReport) -> Result<String> {
        let mut out = json!({
            "application": report.application,
            "skipped": report.skipped,
            "packages": report.packages,
            "unified_nodes": report.unified_nodes,
            "reached_nodes": report.reached_nodes,
            "reached_edges": report.reached_edges,
            "unresolved_bridges": report.unresolved_bridges,
        });
        out["externals"] = self.external_totals(&report.stats);
        if !self.minimal {
            out["stats"] = serde_json::to_value(&report.stats)?;
        }
        self.render(&out)
    }

    pub fn stitch(&self, stats: &BTreeMap<String, ExternalStats>) -> Result<String> {
        if self.minimal {
            return self.render(&self.external_totals(stats));
        }
        self.render(&serde_json::to_value(stats)?)
    }

    pub fn native(&self, stats: &BTreeMap<String, NativeStats>) -> Result<String> {
        self.render(&serde_json::to_value(stats)?)
    }

    fn external_totals(&self, stats: &BTreeMap<String, ExternalStats>) -> Value {
        let (mut total, mut found, mut missed, mut ignored) = (0, 0, 0, 0);
        for s in stats.values() {
            total += s.total;
            found += s.found;
            missed += s.missed;
            ignored += s.ignored;
        }
        json!({ "total": total, "found": found, "missed": missed, "ignored": ignored })
    }

    fn render(&self, value: &Value) -> Result<String> {
        if self.minimal {
            Ok(serde_json::to_string(value)?)
        } else {
            Ok(serde_json::to_string_pretty(value)?)
        }
    }
}

impl Default for SummaryFormatter {
    fn default() -> Self {
        Self::new()
    }
}

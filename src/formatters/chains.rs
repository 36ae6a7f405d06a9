use anyhow::Result;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::core::ChainReport;

/// Renders a chain report either as the numbered text listing or as a JSON
/// list of name lists.
pub struct ChainFormatter {
    json: bool,
}

impl ChainFormatter {
    pub fn text() -> Self {
        Self { json: false }
    }

    pub fn json() -> Self {
        Self { json: true }
    }

    pub fn format_to_file(&self, report: &ChainReport, output_path: &Path) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(output_path, self.format(report)?)?;
        Ok(())
    }

    pub fn format(&self, report: &ChainReport) -> Result<String> {
        if self.json {
            return Ok(serde_json::to_string_pretty(&report.chains)?);
        }

        let mut out = String::new();
        writeln!(out, "Call chains to {}", report.symbol)?;
        for (i, chain) in report.chains.iter().enumerate() {
            writeln!(out, "#[{}]: {}", i + 1, chain.join(" -> "))?;
        }
        match report.centrality {
            Some(c) => writeln!(out, "CENTRALITY: {c}")?,
            None => writeln!(out, "CENTRALITY: undefined")?,
        }
        Ok(out)
    }
}

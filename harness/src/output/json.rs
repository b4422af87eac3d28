//! JSON report export

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

use super::BenchReport;

/// Write `report` as pretty-printed JSON to `output_path`
pub fn write_report(report: &BenchReport, output_path: &Path) -> Result<()> {
    info!("Writing JSON report: {}", output_path.display());

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create report file: {}", output_path.display()))?;

    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .context("Failed to serialize report to JSON")?;

    Ok(())
}

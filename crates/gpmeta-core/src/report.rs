use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::ProcessResult;

#[derive(Serialize)]
struct Report<'a> {
    input: &'a Path,
    output: &'a Path,
    generated_at: String,
    #[serde(flatten)]
    result: &'a ProcessResult,
}

/// Write the run result as pretty JSON.
pub fn write_report(result: &ProcessResult, input: &Path, output: &Path, report_path: &Path) -> anyhow::Result<()> {
    let report = Report {
        input,
        output,
        generated_at: chrono::Local::now().to_rfc3339(),
        result,
    };

    let file = std::fs::File::create(report_path)
        .with_context(|| format!("cannot create report {}", report_path.display()))?;
    serde_json::to_writer_pretty(file, &report)?;
    Ok(())
}

//! JSON run reports.
//!
//! # Output Structure
//!
//! Reports are grouped by the UTC date the run started:
//! ```text
//! report_dir/
//! └── 2026-10-15/
//!     ├── run-060000.json
//!     └── run-180000.json
//! ```

use std::error::Error;
use std::path::PathBuf;

use tokio::fs;
use tracing::{error, info, instrument};

use crate::models::BatchReport;

/// Write a [`BatchReport`] as pretty JSON under `report_dir`.
///
/// Returns the path written: `{report_dir}/{date}/run-{HHMMSS}.json`.
#[instrument(level = "info", skip_all, fields(report_dir = %report_dir))]
pub async fn write_report(report: &BatchReport, report_dir: &str) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;

    let dated_dir = PathBuf::from(report_dir).join(report.started_at.format("%Y-%m-%d").to_string());
    info!(dir = %dated_dir.display(), "Ensuring report directory exists");
    if let Err(e) = fs::create_dir_all(&dated_dir).await {
        error!(dir = %dated_dir.display(), error = %e, "Failed to create report dir");
        return Err(e.into());
    }

    let path = dated_dir.join(format!("run-{}.json", report.started_at.format("%H%M%S")));
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote run report");
    Ok(path)
}

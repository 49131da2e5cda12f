//! JSON output for research reports.
//!
//! The report serializes as:
//!
//! ```text
//! {
//!   "query": "...",
//!   "run_at": "2024-05-01T12:00:00Z",
//!   "sources": {
//!     "<source id>": { "count": N, "records": [...], "detail"?: {...}, "failure"?: "..." },
//!     ...
//!   },
//!   "enrichments": [...]
//! }
//! ```
//!
//! Sources appear in registration order. A multi-topic run wraps reports in
//! an object keyed by topic, in topic order.

use crate::models::{ResearchReport, TopicReports};
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// Pretty-printed JSON for `report`.
pub fn report_to_json(report: &ResearchReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

/// Pretty-printed JSON for a multi-topic run.
pub fn reports_to_json(research: &TopicReports) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(research)
}

/// Write a [`ResearchReport`] as pretty JSON to `path`.
///
/// Parent directories are created as needed.
///
/// # Arguments
///
/// * `report` - The finished research run
/// * `path` - Destination file
///
/// # Returns
///
/// `Ok(())` on success, or an error if directory creation or file writing fails.
#[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
pub async fn write_report(
    report: &ResearchReport,
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn Error>> {
    write_json(&report_to_json(report)?, path.as_ref()).await?;
    info!(
        sources = report.sections.len(),
        records = report.total_records(),
        "Wrote JSON report"
    );
    Ok(())
}

/// Write every report of a multi-topic run into one JSON file.
#[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
pub async fn write_reports(
    research: &TopicReports,
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn Error>> {
    write_json(&reports_to_json(research)?, path.as_ref()).await?;
    info!(
        topics = research.reports.len(),
        records = research.total_records(),
        "Wrote JSON reports"
    );
    Ok(())
}

async fn write_json(json: &str, path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent).await {
            error!(dir = %parent.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    fs::write(path, json).await?;
    Ok(())
}

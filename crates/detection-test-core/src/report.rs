//! Report generation for detection runs.

use crate::presenter::TestCaseView;
use crate::types::{DetectionKind, RunSummary};
use serde::Serialize;
use time::OffsetDateTime;
use time::macros::format_description;

/// Format for report output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Table,
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown format: {s}. Valid formats: table, json")),
        }
    }
}

/// Report for one detection run.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub detection: String,
    pub kind: DetectionKind,
    pub path: String,
    pub tests: Vec<TestCaseView>,
    pub summary: RunSummary,
    /// Run-level banner when the request itself failed.
    pub error: Option<String>,
}

/// Top-level JSON document.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub timestamp: String,
    pub detections: Vec<DetectionReport>,
}

impl ExecutionReport {
    /// Build a report stamped with the current UTC time.
    #[must_use]
    pub fn now(detections: Vec<DetectionReport>) -> Self {
        Self {
            timestamp: timestamp_now(),
            detections,
        }
    }
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
#[must_use]
pub fn timestamp_now() -> String {
    OffsetDateTime::now_utc()
        .format(&format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        ))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Format a report as pretty JSON.
#[must_use]
pub fn format_report_json(report: &ExecutionReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

/// Format a one-line summary for a detection.
#[must_use]
pub fn format_detection_summary(name: &str, summary: &RunSummary) -> String {
    format!("{name}: {}/{} passed", summary.passed, summary.total)
}

//! Stage and run reports persisted under `report/`.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taxograph_conformance::ConformanceReport;
use taxograph_spec::io;
use taxograph_spec::layout::build;

/// Outcome of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Ran and succeeded.
    Ok,
    /// Fingerprint unchanged; execution skipped.
    SkippedCached,
    /// Raised an error or failed verification.
    Failed,
}

impl StageStatus {
    /// Returns the status as printed in console summaries.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::SkippedCached => "skipped (cached)",
            Self::Failed => "failed",
        }
    }
}

/// Pass/warn/fail counts of a stage verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSummary {
    /// Passing checks.
    pub passed: usize,
    /// Warnings.
    pub warnings: usize,
    /// Failing checks.
    pub failed: usize,
}

impl From<&ConformanceReport> for VerificationSummary {
    fn from(report: &ConformanceReport) -> Self {
        let failed = report.failure_count();
        let warnings = report.warning_count();
        Self {
            passed: report.results.len() - failed - warnings,
            warnings,
            failed,
        }
    }
}

/// Contents of `report/stages/<id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    /// Stage id.
    pub stage: String,
    /// Outcome.
    pub status: StageStatus,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
    /// Fingerprint the stage ran (or was skipped) under.
    pub fingerprint: String,
    /// Rendered error chain when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stage counters.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub stats: Value,
    /// Verification outcome when run with tests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationSummary>,
}

impl StageReport {
    /// Path of the report of `stage` under `build_dir`.
    #[must_use]
    pub fn path(build_dir: &Path, stage: &str) -> std::path::PathBuf {
        build_dir
            .join(build::STAGE_REPORTS)
            .join(format!("{stage}.json"))
    }

    /// Reads the previous report of `stage`, if a readable one exists.
    #[must_use]
    pub fn previous(build_dir: &Path, stage: &str) -> Option<Self> {
        let path = Self::path(build_dir, stage);
        if !path.is_file() {
            return None;
        }
        match io::read_json(&path) {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::warn!(
                    stage,
                    error = %format!("{err:#}"),
                    "ignoring unreadable stage report"
                );
                None
            }
        }
    }

    /// Writes this report.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, build_dir: &Path) -> Result<()> {
        io::write_json(&Self::path(build_dir, &self.stage), self)
    }
}

/// Contents of `report/run.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// What was asked for (`taxonomy`, `substrates..canon`, `build`).
    pub selection: String,
    /// Overall outcome.
    pub status: StageStatus,
    /// Total wall time in milliseconds.
    pub duration_ms: u64,
    /// One entry per stage attempted, in order.
    pub stages: Vec<StageReport>,
    /// Stage that stopped the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
}

impl RunReport {
    /// Number of stages skipped as cached.
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::SkippedCached)
            .count()
    }

    /// Writes `report/run.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, build_dir: &Path) -> Result<()> {
        io::write_json(&build_dir.join(build::RUN_REPORT), self)
    }
}

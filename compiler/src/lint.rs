//! Lint log: locally recovered rule and data-quality issues.
//!
//! Nothing here aborts a build. Offending rows are dropped by the caller and
//! recorded so that `report/lint.json` accounts for every one of them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Severity of a lint issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LintSeverity {
    /// Suspicious but harmless.
    Warning,
    /// The offending row was dropped or rejected.
    Error,
}

/// A single lint finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LintIssue {
    /// Rule file or artifact the issue came from.
    pub source: String,
    /// Stable machine-readable code (`unknown_transform`, `bad_bucket`, ...).
    pub code: String,
    /// Severity.
    pub severity: LintSeverity,
    /// Human-readable message.
    pub message: String,
}

/// Accumulates lint issues during a stage.
#[derive(Debug, Clone, Default)]
pub struct LintLog {
    issues: Vec<LintIssue>,
}

impl LintLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning.
    pub fn warn(&mut self, source: &str, code: &str, message: impl Into<String>) {
        self.push(source, code, LintSeverity::Warning, message.into());
    }

    /// Records an error (the row was dropped or rejected).
    pub fn error(&mut self, source: &str, code: &str, message: impl Into<String>) {
        self.push(source, code, LintSeverity::Error, message.into());
    }

    fn push(&mut self, source: &str, code: &str, severity: LintSeverity, message: String) {
        match severity {
            LintSeverity::Warning => tracing::debug!(source, code, "{message}"),
            LintSeverity::Error => tracing::warn!(source, code, "{message}"),
        }
        self.issues.push(LintIssue {
            source: source.to_owned(),
            code: code.to_owned(),
            severity,
            message,
        });
    }

    /// Returns all recorded issues.
    #[must_use]
    pub fn issues(&self) -> &[LintIssue] {
        &self.issues
    }

    /// Returns the number of error-severity issues.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == LintSeverity::Error)
            .count()
    }

    /// Returns the number of issues recorded with `code`.
    #[must_use]
    pub fn count(&self, code: &str) -> usize {
        self.issues.iter().filter(|i| i.code == code).count()
    }

    /// Freezes the log into its serializable report form.
    #[must_use]
    pub fn into_report(self) -> LintReport {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.code.clone()).or_default() += 1;
        }
        let errors = self.error_count();
        LintReport {
            errors,
            warnings: self.issues.len() - errors,
            counts,
            issues: self.issues,
        }
    }
}

/// Contents of `report/lint.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LintReport {
    /// Number of error-severity issues.
    pub errors: usize,
    /// Number of warnings.
    pub warnings: usize,
    /// Issue count per code.
    pub counts: BTreeMap<String, usize>,
    /// Every issue in discovery order.
    pub issues: Vec<LintIssue>,
}

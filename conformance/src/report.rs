//! Verification report types.

use serde::Serialize;

/// How many offending items a failed check lists.
const MAX_DETAILS: usize = 20;

/// Outcome class of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The check passed.
    Pass,
    /// Suspicious, but the artifact is usable.
    Warning,
    /// The artifact breaks a stage contract.
    Failure,
}

impl Severity {
    /// Returns the console tag.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Warning => "WARN",
            Self::Failure => "FAIL",
        }
    }
}

/// One check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResult {
    /// `stage/check` identifier.
    pub validator: String,
    /// Human-readable outcome.
    pub message: String,
    /// Severity.
    pub severity: Severity,
    /// Offending items, truncated.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl TestResult {
    fn new(validator: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            validator: validator.into(),
            message: message.into(),
            severity,
            details: Vec::new(),
        }
    }

    /// Creates a passing result.
    #[must_use]
    pub fn pass(validator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(validator, message, Severity::Pass)
    }

    /// Creates a warning.
    #[must_use]
    pub fn warn(validator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(validator, message, Severity::Warning)
    }

    /// Creates a failure.
    #[must_use]
    pub fn fail(validator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(validator, message, Severity::Failure)
    }

    /// Attaches detail lines, keeping at most a screenful.
    #[must_use]
    pub fn with_details(mut self, details: Vec<String>) -> Self {
        let total = details.len();
        self.details = details.into_iter().take(MAX_DETAILS).collect();
        if total > MAX_DETAILS {
            self.details.push(format!("... and {} more", total - MAX_DETAILS));
        }
        self
    }

    /// Returns true if this result is a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.severity == Severity::Failure
    }
}

/// Results of every check run against one or more stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConformanceReport {
    /// Results in check order.
    pub results: Vec<TestResult>,
}

impl ConformanceReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a result.
    pub fn push(&mut self, result: TestResult) {
        self.results.push(result);
    }

    /// Appends every result of `other`.
    pub fn extend(&mut self, other: ConformanceReport) {
        self.results.extend(other.results);
    }

    /// Records `what` as passed when `problems` is empty, else as failed
    /// with the problems as details.
    pub fn check(&mut self, validator: &str, what: &str, problems: Vec<String>) {
        if problems.is_empty() {
            self.push(TestResult::pass(validator, what));
        } else {
            let message = format!("{what}: {} problem(s)", problems.len());
            self.push(TestResult::fail(validator, message).with_details(problems));
        }
    }

    /// Returns the number of failures.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_failure()).count()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.severity == Severity::Warning)
            .count()
    }

    /// Returns true if no check failed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failure_count() == 0
    }
}

//! Orchestrator errors and their process exit codes.

use thiserror::Error;

/// Exit code for a stage execution or verification failure.
pub const EXIT_FAILURE: u8 = 1;

/// Exit code for a preflight or selection failure.
pub const EXIT_PREFLIGHT: u8 = 2;

/// Why a pipeline invocation stopped.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The selection names no known stage.
    #[error("unknown stage `{name}` (expected one of: {known}, or `build`)")]
    UnknownStage {
        /// What was asked for.
        name: String,
        /// Comma-separated known stage ids.
        known: String,
    },

    /// A `start..end` range runs backwards.
    #[error("stage range `{0}` is empty: its start comes after its end")]
    EmptyRange(String),

    /// Required upstream artifacts are missing and no selected stage makes them.
    #[error("preflight failed for stage `{stage}`: missing {}", missing.join(", "))]
    Preflight {
        /// Stage that needs the artifacts.
        stage: String,
        /// Build-relative paths that do not exist.
        missing: Vec<String>,
    },

    /// A stage raised an error; later stages were not run.
    #[error("stage `{stage}` failed: {message}")]
    Stage {
        /// Failing stage.
        stage: String,
        /// Rendered error chain.
        message: String,
    },

    /// A stage's verification found failing checks.
    #[error("verification of stage `{stage}` failed: {failures} check(s) did not pass")]
    Verification {
        /// Verified stage.
        stage: String,
        /// Number of failing checks.
        failures: usize,
    },

    /// Reading configuration or writing reports failed.
    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    /// Returns the process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::UnknownStage { .. } | Self::EmptyRange(_) | Self::Preflight { .. } => {
                EXIT_PREFLIGHT
            }
            Self::Stage { .. } | Self::Verification { .. } | Self::Internal(_) => EXIT_FAILURE,
        }
    }
}

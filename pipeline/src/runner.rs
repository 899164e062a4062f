//! Sequential stage execution with fingerprint caching.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use serde_json::Value;
use taxograph_conformance::{ConformanceReport, VerifyPaths};
use tracing::{error, info, warn};

use crate::config::BuildConfig;
use crate::context::StageContext;
use crate::error::{PipelineError, EXIT_FAILURE};
use crate::fingerprint;
use crate::report::{RunReport, StageReport, StageStatus, VerificationSummary};
use crate::stages::{self, StageDef};

/// Switches of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Skip stages whose fingerprint matches their last successful run.
    pub use_cache: bool,
    /// Verify each stage's artifacts after it runs.
    pub with_tests: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            with_tests: false,
        }
    }
}

/// Result of a run that got past selection and preflight.
#[derive(Debug)]
pub struct RunOutcome {
    /// What was persisted to `report/run.json`.
    pub report: RunReport,
    /// Why the run stopped early, if it did.
    pub error: Option<PipelineError>,
}

impl RunOutcome {
    /// Returns the process exit code.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        self.error.as_ref().map_or(0, PipelineError::exit_code)
    }
}

/// Runs stages of one build.
#[derive(Debug)]
pub struct Pipeline {
    ctx: StageContext,
    options: RunOptions,
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl Pipeline {
    /// Creates a pipeline over `ontology` and `build`, reading the build
    /// config. A config with `[cache] enabled = false` disables caching.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Internal`] if `taxograph.toml` is invalid.
    pub fn new(
        ontology: PathBuf,
        build: PathBuf,
        options: RunOptions,
    ) -> Result<Self, PipelineError> {
        let config = BuildConfig::load(&ontology)?;
        let options = RunOptions {
            use_cache: options.use_cache && config.cache.enabled,
            ..options
        };
        Ok(Self {
            ctx: StageContext::new(ontology, build, config),
            options,
        })
    }

    /// Shared stage state.
    #[must_use]
    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    /// Effective options after applying the build config.
    #[must_use]
    pub fn options(&self) -> RunOptions {
        self.options
    }

    /// Checks that each stage's required artifacts exist on disk or are
    /// written by an earlier stage of `selected`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Preflight`] naming the first stage that
    /// cannot run and everything it is missing.
    pub fn preflight(&self, selected: &[StageDef]) -> Result<(), PipelineError> {
        if let Some(first) = selected.first() {
            if !self.ctx.ontology_dir().is_dir() {
                return Err(PipelineError::Preflight {
                    stage: first.id.to_owned(),
                    missing: vec![self.ctx.ontology_dir().display().to_string()],
                });
            }
        }
        let mut produced: BTreeSet<&str> = BTreeSet::new();
        for stage in selected {
            let missing: Vec<String> = stage
                .requires
                .iter()
                .filter(|rel| !produced.contains(*rel) && !self.ctx.artifact(rel).exists())
                .map(|rel| (*rel).to_owned())
                .collect();
            if !missing.is_empty() {
                return Err(PipelineError::Preflight {
                    stage: stage.id.to_owned(),
                    missing,
                });
            }
            produced.extend(stage.outputs.iter().copied());
        }
        Ok(())
    }

    /// Computes the current fingerprint of `stage`.
    ///
    /// # Errors
    ///
    /// Returns an error if an input file cannot be read.
    pub fn fingerprint(&self, stage: &StageDef) -> Result<String> {
        let settings = (stage.settings)(self.ctx.config());
        let logic = fingerprint::logic_digest(&[
            stage.id,
            stage.logic_version,
            env!("CARGO_PKG_VERSION"),
            &settings,
        ]);
        let inputs = fingerprint::inputs_digest(stage.inputs, |root| self.ctx.root_dir(root))?;
        Ok(fingerprint::combine(&logic, &inputs))
    }

    /// Runs the stages named by `selection` in order, stopping at the first
    /// failure. Stage reports and `report/run.json` are written either way.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown selection, a failed preflight, or a
    /// report that cannot be written.
    pub fn run(&self, selection: &str) -> Result<RunOutcome, PipelineError> {
        let selected = stages::select(selection)?;
        self.preflight(selected)?;

        let started = Instant::now();
        let mut report = RunReport {
            selection: selection.to_owned(),
            status: StageStatus::Ok,
            duration_ms: 0,
            stages: Vec::with_capacity(selected.len()),
            failed_stage: None,
        };
        let mut failure = None;
        for stage in selected {
            let (stage_report, error) = self.run_stage(stage);
            stage_report.write(self.ctx.build_dir())?;
            report.stages.push(stage_report);
            if let Some(error) = error {
                report.status = StageStatus::Failed;
                report.failed_stage = Some(stage.id.to_owned());
                failure = Some(error);
                break;
            }
        }
        report.duration_ms = elapsed_ms(started);
        report.write(self.ctx.build_dir())?;
        info!(
            selection,
            stages = report.stages.len(),
            cached = report.cached_count(),
            duration_ms = report.duration_ms,
            "run finished"
        );
        Ok(RunOutcome {
            report,
            error: failure,
        })
    }

    fn run_stage(&self, stage: &StageDef) -> (StageReport, Option<PipelineError>) {
        let started = Instant::now();
        let mut report = StageReport {
            stage: stage.id.to_owned(),
            status: StageStatus::Ok,
            duration_ms: 0,
            fingerprint: String::new(),
            error: None,
            stats: Value::Null,
            verification: None,
        };

        let executed = self.fingerprint(stage).and_then(|fingerprint| {
            report.fingerprint = fingerprint;
            if let Some(stats) = self.cached_stats(stage, &report.fingerprint) {
                info!(stage = stage.id, "skipped (cached)");
                report.status = StageStatus::SkippedCached;
                return Ok(stats);
            }
            info!(stage = stage.id, "running");
            (stage.run)(&self.ctx)
        });
        let outcome = match executed {
            Ok(stats) => {
                report.stats = stats;
                if self.options.with_tests {
                    self.verify_into(stage, &mut report)
                } else {
                    None
                }
            }
            Err(err) => {
                let message = format!("{err:#}");
                error!(stage = stage.id, error = %message, "stage failed");
                report.status = StageStatus::Failed;
                report.error = Some(message.clone());
                Some(PipelineError::Stage {
                    stage: stage.id.to_owned(),
                    message,
                })
            }
        };
        report.duration_ms = elapsed_ms(started);
        if outcome.is_none() && report.status == StageStatus::Ok {
            info!(
                stage = stage.id,
                duration_ms = report.duration_ms,
                "stage finished"
            );
        }
        (report, outcome)
    }

    /// Returns the recorded counters if `stage` may be skipped: caching is
    /// on, its last run succeeded under `fingerprint`, and its outputs exist.
    fn cached_stats(&self, stage: &StageDef, fingerprint: &str) -> Option<Value> {
        if !self.options.use_cache {
            return None;
        }
        let previous = StageReport::previous(self.ctx.build_dir(), stage.id)?;
        let outputs_present = stage.outputs.iter().all(|rel| self.ctx.artifact(rel).exists());
        (previous.status != StageStatus::Failed
            && previous.fingerprint == fingerprint
            && outputs_present)
            .then_some(previous.stats)
    }

    /// Verifies `stage` and records the outcome on `report`.
    fn verify_into(&self, stage: &StageDef, report: &mut StageReport) -> Option<PipelineError> {
        match (stage.verify)(&self.verify_paths()) {
            Ok(checks) => {
                let summary = VerificationSummary::from(&checks);
                report.verification = Some(summary);
                if summary.failed == 0 {
                    return None;
                }
                for result in checks.results.iter().filter(|r| r.is_failure()) {
                    warn!(stage = stage.id, check = %result.validator, "{}", result.message);
                }
                let error = PipelineError::Verification {
                    stage: stage.id.to_owned(),
                    failures: summary.failed,
                };
                report.status = StageStatus::Failed;
                report.error = Some(error.to_string());
                Some(error)
            }
            Err(err) => {
                let message = format!("verification could not run: {err:#}");
                report.status = StageStatus::Failed;
                report.error = Some(message.clone());
                Some(PipelineError::Stage {
                    stage: stage.id.to_owned(),
                    message,
                })
            }
        }
    }

    fn verify_paths(&self) -> VerifyPaths {
        VerifyPaths {
            ontology: self.ctx.ontology_dir().to_path_buf(),
            build: self.ctx.build_dir().to_path_buf(),
        }
    }

    /// Verifies the artifacts of the stages named by `selection` without
    /// running them.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Preflight`] if a selected stage's outputs
    /// do not exist yet, or [`PipelineError::Internal`] if a check cannot
    /// run at all.
    pub fn verify(&self, selection: &str) -> Result<ConformanceReport, PipelineError> {
        let selected = stages::select(selection)?;
        for stage in selected {
            let missing: Vec<String> = stage
                .outputs
                .iter()
                .filter(|rel| !self.ctx.artifact(rel).exists())
                .map(|rel| (*rel).to_owned())
                .collect();
            if !missing.is_empty() {
                return Err(PipelineError::Preflight {
                    stage: stage.id.to_owned(),
                    missing,
                });
            }
        }
        let paths = self.verify_paths();
        let mut report = ConformanceReport::new();
        for stage in selected {
            report.extend((stage.verify)(&paths)?);
        }
        Ok(report)
    }
}

/// Exit code of a finished verification.
#[must_use]
pub fn verification_exit_code(report: &ConformanceReport) -> u8 {
    if report.all_passed() {
        0
    } else {
        EXIT_FAILURE
    }
}

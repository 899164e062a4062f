//! The stage table.
//!
//! Stages run strictly in table order. Each declares the globs whose bytes
//! feed its fingerprint, the upstream artifacts it cannot run without, the
//! artifacts it writes, and its verification.

pub mod canon;
pub mod families;
pub mod pack;
pub mod substrates;
pub mod taxonomy;
pub mod transforms;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use taxograph_compiler::LintLog;
use taxograph_conformance::validators as checks;
use taxograph_conformance::Validator;
use taxograph_spec::layout::build;

use crate::config::BuildConfig;
use crate::context::StageContext;
use crate::error::PipelineError;
use crate::fingerprint::InputGlob;

/// Runs a stage and returns its counters.
pub type StageFn = fn(&StageContext) -> Result<Value>;

/// One row of the stage table.
#[derive(Debug, Clone, Copy)]
pub struct StageDef {
    /// Stage id used on the command line and in reports.
    pub id: &'static str,
    /// Bumped whenever the stage's output for the same inputs changes.
    pub logic_version: &'static str,
    /// Files whose bytes feed the fingerprint.
    pub inputs: &'static [InputGlob],
    /// Build-relative artifacts that must exist before the stage runs.
    pub requires: &'static [&'static str],
    /// Build-relative artifacts the stage writes.
    pub outputs: &'static [&'static str],
    /// Renders the settings that affect this stage's output.
    pub settings: fn(&BuildConfig) -> String,
    /// Executes the stage.
    pub run: StageFn,
    /// Verifies the stage's artifacts.
    pub verify: Validator,
}

fn no_settings(_: &BuildConfig) -> String {
    String::new()
}

fn substrate_settings(config: &BuildConfig) -> String {
    config.substrates.part_changing_fallback.join(",")
}

fn canon_settings(config: &BuildConfig) -> String {
    format!("width={}", config.canon.signature_width)
}

/// Every stage, in execution order.
pub const STAGES: &[StageDef] = &[
    StageDef {
        id: "taxonomy",
        logic_version: "1",
        inputs: &[
            InputGlob::ontology("taxa/**/*.jsonl"),
            InputGlob::ontology("parts.json"),
            InputGlob::ontology("parts.derived.jsonl"),
        ],
        requires: &[],
        outputs: &[build::COMPILED_TAXA, build::COMPILED_PARTS],
        settings: no_settings,
        run: taxonomy::run,
        verify: checks::taxonomy::validate,
    },
    StageDef {
        id: "transforms",
        logic_version: "1",
        inputs: &[
            InputGlob::ontology("transforms.json"),
            InputGlob::ontology("rules/**"),
            InputGlob::build(build::COMPILED_PARTS),
        ],
        requires: &[build::COMPILED_PARTS],
        outputs: &[build::TRANSFORMS_CANON, build::LINT_REPORT],
        settings: no_settings,
        run: transforms::run,
        verify: checks::transforms::validate,
    },
    StageDef {
        id: "substrates",
        logic_version: "1",
        inputs: &[
            InputGlob::ontology("rules/parts_applicability.*"),
            InputGlob::ontology("rules/taxon_part_policy.json"),
            InputGlob::build(build::COMPILED_TAXA),
            InputGlob::build(build::COMPILED_PARTS),
            InputGlob::build(build::TRANSFORMS_CANON),
        ],
        requires: &[
            build::COMPILED_TAXA,
            build::COMPILED_PARTS,
            build::TRANSFORMS_CANON,
        ],
        outputs: &[build::SUBSTRATES, build::TP_INDEX],
        settings: substrate_settings,
        run: substrates::run,
        verify: checks::substrates::validate,
    },
    StageDef {
        id: "families",
        logic_version: "1",
        inputs: &[
            InputGlob::ontology("rules/family_expansions.*"),
            InputGlob::ontology("rules/family_allowlist.*"),
            InputGlob::ontology("tpts/**/*.jsonl"),
            InputGlob::build(build::COMPILED_TAXA),
            InputGlob::build(build::COMPILED_PARTS),
            InputGlob::build(build::TRANSFORMS_CANON),
            InputGlob::build(build::SUBSTRATES),
        ],
        requires: &[
            build::COMPILED_TAXA,
            build::COMPILED_PARTS,
            build::TRANSFORMS_CANON,
            build::SUBSTRATES,
        ],
        outputs: &[build::TPT_GENERATED, build::TPT_SEED],
        settings: no_settings,
        run: families::run,
        verify: checks::families::validate,
    },
    StageDef {
        id: "canon",
        logic_version: "1",
        inputs: &[
            InputGlob::ontology("rules/param_buckets.json"),
            InputGlob::ontology("rules/family_expansions.*"),
            InputGlob::build(build::TRANSFORMS_CANON),
            InputGlob::build(build::TPT_SEED),
            InputGlob::build(build::TPT_GENERATED),
        ],
        requires: &[build::TRANSFORMS_CANON, build::TPT_SEED, build::TPT_GENERATED],
        outputs: &[build::TPT_CANON],
        settings: canon_settings,
        run: canon::run,
        verify: checks::canon::validate,
    },
    StageDef {
        id: "pack",
        logic_version: "1",
        inputs: &[
            InputGlob::ontology("rules/**"),
            InputGlob::ontology("docs/**/*.jsonl"),
            InputGlob::build(build::COMPILED_TAXA),
            InputGlob::build(build::COMPILED_PARTS),
            InputGlob::build(build::TRANSFORMS_CANON),
            InputGlob::build(build::SUBSTRATES),
            InputGlob::build(build::TPT_CANON),
        ],
        requires: &[
            build::COMPILED_TAXA,
            build::COMPILED_PARTS,
            build::TRANSFORMS_CANON,
            build::SUBSTRATES,
            build::TPT_CANON,
        ],
        outputs: &[build::DATABASE],
        settings: no_settings,
        run: pack::run,
        verify: checks::pack::validate,
    },
];

/// Looks up a stage by id.
#[must_use]
pub fn find(id: &str) -> Option<&'static StageDef> {
    STAGES.iter().find(|s| s.id == id)
}

/// The word that selects every stage.
pub const BUILD_ALL: &str = "build";

/// Resolves a selection: a stage id, a `start..end` range (either end may
/// be omitted), or `build`.
///
/// # Errors
///
/// Returns [`PipelineError::UnknownStage`] for an unrecognized id and
/// [`PipelineError::EmptyRange`] for a backwards range.
pub fn select(selection: &str) -> Result<&'static [StageDef], PipelineError> {
    let selection = selection.trim();
    if selection == BUILD_ALL {
        return Ok(STAGES);
    }
    let position = |id: &str| {
        STAGES
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| unknown(id))
    };
    match selection.split_once("..") {
        Some((start, end)) => {
            let first = if start.is_empty() { 0 } else { position(start)? };
            let last = if end.is_empty() {
                STAGES.len() - 1
            } else {
                position(end)?
            };
            if first > last {
                return Err(PipelineError::EmptyRange(selection.to_owned()));
            }
            Ok(&STAGES[first..=last])
        }
        None => {
            let at = position(selection)?;
            Ok(&STAGES[at..=at])
        }
    }
}

/// Builds the error for an unrecognized stage id.
#[must_use]
pub fn unknown(name: &str) -> PipelineError {
    PipelineError::UnknownStage {
        name: name.to_owned(),
        known: STAGES.iter().map(|s| s.id).collect::<Vec<_>>().join(", "),
    }
}

/// Serializes stage counters and appends the lint totals of `log`.
fn stats_with_lint<T: Serialize>(stats: &T, log: &LintLog) -> Result<Value> {
    let mut value = serde_json::to_value(stats)?;
    if let Value::Object(map) = &mut value {
        let errors = log.error_count();
        map.insert("lint_errors".into(), errors.into());
        map.insert("lint_warnings".into(), (log.issues().len() - errors).into());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(stages: &[StageDef]) -> Vec<&str> {
        stages.iter().map(|s| s.id).collect()
    }

    #[test]
    fn table_is_in_pipeline_order() {
        assert_eq!(
            ids(STAGES),
            ["taxonomy", "transforms", "substrates", "families", "canon", "pack"]
        );
    }

    #[test]
    fn every_requirement_is_produced_upstream() {
        for (at, stage) in STAGES.iter().enumerate() {
            for need in stage.requires {
                assert!(
                    STAGES[..at].iter().any(|s| s.outputs.contains(need)),
                    "{} needs {need} which no earlier stage writes",
                    stage.id
                );
            }
        }
    }

    #[test]
    fn selections_resolve() {
        assert_eq!(ids(select("build").expect("build")).len(), STAGES.len());
        assert_eq!(ids(select("canon").expect("single")), ["canon"]);
        assert_eq!(
            ids(select("substrates..canon").expect("range")),
            ["substrates", "families", "canon"]
        );
        assert_eq!(ids(select("canon..").expect("open end")), ["canon", "pack"]);
        assert_eq!(
            ids(select("..transforms").expect("open start")),
            ["taxonomy", "transforms"]
        );
    }

    #[test]
    fn bad_selections_are_rejected() {
        assert!(matches!(select("bake"), Err(PipelineError::UnknownStage { .. })));
        assert!(matches!(select("canon..taxonomy"), Err(PipelineError::EmptyRange(_))));
        assert!(matches!(select("canon..bake"), Err(PipelineError::UnknownStage { .. })));
    }
}

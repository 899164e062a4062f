//! `transforms`: normalizes transform definitions and lints the rule files.

use anyhow::Result;
use serde_json::Value;
use taxograph_compiler::transforms::compile_transforms;
use taxograph_compiler::LintLog;
use taxograph_spec::layout::{build, ontology};
use taxograph_spec::{io, Part, RuleBook, Transform, TransformRegistry};

use crate::context::StageContext;

/// Runs the stage. Rule problems are written to `report/lint.json` and do
/// not fail the stage.
///
/// # Errors
///
/// Returns an error if `transforms.json`, a rule file or the compiled parts
/// cannot be read, or an artifact cannot be written.
pub fn run(ctx: &StageContext) -> Result<Value> {
    let raw: Vec<Transform> = io::read_json(&ctx.source(ontology::TRANSFORMS))?;
    let parts: Vec<Part> = io::read_json(&ctx.artifact(build::COMPILED_PARTS))?;
    let rules = RuleBook::load(&ctx.source(ontology::RULES_DIR))?;

    let mut log = LintLog::new();
    let (canon, stats) = compile_transforms(raw, &parts, &rules, &mut log);
    io::write_json(&ctx.artifact(build::TRANSFORMS_CANON), &canon)?;
    io::write_json(&ctx.artifact(build::LINT_REPORT), &log.into_report())?;
    tracing::info!(
        transforms = stats.transforms,
        lint_errors = stats.lint_errors,
        lint_warnings = stats.lint_warnings,
        "transforms normalized"
    );
    ctx.install_registry(TransformRegistry::from_canon(canon));
    Ok(serde_json::to_value(stats)?)
}

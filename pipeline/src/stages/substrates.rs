//! `substrates`: expands part applicability into pruned (taxon, part) edges.

use anyhow::Result;
use serde_json::Value;
use taxograph_compiler::substrates::{build_substrates, SubstrateInputs};
use taxograph_compiler::LintLog;
use taxograph_spec::layout::{build, ontology};
use taxograph_spec::rules::{stem, ApplicabilityRule, PartPolicy};
use taxograph_spec::{io, Part, Taxon};

use super::stats_with_lint;
use crate::context::StageContext;

/// Runs the stage.
///
/// # Errors
///
/// Returns an error if an input cannot be read, the compiled taxa are not
/// parent-closed, or an artifact cannot be written.
pub fn run(ctx: &StageContext) -> Result<Value> {
    let taxa: Vec<Taxon> = io::read_jsonl(&ctx.artifact(build::COMPILED_TAXA))?;
    let parts: Vec<Part> = io::read_json(&ctx.artifact(build::COMPILED_PARTS))?;
    let rules_dir = ctx.source(ontology::RULES_DIR);
    let rules: Vec<ApplicabilityRule> = io::read_rule_file(&rules_dir, stem::PARTS_APPLICABILITY)?;
    let policy: PartPolicy = io::read_rule_map(&rules_dir, stem::TAXON_PART_POLICY)?;
    let registry = ctx.registry()?;

    let mut log = LintLog::new();
    let inputs = SubstrateInputs {
        taxa: &taxa,
        parts: &parts,
        rules: &rules,
        policy: &policy,
        registry,
    };
    let out = build_substrates(inputs, &ctx.config().substrate_config(), &mut log)?;
    io::write_jsonl(&ctx.artifact(build::SUBSTRATES), &out.edges)?;
    io::write_jsonl(&ctx.artifact(build::TP_INDEX), &out.tp_index)?;
    stats_with_lint(&out.stats, &log)
}

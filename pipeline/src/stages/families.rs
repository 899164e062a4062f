//! `families`: generates TPT candidates from family templates and
//! normalizes the curated seeds.

use anyhow::Result;
use serde_json::Value;
use taxograph_compiler::families::{
    expand_families, normalize_seeds, FamilyInputs, FamilyStats, NameBook,
};
use taxograph_compiler::LintLog;
use taxograph_spec::layout::{build, ontology};
use taxograph_spec::rules::{stem, AllowlistEntry, FamilyRule};
use taxograph_spec::{io, Part, SubstrateEdge, Taxon, TptCandidate};

use super::stats_with_lint;
use crate::context::StageContext;

/// Reads every curated seed under `tpts/`, in path order.
fn read_seeds(ctx: &StageContext) -> Result<Vec<TptCandidate>> {
    let mut seeds = Vec::new();
    for path in io::collect_files(&ctx.source(ontology::TPTS_DIR), "jsonl") {
        seeds.extend(io::read_jsonl::<TptCandidate>(&path)?);
    }
    Ok(seeds)
}

/// Runs the stage.
///
/// # Errors
///
/// Returns an error if an input cannot be read or an artifact cannot be
/// written.
pub fn run(ctx: &StageContext) -> Result<Value> {
    let taxa: Vec<Taxon> = io::read_jsonl(&ctx.artifact(build::COMPILED_TAXA))?;
    let parts: Vec<Part> = io::read_json(&ctx.artifact(build::COMPILED_PARTS))?;
    let edges: Vec<SubstrateEdge> = io::read_jsonl(&ctx.artifact(build::SUBSTRATES))?;
    let rules_dir = ctx.source(ontology::RULES_DIR);
    let rules: Vec<FamilyRule> = io::read_rule_file(&rules_dir, stem::FAMILY_EXPANSIONS)?;
    let allowlist: Vec<AllowlistEntry> = io::read_rule_file(&rules_dir, stem::FAMILY_ALLOWLIST)?;
    let seeds = read_seeds(ctx)?;
    let registry = ctx.registry()?;
    let names = NameBook::new(&taxa, &parts);

    let mut log = LintLog::new();
    let mut stats = FamilyStats::default();
    let inputs = FamilyInputs {
        edges: &edges,
        rules: &rules,
        allowlist: &allowlist,
        registry,
        names: &names,
    };
    let generated = expand_families(inputs, &mut log, &mut stats);
    let seeds = normalize_seeds(seeds, registry, &names, &mut log, &mut stats);
    io::write_jsonl(&ctx.artifact(build::TPT_GENERATED), &generated)?;
    io::write_jsonl(&ctx.artifact(build::TPT_SEED), &seeds)?;
    stats_with_lint(&stats, &log)
}

//! `canon`: merges seeds and generated candidates into canonical TPTs.

use anyhow::Result;
use serde_json::Value;
use taxograph_compiler::canon::Canonicalizer;
use taxograph_compiler::LintLog;
use taxograph_spec::layout::{build, ontology};
use taxograph_spec::rules::{stem, BucketTable, FamilyRule};
use taxograph_spec::{io, TptCandidate};

use super::stats_with_lint;
use crate::context::StageContext;

/// Runs the stage.
///
/// # Errors
///
/// Returns an error if an input cannot be read or the canonical TPTs
/// cannot be written.
pub fn run(ctx: &StageContext) -> Result<Value> {
    let seeds: Vec<TptCandidate> = io::read_jsonl(&ctx.artifact(build::TPT_SEED))?;
    let generated: Vec<TptCandidate> = io::read_jsonl(&ctx.artifact(build::TPT_GENERATED))?;
    let rules_dir = ctx.source(ontology::RULES_DIR);
    let buckets: BucketTable = io::read_rule_map(&rules_dir, stem::PARAM_BUCKETS)?;
    let families: Vec<FamilyRule> = io::read_rule_file(&rules_dir, stem::FAMILY_EXPANSIONS)?;
    let registry = ctx.registry()?;

    let mut log = LintLog::new();
    let width = ctx.config().canon.signature_width;
    let engine = Canonicalizer::new(registry, &buckets, &families, width, &mut log);
    let (tpts, stats) = engine.canonicalize(seeds, generated, &mut log);
    io::write_jsonl(&ctx.artifact(build::TPT_CANON), &tpts)?;
    tracing::info!(
        canonical = stats.canonical,
        collisions = stats.collisions,
        "canonical TPTs written"
    );
    stats_with_lint(&stats, &log)
}

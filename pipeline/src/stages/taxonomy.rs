//! `taxonomy`: compiles taxon shards and merges the part registries.

use std::fs;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use taxograph_compiler::taxonomy::{compile_taxa, merge_parts, TaxonShard};
use taxograph_spec::layout::{build, ontology};
use taxograph_spec::{io, Part};
use tracing::info;

use crate::context::StageContext;

/// Runs the stage.
///
/// # Errors
///
/// Returns an error if no shard exists, a source file cannot be read, or
/// the taxonomy or part registries are structurally invalid.
pub fn run(ctx: &StageContext) -> Result<Value> {
    let taxa_dir = ctx.source(ontology::TAXA_DIR);
    let shards = io::collect_files(&taxa_dir, "jsonl")
        .into_iter()
        .map(|path| -> Result<TaxonShard> {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(TaxonShard { path, content })
        })
        .collect::<Result<Vec<_>>>()?;
    if shards.is_empty() {
        bail!("no taxon shards under {}", taxa_dir.display());
    }
    let compiled = compile_taxa(&shards)?;

    let core: Vec<Part> = io::read_json(&ctx.source(ontology::PARTS))?;
    let derived_path = ctx.source(ontology::PARTS_DERIVED);
    let derived: Vec<Part> = if derived_path.is_file() {
        io::read_jsonl(&derived_path)?
    } else {
        Vec::new()
    };
    let derived_count = derived.len();
    let parts = merge_parts(core, derived)?;

    io::write_jsonl(&ctx.artifact(build::COMPILED_TAXA), &compiled.taxa)?;
    io::write_json(&ctx.artifact(build::COMPILED_PARTS), &parts)?;
    info!(
        shards = compiled.shard_count,
        taxa = compiled.taxa.len(),
        parts = parts.len(),
        "taxonomy compiled"
    );
    Ok(json!({
        "shards": compiled.shard_count,
        "taxa": compiled.taxa.len(),
        "parts": parts.len(),
        "derived_parts": derived_count,
    }))
}

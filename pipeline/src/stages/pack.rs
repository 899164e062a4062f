//! `pack`: materializes the build into the graph/search database.

use anyhow::Result;
use serde_json::Value;
use taxograph_pack::PackInputs;
use taxograph_spec::layout::{build, ontology};
use taxograph_spec::rules::TaxonDoc;
use taxograph_spec::{io, CanonicalTpt, Part, RuleBook, SubstrateEdge, Taxon};

use crate::context::StageContext;

fn read_docs(ctx: &StageContext) -> Result<Vec<TaxonDoc>> {
    let mut docs = Vec::new();
    for path in io::collect_files(&ctx.source(ontology::DOCS_DIR), "jsonl") {
        docs.extend(io::read_jsonl::<TaxonDoc>(&path)?);
    }
    Ok(docs)
}

/// Runs the stage.
///
/// # Errors
///
/// Returns an error if an input cannot be read, the inputs reference
/// unknown entities, or the database fails its consistency pass.
pub fn run(ctx: &StageContext) -> Result<Value> {
    let taxa: Vec<Taxon> = io::read_jsonl(&ctx.artifact(build::COMPILED_TAXA))?;
    let parts: Vec<Part> = io::read_json(&ctx.artifact(build::COMPILED_PARTS))?;
    let edges: Vec<SubstrateEdge> = io::read_jsonl(&ctx.artifact(build::SUBSTRATES))?;
    let tpts: Vec<CanonicalTpt> = io::read_jsonl(&ctx.artifact(build::TPT_CANON))?;
    let rules = RuleBook::load(&ctx.source(ontology::RULES_DIR))?;
    let docs = read_docs(ctx)?;
    let registry = ctx.registry()?;

    let inputs = PackInputs {
        taxa: &taxa,
        parts: &parts,
        registry,
        edges: &edges,
        tpts: &tpts,
        rules: &rules,
        docs: &docs,
    };
    let stats = taxograph_pack::pack(inputs, &ctx.artifact(build::DATABASE))?;
    Ok(serde_json::to_value(stats)?)
}

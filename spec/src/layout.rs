//! Relative paths of ontology inputs and build artifacts.

/// Ontology directory layout.
pub mod ontology {
    /// Taxon shard directory (`**/*.jsonl`).
    pub const TAXA_DIR: &str = "taxa";
    /// Core part registry.
    pub const PARTS: &str = "parts.json";
    /// Derived part registry.
    pub const PARTS_DERIVED: &str = "parts.derived.jsonl";
    /// Transform definitions.
    pub const TRANSFORMS: &str = "transforms.json";
    /// Rule file directory.
    pub const RULES_DIR: &str = "rules";
    /// Curated seed TPT directory.
    pub const TPTS_DIR: &str = "tpts";
    /// Taxon documentation directory.
    pub const DOCS_DIR: &str = "docs";
    /// Optional build settings.
    pub const CONFIG: &str = "taxograph.toml";
}

/// Build directory layout.
pub mod build {
    /// Compiled, sorted taxa.
    pub const COMPILED_TAXA: &str = "compiled/taxa.jsonl";
    /// Merged part registry.
    pub const COMPILED_PARTS: &str = "compiled/parts.json";
    /// Normalized transforms and applicability.
    pub const TRANSFORMS_CANON: &str = "tmp/transforms_canon.json";
    /// Rule lint report.
    pub const LINT_REPORT: &str = "report/lint.json";
    /// Substrate edges.
    pub const SUBSTRATES: &str = "graph/substrates.jsonl";
    /// Taxon+Part index.
    pub const TP_INDEX: &str = "tmp/tp_index.jsonl";
    /// Normalized curated seeds.
    pub const TPT_SEED: &str = "tmp/tpt_seed.jsonl";
    /// Family-generated candidates.
    pub const TPT_GENERATED: &str = "tmp/tpt_generated.jsonl";
    /// Canonical TPTs.
    pub const TPT_CANON: &str = "tmp/tpt_canon.jsonl";
    /// Packed database.
    pub const DATABASE: &str = "database/graph.db";
    /// Per-stage report directory.
    pub const STAGE_REPORTS: &str = "report/stages";
    /// Run summary.
    pub const RUN_REPORT: &str = "report/run.json";
}

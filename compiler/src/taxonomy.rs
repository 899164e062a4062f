//! Taxonomy compiler.
//!
//! Validates every taxon shard record and merges the shards into one
//! parent-closed sequence sorted parent-before-child:
//! - required fields present and non-empty
//! - no explicit `parent` field (the parent is always derived from the id)
//! - id format: `tx`, `tx:<kingdom>`, then lowercase snake segments
//! - rank within the kingdom's controlled vocabulary
//! - display name does not look like a processed product
//! - ids unique across shards; every derived parent present
//! - staged/unplaced scratch shards contain no rows
//!
//! Every violation is fatal and carries file/line context. The same module
//! merges the core and derived part registries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::Value;
use taxograph_spec::io::data_lines;
use taxograph_spec::{ids, Kingdom, Part, Taxon};
use thiserror::Error;

use crate::forest::{Forest, ForestError};

/// Rank of the single root node.
pub const ROOT_RANK: &str = "root";

/// Rank of the per-kingdom top nodes (`tx:p`, `tx:f`, `tx:a`).
pub const KINGDOM_RANK: &str = "kingdom";

const REQUIRED_FIELDS: &[&str] = &["id", "rank", "display_name", "latin_name"];

const ID_PATTERN: &str = r"^tx(:[a-z0-9]+(_[a-z0-9]+)*)*$";

const BANNED_NAME_PATTERN: &str = r"(?i)\b(dried|smoked|roasted|fried|cooked|canned|frozen|pickled|powder|powdered|flour|juice|puree|sauce|paste|fillets?|jerky|concentrate)\b";

/// A fatal structural violation of the taxonomy or part registries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaxonomyError {
    /// A record failed a per-record check.
    #[error("{file}:{line}: {message}")]
    Record {
        /// Shard path.
        file: String,
        /// 1-based line.
        line: usize,
        /// What is wrong.
        message: String,
    },
    /// The same taxon id appears twice.
    #[error("{file}:{line}: duplicate taxon id `{id}` (first defined at {first})")]
    DuplicateTaxon {
        /// Shard path of the duplicate.
        file: String,
        /// 1-based line of the duplicate.
        line: usize,
        /// Taxon id.
        id: String,
        /// `file:line` of the first definition.
        first: String,
    },
    /// A derived parent is not defined anywhere.
    #[error("{file}:{line}: parent `{parent}` of `{id}` is not defined")]
    MissingParent {
        /// Shard path.
        file: String,
        /// 1-based line.
        line: usize,
        /// Taxon id.
        id: String,
        /// Missing parent id.
        parent: String,
    },
    /// A staged or unplaced scratch shard still has rows.
    #[error("{file}: staged/unplaced shard has {rows} leftover row(s), first at line {first_line}")]
    StagedRows {
        /// Shard path.
        file: String,
        /// Number of data rows.
        rows: usize,
        /// Line of the first row.
        first_line: usize,
    },
    /// The part registries are inconsistent.
    #[error("part registry: {0}")]
    Parts(#[from] ForestError),
    /// A part record is invalid.
    #[error("part `{id}`: {message}")]
    Part {
        /// Part id.
        id: String,
        /// What is wrong.
        message: String,
    },
    /// Internal pattern compilation failed.
    #[error("invalid built-in pattern: {0}")]
    Pattern(String),
}

/// One taxon shard file and its contents.
#[derive(Debug, Clone)]
pub struct TaxonShard {
    /// Path, used in error context and staged-file detection.
    pub path: PathBuf,
    /// File contents.
    pub content: String,
}

impl TaxonShard {
    /// Returns true if this shard is a staging/scratch file that must be empty.
    #[must_use]
    pub fn is_staged(&self) -> bool {
        is_staged_path(&self.path)
    }
}

/// Returns true if a shard path names a staged/unplaced scratch file.
#[must_use]
pub fn is_staged_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains("staged") || n.contains("unplaced"))
}

/// Result of compiling the taxonomy.
#[derive(Debug, Clone)]
pub struct CompiledTaxonomy {
    /// Taxa sorted by (depth, id).
    pub taxa: Vec<Taxon>,
    /// Number of shard files read.
    pub shard_count: usize,
}

struct Validator {
    id_re: Regex,
    banned_re: Regex,
}

impl Validator {
    fn new() -> Result<Self, TaxonomyError> {
        Ok(Self {
            id_re: Regex::new(ID_PATTERN).map_err(|e| TaxonomyError::Pattern(e.to_string()))?,
            banned_re: Regex::new(BANNED_NAME_PATTERN)
                .map_err(|e| TaxonomyError::Pattern(e.to_string()))?,
        })
    }

    fn check(&self, value: &Value) -> Result<Taxon, String> {
        let obj = value.as_object().ok_or("record is not a JSON object")?;
        if obj.contains_key("parent") || obj.contains_key("parent_id") {
            return Err("explicit parent field is not allowed; parent is derived from id".into());
        }
        for field in REQUIRED_FIELDS {
            match obj.get(*field).and_then(Value::as_str) {
                Some(s) if !s.trim().is_empty() => {}
                _ => return Err(format!("missing or empty required field `{field}`")),
            }
        }
        let taxon: Taxon = serde_json::from_value(value.clone())
            .map_err(|e| format!("invalid record: {e}"))?;
        if !self.id_re.is_match(&taxon.id) {
            return Err(format!(
                "malformed id `{}`: expected `tx[:kingdom[:snake_segment...]]`",
                taxon.id
            ));
        }
        check_rank(&taxon)?;
        if self.banned_re.is_match(&taxon.display_name) {
            return Err(format!(
                "display name `{}` looks like a processed product, not a taxon",
                taxon.display_name
            ));
        }
        Ok(taxon)
    }
}

fn check_rank(taxon: &Taxon) -> Result<(), String> {
    match ids::depth(&taxon.id) {
        0 if taxon.rank == ROOT_RANK => Ok(()),
        0 => Err(format!("root `{}` must have rank `{ROOT_RANK}`", taxon.id)),
        depth => {
            let kingdom = taxon.kingdom().ok_or_else(|| {
                format!(
                    "unknown kingdom code in `{}` (expected p, f or a)",
                    taxon.id
                )
            })?;
            if depth == 1 && taxon.rank != KINGDOM_RANK {
                return Err(format!("kingdom node `{}` must have rank `{KINGDOM_RANK}`", taxon.id));
            }
            if depth > 1 && taxon.rank == KINGDOM_RANK {
                return Err(format!("only kingdom nodes may have rank `{KINGDOM_RANK}`"));
            }
            if !kingdom.allows_rank(&taxon.rank) {
                return Err(format!(
                    "rank `{}` is not allowed for kingdom {}",
                    taxon.rank,
                    kingdom.as_str()
                ));
            }
            Ok(())
        }
    }
}

/// Validates and merges taxon shards.
///
/// # Errors
///
/// Returns the first [`TaxonomyError`] found; every structural violation is fatal.
pub fn compile_taxa(shards: &[TaxonShard]) -> Result<CompiledTaxonomy, TaxonomyError> {
    let validator = Validator::new()?;
    let mut origin: HashMap<String, (String, usize)> = HashMap::new();
    let mut taxa: Vec<Taxon> = Vec::new();

    for shard in shards {
        let file = shard.path.display().to_string();
        if shard.is_staged() {
            let rows: Vec<usize> = data_lines(&shard.content).map(|(line, _)| line).collect();
            if let Some(&first_line) = rows.first() {
                return Err(TaxonomyError::StagedRows {
                    file,
                    rows: rows.len(),
                    first_line,
                });
            }
            continue;
        }
        for (line, text) in data_lines(&shard.content) {
            let record_err = |message: String| TaxonomyError::Record {
                file: file.clone(),
                line,
                message,
            };
            let value: Value = serde_json::from_str(text)
                .map_err(|e| record_err(format!("invalid JSON: {e}")))?;
            let taxon = validator.check(&value).map_err(record_err)?;
            if let Some((first_file, first_line)) = origin.get(&taxon.id) {
                return Err(TaxonomyError::DuplicateTaxon {
                    file,
                    line,
                    id: taxon.id,
                    first: format!("{first_file}:{first_line}"),
                });
            }
            origin.insert(taxon.id.clone(), (file.clone(), line));
            taxa.push(taxon);
        }
    }

    for taxon in &taxa {
        if let Some(parent) = taxon.parent_id() {
            if !origin.contains_key(parent) {
                let (file, line) = origin.get(&taxon.id).cloned().unwrap_or_default();
                return Err(TaxonomyError::MissingParent {
                    file,
                    line,
                    id: taxon.id.clone(),
                    parent: parent.to_owned(),
                });
            }
        }
    }

    taxa.sort_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.id.cmp(&b.id)));
    tracing::info!(
        taxa = taxa.len(),
        shards = shards.len(),
        "taxonomy compiled"
    );
    Ok(CompiledTaxonomy {
        taxa,
        shard_count: shards.len(),
    })
}

/// Builds the arena hierarchy of compiled taxa.
///
/// # Errors
///
/// Returns an error if the taxa are not parent-closed.
pub fn taxon_forest(taxa: &[Taxon]) -> Result<Forest, ForestError> {
    Forest::build(taxa.iter().map(|t| (t.id.as_str(), t.parent_id())))
}

/// Merges the core and derived part registries into one list sorted by id.
///
/// # Errors
///
/// Returns an error on duplicate ids, unresolved or cyclic `parent_id`s, or
/// derived parts without a parent.
pub fn merge_parts(core: Vec<Part>, derived: Vec<Part>) -> Result<Vec<Part>, TaxonomyError> {
    let mut parts: Vec<Part> = core.into_iter().chain(derived).collect();
    for part in &parts {
        if part.id.trim().is_empty() || part.name.trim().is_empty() {
            return Err(TaxonomyError::Part {
                id: part.id.clone(),
                message: "id and name are required".into(),
            });
        }
        if part.is_promotion() && part.parent_id.is_none() {
            return Err(TaxonomyError::Part {
                id: part.id.clone(),
                message: "a part with a proto_path needs a parent_id".into(),
            });
        }
    }
    Forest::build(parts.iter().map(|p| (p.id.as_str(), p.parent_id.as_deref())))?;
    parts.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(parts)
}

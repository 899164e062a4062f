//! Database writer.
//!
//! [`pack`] deletes any previous database (including its WAL and shared
//! memory files) and rebuilds every table from the compiled inputs. Inserts
//! are grouped into one transaction per phase; each phase only references
//! rows committed by earlier phases, so foreign keys hold throughout.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde::Serialize;
use serde_json::json;
use taxograph_compiler::canon::{signature, UNKNOWN_FAMILY};
use taxograph_compiler::forest::Forest;
use taxograph_compiler::taxonomy;
use taxograph_compiler::LintLog;
use taxograph_spec::rules::TaxonDoc;
use taxograph_spec::{
    ids, CanonicalTpt, Kingdom, Part, RuleBook, SubstrateEdge, Taxon, TransformRegistry,
};
use tracing::{debug, info, warn};

use crate::closure::{closure_rows, parent_first_order};
use crate::conditions::RuleEvaluator;
use crate::consistency;
use crate::names::{NameSource, TpNamer};
use crate::schema::{self, SCHEMA_VERSION};
use crate::search::{synonym_bag, EntityKind, SearchRow};

/// Everything the packer reads.
#[derive(Debug, Clone, Copy)]
pub struct PackInputs<'a> {
    /// Compiled taxa.
    pub taxa: &'a [Taxon],
    /// Compiled parts.
    pub parts: &'a [Part],
    /// Canonical transform registry.
    pub registry: &'a TransformRegistry,
    /// Substrate edges.
    pub edges: &'a [SubstrateEdge],
    /// Canonical TPTs.
    pub tpts: &'a [CanonicalTpt],
    /// Rule files.
    pub rules: &'a RuleBook,
    /// Taxon documentation rows.
    pub docs: &'a [TaxonDoc],
}

/// Row counts written by one pack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackStats {
    /// Taxon nodes.
    pub taxa: usize,
    /// Taxon closure rows.
    pub taxon_ancestors: usize,
    /// Part definitions.
    pub parts: usize,
    /// Part closure rows.
    pub part_ancestors: usize,
    /// Transform definitions.
    pub transforms: usize,
    /// Substrate edges (`has_part`).
    pub substrates: usize,
    /// Taxon+Part nodes, substrate or not.
    pub tp_nodes: usize,
    /// TP nodes named by override.
    pub tp_named_override: usize,
    /// TP nodes named by implied-part collapse.
    pub tp_named_implied: usize,
    /// Families in `family_meta`.
    pub families: usize,
    /// Canonical TPTs.
    pub tpts: usize,
    /// Exploded identity steps.
    pub identity_steps: usize,
    /// `(taxon, part, transform)` aggregate rows.
    pub tp_tf_counts: usize,
    /// Flags emitted.
    pub flags: usize,
    /// Cuisine tags emitted.
    pub cuisines: usize,
    /// Flag or cuisine rules skipped for malformed conditions.
    pub bad_conditions: usize,
    /// Taxon docs written.
    pub docs: usize,
    /// Taxon docs skipped for unknown taxa.
    pub docs_skipped: usize,
    /// Search index rows.
    pub search_rows: usize,
}

/// Returns the database file plus its WAL and shared-memory companions.
#[must_use]
pub fn database_files(db_path: &Path) -> [PathBuf; 3] {
    let with_suffix = |suffix: &str| {
        let mut name = db_path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    };
    [db_path.to_path_buf(), with_suffix("-wal"), with_suffix("-shm")]
}

/// Rebuilds the database at `db_path` from `inputs`.
///
/// # Errors
///
/// Returns an error if an input reference is unresolved, the database cannot
/// be written, or the written database fails its consistency checks.
pub fn pack(inputs: PackInputs<'_>, db_path: &Path) -> Result<PackStats> {
    consistency::precheck(&inputs)?;

    for file in database_files(db_path) {
        if file.exists() {
            fs::remove_file(&file)
                .with_context(|| format!("Failed to remove stale {}", file.display()))?;
        }
    }
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open {}", db_path.display()))?;
    schema::create(&conn)?;

    let mut stats = PackStats::default();
    let mut search = Vec::new();
    phase(&mut conn, "taxa", |c| write_taxa(c, inputs, &mut stats, &mut search))?;
    phase(&mut conn, "parts", |c| write_parts(c, inputs, &mut stats))?;
    phase(&mut conn, "transforms", |c| write_transforms(c, inputs, &mut stats))?;
    phase(&mut conn, "taxon_parts", |c| write_taxon_parts(c, inputs, &mut stats, &mut search))?;
    phase(&mut conn, "tpts", |c| write_tpts(c, inputs, &mut stats, &mut search))?;
    phase(&mut conn, "search", |c| write_search(c, &search, &mut stats))?;
    phase(&mut conn, "meta", |c| write_meta(c, &stats))?;

    consistency::postcheck(&conn)?;
    info!(
        taxa = stats.taxa,
        tp_nodes = stats.tp_nodes,
        tpts = stats.tpts,
        search_rows = stats.search_rows,
        "packed {}",
        db_path.display()
    );
    Ok(stats)
}

fn phase<F>(conn: &mut Connection, name: &str, f: F) -> Result<()>
where
    F: FnOnce(&Connection) -> Result<()>,
{
    let tx = conn
        .transaction()
        .with_context(|| format!("Failed to begin {name} transaction"))?;
    f(&tx).with_context(|| format!("Failed to write {name}"))?;
    tx.commit()
        .with_context(|| format!("Failed to commit {name} transaction"))?;
    debug!(phase = name, "committed");
    Ok(())
}

fn write_taxa(
    conn: &Connection,
    inputs: PackInputs<'_>,
    stats: &mut PackStats,
    search: &mut Vec<SearchRow>,
) -> Result<()> {
    let forest = taxonomy::taxon_forest(inputs.taxa)?;
    let mut node = conn.prepare(
        "INSERT INTO nodes (id, parent_id, rank, kingdom, display_name, latin_name, depth, xref) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    let mut synonym =
        conn.prepare("INSERT OR IGNORE INTO synonyms (node_id, synonym) VALUES (?1, ?2)")?;
    for idx in parent_first_order(&forest) {
        // forest indices follow input order
        let Some(taxon) = inputs.taxa.get(idx) else {
            continue;
        };
        node.execute(params![
            taxon.id,
            taxon.parent_id(),
            taxon.rank,
            taxon.kingdom().map(Kingdom::as_str),
            taxon.display_name,
            taxon.latin_name,
            taxon.depth(),
            taxon.xref,
        ])?;
        for s in &taxon.synonyms {
            synonym.execute(params![taxon.id, s])?;
        }
        search.push(SearchRow {
            kind: EntityKind::Taxon,
            entity_id: taxon.id.clone(),
            name: taxon.display_name.clone(),
            display_name: taxon.display_name.clone(),
            synonyms: synonym_bag(
                std::iter::once(taxon.latin_name.as_str())
                    .chain(taxon.synonyms.iter().map(String::as_str)),
            ),
            taxon_id: Some(taxon.id.clone()),
            part_id: None,
        });
        stats.taxa += 1;
    }

    stats.taxon_ancestors = write_closure(conn, "taxon_ancestors", &forest)?;

    let known: BTreeSet<&str> = inputs.taxa.iter().map(|t| t.id.as_str()).collect();
    let mut doc = conn.prepare(
        "INSERT OR REPLACE INTO taxon_doc (taxon_id, lang, summary, description_md) \
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for d in inputs.docs {
        if !known.contains(d.taxon_id.as_str()) {
            warn!(taxon_id = %d.taxon_id, "doc references unknown taxon; skipped");
            stats.docs_skipped += 1;
            continue;
        }
        doc.execute(params![d.taxon_id, d.lang, d.summary, d.description_md])?;
        stats.docs += 1;
    }
    Ok(())
}

fn write_closure(conn: &Connection, table: &str, forest: &Forest) -> Result<usize> {
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {table} (descendant_id, ancestor_id, depth) VALUES (?1, ?2, ?3)"
    ))?;
    let rows = closure_rows(forest);
    for row in &rows {
        stmt.execute(params![row.descendant, row.ancestor, row.depth])?;
    }
    Ok(rows.len())
}

fn write_parts(conn: &Connection, inputs: PackInputs<'_>, stats: &mut PackStats) -> Result<()> {
    let forest = Forest::build(
        inputs
            .parts
            .iter()
            .map(|p| (p.id.as_str(), p.parent_id.as_deref())),
    )?;
    let mut def = conn.prepare(
        "INSERT INTO part_def (id, name, kind, category, parent_id, is_promotion) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut synonym =
        conn.prepare("INSERT OR IGNORE INTO part_synonym (part_id, synonym) VALUES (?1, ?2)")?;
    for idx in parent_first_order(&forest) {
        let Some(part) = inputs.parts.get(idx) else {
            continue;
        };
        def.execute(params![
            part.id,
            part.name,
            part.kind.as_str(),
            part.category,
            part.parent_id,
            part.is_promotion(),
        ])?;
        for s in &part.synonyms {
            synonym.execute(params![part.id, s])?;
        }
        stats.parts += 1;
    }
    stats.part_ancestors = write_closure(conn, "part_ancestors", &forest)?;
    Ok(())
}

fn write_transforms(
    conn: &Connection,
    inputs: PackInputs<'_>,
    stats: &mut PackStats,
) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO transform_def (id, name, class, identity, ord, params_json, notes) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for tf in inputs.registry.iter() {
        let params_json = serde_json::to_string(&tf.params)
            .with_context(|| format!("Failed to encode params of {}", tf.id))?;
        stmt.execute(params![
            tf.id,
            tf.name,
            tf.class,
            tf.identity,
            tf.order,
            params_json,
            tf.notes
        ])?;
        stats.transforms += 1;
    }
    Ok(())
}

fn write_taxon_parts(
    conn: &Connection,
    inputs: PackInputs<'_>,
    stats: &mut PackStats,
    search: &mut Vec<SearchRow>,
) -> Result<()> {
    let mut has_part =
        conn.prepare("INSERT OR IGNORE INTO has_part (taxon_id, part_id) VALUES (?1, ?2)")?;
    // substrate flag per (taxon, part); TPT-only pairs still need a node
    let mut tps: BTreeMap<(&str, &str), bool> = BTreeMap::new();
    for edge in inputs.edges {
        stats.substrates += has_part.execute(params![edge.taxon_id, edge.part_id])?;
        tps.insert((edge.taxon_id.as_str(), edge.part_id.as_str()), true);
    }
    for tpt in inputs.tpts {
        tps.entry((tpt.taxon_id.as_str(), tpt.part_id.as_str())).or_insert(false);
    }

    let pairs: Vec<(&str, &str)> = tps.keys().copied().collect();
    let namer = TpNamer::new(
        inputs.taxa,
        inputs.parts,
        &inputs.rules.name_overrides,
        &inputs.rules.implied_parts,
        &pairs,
    );
    let terms = TpTerms::new(inputs);

    let mut node = conn.prepare(
        "INSERT INTO taxon_part_nodes \
         (id, taxon_id, part_id, name, display_name, name_source, is_substrate) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for (&(taxon_id, part_id), &is_substrate) in &tps {
        let id = ids::tp_id(taxon_id, part_id);
        let name = namer.name(taxon_id, part_id);
        node.execute(params![
            id,
            taxon_id,
            part_id,
            name.name,
            name.display_name,
            name.source.as_str(),
            is_substrate
        ])?;
        match name.source {
            NameSource::Override => stats.tp_named_override += 1,
            NameSource::Implied => stats.tp_named_implied += 1,
            NameSource::Default => {}
        }
        stats.tp_nodes += 1;
        search.push(SearchRow {
            kind: EntityKind::Tp,
            entity_id: id,
            synonyms: synonym_bag(terms.terms(taxon_id, part_id)),
            name: name.name,
            display_name: name.display_name,
            taxon_id: Some(taxon_id.to_owned()),
            part_id: Some(part_id.to_owned()),
        });
    }
    Ok(())
}

/// Search aliases of Taxon+Part nodes, indexed once per phase.
struct TpTerms<'a> {
    extra: BTreeMap<(&'a str, &'a str), Vec<&'a str>>,
    taxa: BTreeMap<&'a str, &'a Taxon>,
    parts: BTreeMap<&'a str, &'a Part>,
}

impl<'a> TpTerms<'a> {
    fn new(inputs: PackInputs<'a>) -> Self {
        let mut extra: BTreeMap<(&'a str, &'a str), Vec<&'a str>> = BTreeMap::new();
        for rule in &inputs.rules.taxon_part_synonyms {
            extra
                .entry((rule.taxon_id.as_str(), rule.part_id.as_str()))
                .or_default()
                .extend(rule.synonyms.iter().map(String::as_str));
        }
        Self {
            extra,
            taxa: inputs.taxa.iter().map(|t| (t.id.as_str(), t)).collect(),
            parts: inputs.parts.iter().map(|p| (p.id.as_str(), p)).collect(),
        }
    }

    /// Aliases of a TP node: its own synonyms, then the taxon's and part's.
    fn terms(&self, taxon_id: &'a str, part_id: &'a str) -> Vec<&'a str> {
        let mut terms = self
            .extra
            .get(&(taxon_id, part_id))
            .cloned()
            .unwrap_or_default();
        if let Some(taxon) = self.taxa.get(taxon_id) {
            terms.extend(taxon.synonyms.iter().map(String::as_str));
        }
        if let Some(part) = self.parts.get(part_id) {
            terms.extend(part.synonyms.iter().map(String::as_str));
        }
        terms
    }
}

fn write_tpts(
    conn: &Connection,
    inputs: PackInputs<'_>,
    stats: &mut PackStats,
    search: &mut Vec<SearchRow>,
) -> Result<()> {
    write_families(conn, inputs, stats)?;

    let tp_terms = TpTerms::new(inputs);
    let mut log = LintLog::new();
    let evaluator = RuleEvaluator::new(
        &inputs.rules.diet_safety_rules,
        &inputs.rules.cuisine_map,
        &mut log,
    );
    stats.bad_conditions = log.count("bad_condition");

    let mut node = conn.prepare(
        "INSERT INTO tpt_nodes (id, tp_id, taxon_id, part_id, family, name, notes, \
         identity_json, identity_hash, path_json, provenance) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;
    let mut step = conn.prepare(
        "INSERT INTO tpt_identity_steps (tpt_id, step_index, transform_id, params_json) \
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    let mut flag =
        conn.prepare("INSERT INTO tpt_flags (tpt_id, flag_type, flag) VALUES (?1, ?2, ?3)")?;
    let mut cuisine = conn.prepare("INSERT INTO tpt_cuisines (tpt_id, cuisine) VALUES (?1, ?2)")?;

    for tpt in inputs.tpts {
        let tp_id = ids::tp_id(&tpt.taxon_id, &tpt.part_id);
        node.execute(params![
            tpt.id,
            tp_id,
            tpt.taxon_id,
            tpt.part_id,
            tpt.family,
            tpt.name,
            tpt.notes,
            signature::path_encoding(&tpt.identity),
            tpt.identity_hash,
            signature::path_encoding(&tpt.path),
            tpt.provenance.as_str(),
        ])?;
        for (index, s) in tpt.identity.iter().enumerate() {
            let params_json = serde_json::to_string(&s.params)
                .with_context(|| format!("Failed to encode params of {} step {index}", tpt.id))?;
            step.execute(params![tpt.id, index, s.id, params_json])?;
            stats.identity_steps += 1;
        }
        for (flag_type, value) in evaluator.flags(tpt) {
            flag.execute(params![tpt.id, flag_type, value])?;
            stats.flags += 1;
        }
        for tag in evaluator.cuisines(tpt) {
            cuisine.execute(params![tpt.id, tag])?;
            stats.cuisines += 1;
        }
        stats.tpts += 1;

        let terms = tpt
            .synonyms
            .iter()
            .map(String::as_str)
            .chain(tp_terms.terms(&tpt.taxon_id, &tpt.part_id));
        search.push(SearchRow {
            kind: EntityKind::Tpt,
            entity_id: tpt.id.clone(),
            name: tpt.name.clone(),
            display_name: tpt.name.clone(),
            synonyms: synonym_bag(terms),
            taxon_id: Some(tpt.taxon_id.clone()),
            part_id: Some(tpt.part_id.clone()),
        });
    }

    stats.tp_tf_counts = conn.execute(
        "INSERT INTO tp_tf_counts (taxon_id, part_id, transform_id, tpt_count) \
         SELECT t.taxon_id, t.part_id, s.transform_id, count(DISTINCT t.id) \
         FROM tpt_nodes t JOIN tpt_identity_steps s ON s.tpt_id = t.id \
         GROUP BY t.taxon_id, t.part_id, s.transform_id",
        [],
    )?;
    Ok(())
}

fn write_families(conn: &Connection, inputs: PackInputs<'_>, stats: &mut PackStats) -> Result<()> {
    struct Meta<'a> {
        label: &'a str,
        notes: Option<&'a str>,
        templates: Vec<serde_json::Value>,
        tpt_count: usize,
    }
    let mut families: BTreeMap<&str, Meta<'_>> = BTreeMap::new();
    for rule in &inputs.rules.family_expansions {
        let meta = families.entry(rule.family.as_str()).or_insert_with(|| Meta {
            label: rule.label.as_deref().unwrap_or(&rule.family),
            notes: rule.notes.as_deref(),
            templates: Vec::new(),
            tpt_count: 0,
        });
        meta.templates.push(json!({"path": rule.path, "name": rule.name}));
    }
    for tpt in inputs.tpts {
        families
            .entry(tpt.family.as_str())
            .or_insert_with(|| Meta {
                label: if tpt.family == UNKNOWN_FAMILY { "Unknown" } else { tpt.family.as_str() },
                notes: None,
                templates: Vec::new(),
                tpt_count: 0,
            })
            .tpt_count += 1;
    }

    let mut stmt = conn.prepare(
        "INSERT INTO family_meta (family, label, notes, template_json, tpt_count) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (family, meta) in &families {
        let template_json = serde_json::to_string(&meta.templates)
            .with_context(|| format!("Failed to encode templates of family {family}"))?;
        stmt.execute(params![family, meta.label, meta.notes, template_json, meta.tpt_count])?;
    }
    stats.families = families.len();
    Ok(())
}

fn write_search(conn: &Connection, rows: &[SearchRow], stats: &mut PackStats) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO search_content \
         (entity_kind, entity_id, name, display_name, synonyms, taxon_id, part_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for row in rows {
        stmt.execute(params![
            row.kind.as_str(),
            row.entity_id,
            row.name,
            row.display_name,
            row.synonyms,
            row.taxon_id,
            row.part_id,
        ])?;
    }
    conn.execute("INSERT INTO search_fts(search_fts) VALUES ('rebuild')", [])
        .context("Failed to rebuild full-text index")?;
    stats.search_rows = rows.len();
    Ok(())
}

fn write_meta(conn: &Connection, stats: &PackStats) -> Result<()> {
    let mut stmt = conn.prepare("INSERT INTO meta (key, val) VALUES (?1, ?2)")?;
    let entries = [
        ("schema_version", SCHEMA_VERSION.to_owned()),
        ("generator", format!("taxograph-pack {}", env!("CARGO_PKG_VERSION"))),
        ("taxa", stats.taxa.to_string()),
        ("parts", stats.parts.to_string()),
        ("transforms", stats.transforms.to_string()),
        ("substrates", stats.substrates.to_string()),
        ("tp_nodes", stats.tp_nodes.to_string()),
        ("tpts", stats.tpts.to_string()),
        ("families", stats.families.to_string()),
        ("search_rows", stats.search_rows.to_string()),
    ];
    for (key, val) in entries {
        stmt.execute(params![key, val])?;
    }
    Ok(())
}

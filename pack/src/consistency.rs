//! Consistency pass.
//!
//! Before writing, every reference carried by substrate edges and canonical
//! TPTs must resolve against the compiled taxa, parts and transforms; an
//! orphan here means an upstream stage is broken, so it is a hard error
//! rather than a warning. After writing, the database itself is checked:
//! foreign keys, closure row counts and search row coverage.

use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use rusqlite::Connection;

use crate::writer::PackInputs;

/// How many problems are spelled out in an error message.
const SHOWN: usize = 5;

/// Returns every unresolved reference in `inputs`.
#[must_use]
pub fn reference_problems(inputs: &PackInputs<'_>) -> Vec<String> {
    let taxa: HashSet<&str> = inputs.taxa.iter().map(|t| t.id.as_str()).collect();
    let parts: HashSet<&str> = inputs.parts.iter().map(|p| p.id.as_str()).collect();
    let mut problems = Vec::new();
    for edge in inputs.edges {
        if !taxa.contains(edge.taxon_id.as_str()) {
            problems.push(format!("substrate {} references unknown taxon", edge.tp_id()));
        }
        if !parts.contains(edge.part_id.as_str()) {
            problems.push(format!("substrate {} references unknown part", edge.tp_id()));
        }
    }
    let mut seen = HashSet::new();
    for tpt in inputs.tpts {
        if !seen.insert(tpt.id.as_str()) {
            problems.push(format!("duplicate TPT id {}", tpt.id));
        }
        if !taxa.contains(tpt.taxon_id.as_str()) {
            problems.push(format!("TPT {} references unknown taxon {}", tpt.id, tpt.taxon_id));
        }
        if !parts.contains(tpt.part_id.as_str()) {
            problems.push(format!("TPT {} references unknown part {}", tpt.id, tpt.part_id));
        }
        for step in &tpt.identity {
            if !inputs.registry.contains(&step.id) {
                problems.push(format!("TPT {} uses unknown transform {}", tpt.id, step.id));
            }
        }
    }
    problems
}

/// Fails if any input reference is unresolved.
///
/// # Errors
///
/// Returns an error listing the first few unresolved references.
pub fn precheck(inputs: &PackInputs<'_>) -> Result<()> {
    fail_on(&reference_problems(inputs), "input references")
}

/// Returns every structural problem found in a packed database.
///
/// # Errors
///
/// Returns an error if a check query itself fails.
pub fn database_problems(conn: &Connection) -> Result<Vec<String>> {
    let mut problems = Vec::new();

    let mut stmt = conn
        .prepare("PRAGMA foreign_key_check")
        .context("Failed to prepare foreign key check")?;
    let violations = stmt
        .query_map([], |row| {
            let table: String = row.get(0)?;
            let parent: String = row.get(2)?;
            Ok(format!("{table} row violates foreign key into {parent}"))
        })
        .context("Failed to run foreign key check")?;
    for violation in violations {
        problems.push(violation.context("Failed to read foreign key check row")?);
    }

    let count = |sql: &str| -> Result<i64> {
        conn.query_row(sql, [], |row| row.get(0))
            .with_context(|| format!("Failed to run check query: {sql}"))
    };

    let bad_taxon_closure = count(
        "SELECT count(*) FROM nodes n \
         WHERE (SELECT count(*) FROM taxon_ancestors a WHERE a.descendant_id = n.id) \
         != n.depth + 1",
    )?;
    if bad_taxon_closure > 0 {
        problems.push(format!("{bad_taxon_closure} taxa have the wrong number of closure rows"));
    }

    let bad_part_closure = count(
        "SELECT count(*) FROM part_def p WHERE NOT EXISTS \
         (SELECT 1 FROM part_ancestors a WHERE a.descendant_id = p.id AND a.depth = 0) \
         OR (SELECT count(*) FROM part_ancestors a WHERE a.descendant_id = p.id) \
            != (SELECT max(depth) + 1 FROM part_ancestors a WHERE a.descendant_id = p.id)",
    )?;
    if bad_part_closure > 0 {
        problems.push(format!("{bad_part_closure} parts have inconsistent closure rows"));
    }

    let entities = count(
        "SELECT (SELECT count(*) FROM nodes) \
              + (SELECT count(*) FROM taxon_part_nodes) \
              + (SELECT count(*) FROM tpt_nodes)",
    )?;
    let search_rows = count("SELECT count(*) FROM search_content")?;
    if entities != search_rows {
        problems.push(format!(
            "search index has {search_rows} rows for {entities} entities"
        ));
    }

    let orphan_tp = count(
        "SELECT count(*) FROM tpt_nodes t \
         WHERE t.tp_id != t.taxon_id || '|' || t.part_id",
    )?;
    if orphan_tp > 0 {
        problems.push(format!("{orphan_tp} TPTs disagree with their TP node id"));
    }
    Ok(problems)
}

/// Fails if the packed database has structural problems.
///
/// # Errors
///
/// Returns an error listing the first few problems, or if a check query fails.
pub fn postcheck(conn: &Connection) -> Result<()> {
    let problems = database_problems(conn)?;
    fail_on(&problems, "database consistency")
}

fn fail_on(problems: &[String], what: &str) -> Result<()> {
    if problems.is_empty() {
        return Ok(());
    }
    let shown: Vec<&str> = problems.iter().take(SHOWN).map(String::as_str).collect();
    bail!(
        "{what}: {} problem(s): {}{}",
        problems.len(),
        shown.join("; "),
        if problems.len() > SHOWN { "; ..." } else { "" }
    )
}

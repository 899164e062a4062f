//! Pack stage validator: opens the database read-only and checks it.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use taxograph_pack::consistency;
use taxograph_pack::schema::SCHEMA_VERSION;
use taxograph_spec::layout::build;

use crate::report::{ConformanceReport, TestResult};
use crate::VerifyPaths;

const V: &str = "pack";

/// `meta` keys cross-checked against table row counts.
const COUNTED: &[(&str, &str)] = &[
    ("taxa", "nodes"),
    ("parts", "part_def"),
    ("transforms", "transform_def"),
    ("tp_nodes", "taxon_part_nodes"),
    ("tpts", "tpt_nodes"),
    ("search_rows", "search_content"),
];

/// Validates `database/graph.db`.
///
/// # Errors
///
/// Returns an error if a check query fails on an otherwise readable database.
pub fn validate(paths: &VerifyPaths) -> Result<ConformanceReport> {
    let mut report = ConformanceReport::new();
    let path = paths.build.join(build::DATABASE);
    if !path.exists() {
        report.push(TestResult::fail(V, format!("{} not found", build::DATABASE)));
        return Ok(report);
    }
    let conn = match open_read_only(&path) {
        Ok(conn) => conn,
        Err(e) => {
            report.push(TestResult::fail(V, format!("{e:#}")));
            return Ok(report);
        }
    };
    check_database(&conn, &mut report)?;
    Ok(report)
}

fn open_read_only(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open {}", path.display()))
}

/// Runs every database check against an open connection.
///
/// # Errors
///
/// Returns an error if a check query fails.
pub fn check_database(conn: &Connection, report: &mut ConformanceReport) -> Result<()> {
    report.check(
        "pack/consistency",
        "foreign keys, closures and search coverage hold",
        consistency::database_problems(conn)?,
    );

    let meta = |key: &str| -> Result<Option<String>> {
        conn.query_row("SELECT val FROM meta WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .with_context(|| format!("Failed to read meta.{key}"))
    };
    match meta("schema_version")? {
        Some(v) if v == SCHEMA_VERSION => {
            report.push(TestResult::pass("pack/meta", format!("schema version {v}")));
        }
        other => report.push(TestResult::fail(
            "pack/meta",
            format!("schema version {other:?}, expected {SCHEMA_VERSION}"),
        )),
    }
    let mut problems = Vec::new();
    for (key, table) in COUNTED {
        let recorded = meta(key)?.and_then(|v| v.parse::<i64>().ok());
        let actual: i64 = conn
            .query_row(&format!("SELECT count(*) FROM {table}"), [], |row| row.get(0))
            .with_context(|| format!("Failed to count {table}"))?;
        if recorded != Some(actual) {
            problems.push(format!("meta.{key} = {recorded:?} but {table} has {actual} rows"));
        }
    }
    report.check("pack/counts", "meta counts match tables", problems);

    // any indexed name must find its own row through the FTS index
    let sample: Option<(String, String)> = conn
        .query_row(
            "SELECT entity_id, name FROM search_content ORDER BY id LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .context("Failed to pick a search sample")?;
    match sample {
        None => report.push(TestResult::warn("pack/fts", "search index is empty")),
        Some((entity, name)) => {
            let phrase = format!("\"{}\"", name.replace('"', "\"\""));
            let hits: i64 = conn
                .query_row(
                    "SELECT count(*) FROM search_fts f JOIN search_content c ON c.id = f.rowid \
                     WHERE search_fts MATCH ?1 AND c.entity_id = ?2",
                    [phrase.as_str(), entity.as_str()],
                    |row| row.get(0),
                )
                .context("Failed to query the full-text index")?;
            if hits > 0 {
                report.push(TestResult::pass(
                    "pack/fts",
                    format!("full-text lookup finds {entity}"),
                ));
            } else {
                report.push(TestResult::fail(
                    "pack/fts",
                    format!("full-text lookup misses {entity}"),
                ));
            }
        }
    }
    Ok(())
}

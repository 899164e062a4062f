//! Database schema.
//!
//! The schema is fixed to the ontology's shape. Every table is recreated on
//! each pack; there is no migration path because the database is a pure
//! build artifact.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Version recorded in `meta.schema_version`.
pub const SCHEMA_VERSION: &str = "1";

/// Full DDL, in dependency order.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE nodes (
    id            TEXT PRIMARY KEY,
    parent_id     TEXT REFERENCES nodes(id),
    rank          TEXT NOT NULL,
    kingdom       TEXT,
    display_name  TEXT NOT NULL,
    latin_name    TEXT NOT NULL,
    depth         INTEGER NOT NULL,
    xref          TEXT
);
CREATE INDEX nodes_parent ON nodes(parent_id);

CREATE TABLE synonyms (
    node_id  TEXT NOT NULL REFERENCES nodes(id),
    synonym  TEXT NOT NULL,
    PRIMARY KEY (node_id, synonym)
);

CREATE TABLE taxon_ancestors (
    descendant_id  TEXT NOT NULL REFERENCES nodes(id),
    ancestor_id    TEXT NOT NULL REFERENCES nodes(id),
    depth          INTEGER NOT NULL,
    PRIMARY KEY (descendant_id, ancestor_id)
);
CREATE INDEX taxon_ancestors_ancestor ON taxon_ancestors(ancestor_id);

CREATE TABLE taxon_doc (
    taxon_id        TEXT NOT NULL REFERENCES nodes(id),
    lang            TEXT NOT NULL,
    summary         TEXT,
    description_md  TEXT,
    PRIMARY KEY (taxon_id, lang)
);

CREATE TABLE part_def (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    kind          TEXT NOT NULL,
    category      TEXT,
    parent_id     TEXT REFERENCES part_def(id),
    is_promotion  INTEGER NOT NULL
);

CREATE TABLE part_synonym (
    part_id  TEXT NOT NULL REFERENCES part_def(id),
    synonym  TEXT NOT NULL,
    PRIMARY KEY (part_id, synonym)
);

CREATE TABLE part_ancestors (
    descendant_id  TEXT NOT NULL REFERENCES part_def(id),
    ancestor_id    TEXT NOT NULL REFERENCES part_def(id),
    depth          INTEGER NOT NULL,
    PRIMARY KEY (descendant_id, ancestor_id)
);

CREATE TABLE transform_def (
    id           TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    class        TEXT,
    identity     INTEGER NOT NULL,
    ord          INTEGER NOT NULL,
    params_json  TEXT NOT NULL,
    notes        TEXT
);

CREATE TABLE has_part (
    taxon_id  TEXT NOT NULL REFERENCES nodes(id),
    part_id   TEXT NOT NULL REFERENCES part_def(id),
    PRIMARY KEY (taxon_id, part_id)
);
CREATE INDEX has_part_part ON has_part(part_id);

CREATE TABLE taxon_part_nodes (
    id            TEXT PRIMARY KEY,
    taxon_id      TEXT NOT NULL REFERENCES nodes(id),
    part_id       TEXT NOT NULL REFERENCES part_def(id),
    name          TEXT NOT NULL,
    display_name  TEXT NOT NULL,
    name_source   TEXT NOT NULL,
    is_substrate  INTEGER NOT NULL
);

CREATE TABLE family_meta (
    family         TEXT PRIMARY KEY,
    label          TEXT NOT NULL,
    notes          TEXT,
    template_json  TEXT NOT NULL,
    tpt_count      INTEGER NOT NULL
);

CREATE TABLE tpt_nodes (
    id             TEXT PRIMARY KEY,
    tp_id          TEXT NOT NULL REFERENCES taxon_part_nodes(id),
    taxon_id       TEXT NOT NULL REFERENCES nodes(id),
    part_id        TEXT NOT NULL REFERENCES part_def(id),
    family         TEXT NOT NULL REFERENCES family_meta(family),
    name           TEXT NOT NULL,
    notes          TEXT,
    identity_json  TEXT NOT NULL,
    identity_hash  TEXT NOT NULL,
    path_json      TEXT NOT NULL,
    provenance     TEXT NOT NULL
);
CREATE INDEX tpt_nodes_tp ON tpt_nodes(tp_id);

CREATE TABLE tpt_identity_steps (
    tpt_id        TEXT NOT NULL REFERENCES tpt_nodes(id),
    step_index    INTEGER NOT NULL,
    transform_id  TEXT NOT NULL REFERENCES transform_def(id),
    params_json   TEXT NOT NULL,
    PRIMARY KEY (tpt_id, step_index)
);
CREATE INDEX tpt_identity_steps_tf ON tpt_identity_steps(transform_id);

CREATE TABLE tp_tf_counts (
    taxon_id      TEXT NOT NULL REFERENCES nodes(id),
    part_id       TEXT NOT NULL REFERENCES part_def(id),
    transform_id  TEXT NOT NULL REFERENCES transform_def(id),
    tpt_count     INTEGER NOT NULL,
    PRIMARY KEY (taxon_id, part_id, transform_id)
);

CREATE TABLE tpt_flags (
    tpt_id     TEXT NOT NULL REFERENCES tpt_nodes(id),
    flag_type  TEXT NOT NULL,
    flag       TEXT NOT NULL,
    PRIMARY KEY (tpt_id, flag_type, flag)
);

CREATE TABLE tpt_cuisines (
    tpt_id   TEXT NOT NULL REFERENCES tpt_nodes(id),
    cuisine  TEXT NOT NULL,
    PRIMARY KEY (tpt_id, cuisine)
);

CREATE TABLE search_content (
    id            INTEGER PRIMARY KEY,
    entity_kind   TEXT NOT NULL,
    entity_id     TEXT NOT NULL UNIQUE,
    name          TEXT NOT NULL,
    display_name  TEXT NOT NULL,
    synonyms      TEXT NOT NULL,
    taxon_id      TEXT REFERENCES nodes(id),
    part_id       TEXT REFERENCES part_def(id)
);

CREATE VIRTUAL TABLE search_fts USING fts5(
    name, display_name, synonyms,
    content='search_content', content_rowid='id'
);

CREATE TABLE meta (
    key  TEXT PRIMARY KEY,
    val  TEXT NOT NULL
);
"#;

/// Applies connection pragmas and creates every table.
///
/// # Errors
///
/// Returns an error if a pragma or DDL statement fails (for example when the
/// linked SQLite lacks FTS5).
pub fn create(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        "#,
    )
    .context("Failed to configure database connection")?;
    conn.execute_batch(SCHEMA_SQL)
        .context("Failed to create database schema")
}

/// Every table the packer owns, in creation order.
pub const TABLES: &[&str] = &[
    "nodes",
    "synonyms",
    "taxon_ancestors",
    "taxon_doc",
    "part_def",
    "part_synonym",
    "part_ancestors",
    "transform_def",
    "has_part",
    "taxon_part_nodes",
    "family_meta",
    "tpt_nodes",
    "tpt_identity_steps",
    "tp_tf_counts",
    "tpt_flags",
    "tpt_cuisines",
    "search_content",
    "search_fts",
    "meta",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_every_table() {
        let conn = Connection::open_in_memory().expect("in-memory db");
        create(&conn).expect("schema");
        for table in TABLES {
            let found: i64 = conn
                .query_row(
                    "SELECT count(*) FROM sqlite_master WHERE name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .expect("query");
            assert_eq!(found, 1, "missing table {table}");
        }
    }
}

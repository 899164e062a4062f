//! Identifier helpers: derived parents, depth, segment-aware prefix matching.
//!
//! Taxon ids are colon-delimited paths rooted at `tx`. The parent of an id is
//! never stored; it is always the id with its last segment removed.

/// Id of the single taxonomy root.
pub const ROOT_ID: &str = "tx";

/// Separator between the taxon and part halves of a composite TP id.
pub const COMPOSITE_SEP: char = '|';

/// Returns the derived parent of `id`, or `None` for a single-segment id.
#[must_use]
pub fn parent_of(id: &str) -> Option<&str> {
    id.rfind(':').map(|pos| &id[..pos])
}

/// Returns the hierarchical depth of `id` (`tx` = 0, `tx:p` = 1, ...).
#[must_use]
pub fn depth(id: &str) -> usize {
    id.matches(':').count()
}

/// Returns the kingdom code segment of a taxon id (`"p"` for `tx:p:malus`).
#[must_use]
pub fn kingdom_code(id: &str) -> Option<&str> {
    id.split(':').nth(1)
}

/// Returns the last segment of `id`.
#[must_use]
pub fn last_segment(id: &str) -> &str {
    id.rsplit(':').next().unwrap_or(id)
}

/// Segment-aware prefix test: `tx:p:malus` matches `tx:p:malus` and
/// `tx:p:malus:domestica` but not `tx:p:malusx`.
#[must_use]
pub fn matches_prefix(id: &str, prefix: &str) -> bool {
    let prefix = normalize_prefix(prefix);
    if prefix.is_empty() {
        return true;
    }
    match id.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(':'),
        None => false,
    }
}

/// Strips surrounding whitespace and trailing `:` from an authored prefix.
#[must_use]
pub fn normalize_prefix(prefix: &str) -> &str {
    prefix.trim().trim_end_matches(':')
}

/// Builds the composite `taxon|part` id of a Taxon+Part node.
#[must_use]
pub fn tp_id(taxon_id: &str, part_id: &str) -> String {
    format!("{taxon_id}{COMPOSITE_SEP}{part_id}")
}

/// Builds the final `taxon|part|suffix` id of a canonical TPT.
#[must_use]
pub fn tpt_id(taxon_id: &str, part_id: &str, suffix: &str) -> String {
    format!("{taxon_id}{COMPOSITE_SEP}{part_id}{COMPOSITE_SEP}{suffix}")
}

/// Returns every ancestor of `id` from the parent up to the root.
#[must_use]
pub fn ancestors(id: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = id;
    while let Some(parent) = parent_of(current) {
        out.push(parent);
        current = parent;
    }
    out
}

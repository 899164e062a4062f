//! Taxonomy stage validator.
//!
//! Checks `compiled/taxa.jsonl` and `compiled/parts.json`: unique ids, one
//! root, every derived parent present, ranks allowed for their kingdom,
//! `(depth, id)` ordering, and a resolvable, acyclic part hierarchy.

use std::collections::HashSet;

use anyhow::Result;
use taxograph_compiler::forest::Forest;
use taxograph_compiler::taxonomy::{KINGDOM_RANK, ROOT_RANK};
use taxograph_spec::layout::build;
use taxograph_spec::{ids, Part, Taxon};

use super::{duplicates, load_json, load_jsonl, unsorted};
use crate::report::{ConformanceReport, TestResult};
use crate::VerifyPaths;

const V: &str = "taxonomy";

/// Validates the compiled taxonomy and part registry.
///
/// # Errors
///
/// Never fails on artifact contents; reserved for I/O failures.
pub fn validate(paths: &VerifyPaths) -> Result<ConformanceReport> {
    let mut report = ConformanceReport::new();
    if let Some(taxa) = load_jsonl::<Taxon>(&mut report, V, &paths.build, build::COMPILED_TAXA) {
        check_taxa(&taxa, &mut report);
    }
    let parts = load_json::<Vec<Part>>(&mut report, V, &paths.build, build::COMPILED_PARTS);
    if let Some(parts) = parts {
        check_parts(&parts, &mut report);
    }
    Ok(report)
}

fn check_taxa(taxa: &[Taxon], report: &mut ConformanceReport) {
    report.push(TestResult::pass(V, format!("{} taxa loaded", taxa.len())));
    report.check(
        "taxonomy/unique",
        "taxon ids are unique",
        duplicates(taxa.iter().map(|t| t.id.as_str()), "taxon"),
    );

    let roots: Vec<&Taxon> = taxa.iter().filter(|t| t.parent_id().is_none()).collect();
    let root_problems = match roots.as_slice() {
        [root] if root.id == ids::ROOT_ID && root.rank == ROOT_RANK => Vec::new(),
        [] => vec!["no root taxon".to_owned()],
        many => many.iter().map(|t| format!("root candidate {} ({})", t.id, t.rank)).collect(),
    };
    report.check("taxonomy/root", "exactly one `tx` root", root_problems);

    let known: HashSet<&str> = taxa.iter().map(|t| t.id.as_str()).collect();
    report.check(
        "taxonomy/parents",
        "every derived parent exists",
        taxa.iter()
            .filter_map(|t| {
                let parent = t.parent_id()?;
                (!known.contains(parent)).then(|| format!("{} is missing parent {parent}", t.id))
            })
            .collect(),
    );

    report.check(
        "taxonomy/ranks",
        "ranks belong to their kingdom",
        taxa.iter().filter_map(rank_problem).collect(),
    );

    let keys: Vec<(usize, &str)> = taxa.iter().map(|t| (t.depth(), t.id.as_str())).collect();
    report.check(
        "taxonomy/order",
        "taxa sorted by (depth, id)",
        unsorted(&keys, "taxon"),
    );
}

fn rank_problem(taxon: &Taxon) -> Option<String> {
    match (taxon.depth(), taxon.kingdom()) {
        (0, _) => None,
        (1, Some(_)) if taxon.rank == KINGDOM_RANK => None,
        (1, _) => Some(format!("{} must be a kingdom node", taxon.id)),
        (_, Some(kingdom)) if taxon.rank != KINGDOM_RANK && kingdom.allows_rank(&taxon.rank) => {
            None
        }
        (_, Some(kingdom)) => Some(format!(
            "{} has rank {} not allowed for {}",
            taxon.id,
            taxon.rank,
            kingdom.as_str()
        )),
        (_, None) => Some(format!("{} has an unknown kingdom", taxon.id)),
    }
}

fn check_parts(parts: &[Part], report: &mut ConformanceReport) {
    report.push(TestResult::pass(V, format!("{} parts loaded", parts.len())));
    let mut problems = duplicates(parts.iter().map(|p| p.id.as_str()), "part");
    problems.extend(
        parts
            .iter()
            .filter(|p| p.is_promotion() && p.parent_id.is_none())
            .map(|p| format!("promotion {} has no parent_id", p.id)),
    );
    if problems.is_empty() {
        let pairs = parts
            .iter()
            .map(|p| (p.id.as_str(), p.parent_id.as_deref()));
        if let Err(e) = Forest::build(pairs) {
            problems.push(e.to_string());
        }
    }
    report.check(
        "taxonomy/parts",
        "part hierarchy resolves without cycles",
        problems,
    );
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn taxa(v: serde_json::Value) -> Vec<Taxon> {
        serde_json::from_value(v).expect("taxa")
    }

    #[test]
    fn clean_taxonomy_passes() {
        let taxa = taxa(json!([
            {"id": "tx", "rank": "root", "display_name": "Life", "latin_name": "Biota"},
            {"id": "tx:p", "rank": "kingdom", "display_name": "Plants", "latin_name": "Plantae"},
            {"id": "tx:p:malus", "rank": "genus", "display_name": "Apples", "latin_name": "Malus"}
        ]));
        let mut report = ConformanceReport::new();
        check_taxa(&taxa, &mut report);
        assert!(report.all_passed(), "{report:?}");
    }

    #[test]
    fn missing_parent_and_bad_rank_fail() {
        let taxa = taxa(json!([
            {"id": "tx", "rank": "root", "display_name": "Life", "latin_name": "Biota"},
            {"id": "tx:f", "rank": "kingdom", "display_name": "Fungi", "latin_name": "Fungi"},
            {"id": "tx:f:agaricus:bisporus", "rank": "breed", "display_name": "Button", "latin_name": "A. bisporus"}
        ]));
        let mut report = ConformanceReport::new();
        check_taxa(&taxa, &mut report);
        let failed: Vec<&str> = report
            .results
            .iter()
            .filter(|r| r.is_failure())
            .map(|r| r.validator.as_str())
            .collect();
        assert_eq!(failed, vec!["taxonomy/parents", "taxonomy/ranks"]);
    }
}

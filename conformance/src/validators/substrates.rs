//! Substrates stage validator.
//!
//! Re-checks the two structural promises of `graph/substrates.jsonl`: every
//! edge resolves, and no edge survives on a taxon whose descendant carries
//! the same part (leaf pruning), except on animal species and subspecies.

use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::Result;
use taxograph_compiler::substrates::is_prune_exempt;
use taxograph_spec::layout::build;
use taxograph_spec::{ids, Part, SubstrateEdge, Taxon, TpIndexRow};

use super::{duplicates, load_json, load_jsonl, unsorted};
use crate::report::ConformanceReport;
use crate::VerifyPaths;

const V: &str = "substrates";

/// Validates substrate edges and the TP index.
///
/// # Errors
///
/// Never fails on artifact contents; reserved for I/O failures.
pub fn validate(paths: &VerifyPaths) -> Result<ConformanceReport> {
    let mut report = ConformanceReport::new();
    let b = &paths.build;
    let taxa = load_jsonl::<Taxon>(&mut report, V, b, build::COMPILED_TAXA);
    let parts = load_json::<Vec<Part>>(&mut report, V, b, build::COMPILED_PARTS);
    let edges = load_jsonl::<SubstrateEdge>(&mut report, V, b, build::SUBSTRATES);
    let index = load_jsonl::<TpIndexRow>(&mut report, V, b, build::TP_INDEX);
    if let (Some(taxa), Some(parts), Some(edges), Some(index)) = (taxa, parts, edges, index) {
        check_edges(&taxa, &parts, &edges, &mut report);
        check_index(&taxa, &edges, &index, &mut report);
    }
    Ok(report)
}

fn check_edges(
    taxa: &[Taxon],
    parts: &[Part],
    edges: &[SubstrateEdge],
    report: &mut ConformanceReport,
) {
    let taxon_ids: HashSet<&str> = taxa.iter().map(|t| t.id.as_str()).collect();
    let part_ids: HashSet<&str> = parts.iter().map(|p| p.id.as_str()).collect();
    let mut problems = duplicates(edges.iter().map(SubstrateEdge::tp_id), "edge");
    problems.extend(unsorted(edges, "edge"));
    for edge in edges {
        if !taxon_ids.contains(edge.taxon_id.as_str()) {
            problems.push(format!("{} has unknown taxon", edge.tp_id()));
        }
        if !part_ids.contains(edge.part_id.as_str()) {
            problems.push(format!("{} has unknown part", edge.tp_id()));
        }
    }
    report.check(
        "substrates/edges",
        "edges are unique, sorted and resolve",
        problems,
    );

    let by_id: HashMap<&str, &Taxon> = taxa.iter().map(|t| (t.id.as_str(), t)).collect();
    let present: BTreeSet<(&str, &str)> = edges
        .iter()
        .map(|e| (e.taxon_id.as_str(), e.part_id.as_str()))
        .collect();
    let mut problems = Vec::new();
    for edge in edges {
        for ancestor in ids::ancestors(&edge.taxon_id) {
            if !present.contains(&(ancestor, edge.part_id.as_str())) {
                continue;
            }
            if by_id.get(ancestor).is_some_and(|t| is_prune_exempt(t)) {
                continue;
            }
            problems.push(format!(
                "{ancestor} keeps {} although descendant {} has it",
                edge.part_id, edge.taxon_id
            ));
        }
    }
    problems.sort();
    problems.dedup();
    report.check(
        "substrates/pruning",
        "only leaf-most edges survive",
        problems,
    );
}

fn check_index(
    taxa: &[Taxon],
    edges: &[SubstrateEdge],
    index: &[TpIndexRow],
    report: &mut ConformanceReport,
) {
    let by_id: HashMap<&str, &Taxon> = taxa.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut problems = Vec::new();
    if index.len() != edges.len() {
        problems.push(format!("{} index rows for {} edges", index.len(), edges.len()));
    }
    for (row, edge) in index.iter().zip(edges) {
        if row.id != edge.tp_id() || row.taxon_id != edge.taxon_id || row.part_id != edge.part_id {
            problems.push(format!("index row {} does not match edge {}", row.id, edge.tp_id()));
            continue;
        }
        match by_id.get(row.taxon_id.as_str()) {
            Some(t) if t.kingdom() == Some(row.kingdom) && t.rank == row.rank => {}
            _ => problems.push(format!("index row {} has stale kingdom or rank", row.id)),
        }
    }
    report.check("substrates/index", "TP index mirrors the edges", problems);
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn taxa() -> Vec<Taxon> {
        serde_json::from_value(json!([
            {"id": "tx:a:bos", "rank": "genus", "display_name": "Cattle", "latin_name": "Bos"},
            {"id": "tx:a:bos:taurus", "rank": "species", "display_name": "Cow", "latin_name": "Bos taurus"},
            {"id": "tx:a:bos:taurus:angus", "rank": "breed", "display_name": "Angus", "latin_name": "Bos taurus"}
        ]))
        .expect("taxa")
    }

    fn parts() -> Vec<Part> {
        serde_json::from_value(json!([{"id": "part:muscle", "name": "muscle", "kind": "animal"}]))
            .expect("parts")
    }

    #[test]
    fn species_exemption_and_genus_violation() {
        let edges = vec![
            SubstrateEdge::new("tx:a:bos", "part:muscle"),
            SubstrateEdge::new("tx:a:bos:taurus", "part:muscle"),
            SubstrateEdge::new("tx:a:bos:taurus:angus", "part:muscle"),
        ];
        let mut report = ConformanceReport::new();
        check_edges(&taxa(), &parts(), &edges, &mut report);
        let pruning = report
            .results
            .iter()
            .find(|r| r.validator == "substrates/pruning")
            .expect("pruning result");
        assert!(pruning.is_failure());
        // the genus is flagged once per descendant; the species is exempt
        assert!(pruning.details.iter().all(|d| d.starts_with("tx:a:bos keeps")));
        assert_eq!(pruning.details.len(), 2);
    }

    #[test]
    fn leaf_edges_pass() {
        let edges = vec![
            SubstrateEdge::new("tx:a:bos:taurus", "part:muscle"),
            SubstrateEdge::new("tx:a:bos:taurus:angus", "part:muscle"),
        ];
        let mut report = ConformanceReport::new();
        check_edges(&taxa(), &parts(), &edges, &mut report);
        assert!(report.all_passed(), "{report:?}");
    }
}

//! Families stage validator.

use std::collections::HashSet;

use anyhow::Result;
use taxograph_compiler::canon::signature;
use taxograph_spec::layout::build;
use taxograph_spec::{
    Part, Provenance, SubstrateEdge, Taxon, TptCandidate, TransformRegistry, TransformsCanon,
};

use super::{duplicates, load_json, load_jsonl};
use crate::report::{ConformanceReport, TestResult};
use crate::VerifyPaths;

const V: &str = "families";

/// Validates `tmp/tpt_generated.jsonl` and `tmp/tpt_seed.jsonl`.
///
/// # Errors
///
/// Never fails on artifact contents; reserved for I/O failures.
pub fn validate(paths: &VerifyPaths) -> Result<ConformanceReport> {
    let mut report = ConformanceReport::new();
    let b = &paths.build;
    let taxa = load_jsonl::<Taxon>(&mut report, V, b, build::COMPILED_TAXA);
    let parts = load_json::<Vec<Part>>(&mut report, V, b, build::COMPILED_PARTS);
    let canon = load_json::<TransformsCanon>(&mut report, V, b, build::TRANSFORMS_CANON);
    let edges = load_jsonl::<SubstrateEdge>(&mut report, V, b, build::SUBSTRATES);
    let generated = load_jsonl::<TptCandidate>(&mut report, V, b, build::TPT_GENERATED);
    let seeds = load_jsonl::<TptCandidate>(&mut report, V, b, build::TPT_SEED);
    let (Some(taxa), Some(parts), Some(canon), Some(edges), Some(generated), Some(seeds)) =
        (taxa, parts, canon, edges, generated, seeds)
    else {
        return Ok(report);
    };
    let registry = TransformRegistry::from_canon(canon);
    check_generated(&generated, &edges, &registry, &mut report);
    check_seeds(&seeds, &taxa, &parts, &mut report);
    Ok(report)
}

fn check_generated(
    generated: &[TptCandidate],
    edges: &[SubstrateEdge],
    registry: &TransformRegistry,
    report: &mut ConformanceReport,
) {
    report.push(TestResult::pass(V, format!("{} generated candidates", generated.len())));
    report.check(
        "families/unique",
        "generated candidates are unique per (taxon, part, family, path)",
        duplicates(
            generated.iter().map(|c| {
                format!(
                    "{}|{} {}",
                    c.tp_id(),
                    c.family.as_deref().unwrap_or("-"),
                    signature::path_encoding(&c.path)
                )
            }),
            "candidate",
        ),
    );

    let substrates: HashSet<String> = edges.iter().map(SubstrateEdge::tp_id).collect();
    let mut problems = Vec::new();
    for c in generated {
        let tp = c.tp_id();
        if c.provenance != Provenance::Generated {
            problems.push(format!("{tp} is not marked generated"));
        }
        if c.family.is_none() {
            problems.push(format!("{tp} has no family"));
        }
        if !substrates.contains(&tp) {
            problems.push(format!("{tp} is not a substrate edge"));
        }
        for step in &c.path {
            if registry.contains(&step.id)
                && !registry.is_applicable(&step.id, &c.taxon_id, &c.part_id)
            {
                problems.push(format!("{tp} uses {} outside its applicability", step.id));
            }
        }
    }
    report.check(
        "families/generated",
        "generated candidates sit on substrates with applicable transforms",
        problems,
    );
}

fn check_seeds(
    seeds: &[TptCandidate],
    taxa: &[Taxon],
    parts: &[Part],
    report: &mut ConformanceReport,
) {
    let taxon_ids: HashSet<&str> = taxa.iter().map(|t| t.id.as_str()).collect();
    let part_ids: HashSet<&str> = parts.iter().map(|p| p.id.as_str()).collect();
    let mut problems = Vec::new();
    for s in seeds {
        let tp = s.tp_id();
        if s.provenance != Provenance::Seed {
            problems.push(format!("{tp} is not marked seed"));
        }
        if !taxon_ids.contains(s.taxon_id.as_str()) || !part_ids.contains(s.part_id.as_str()) {
            problems.push(format!("{tp} references an unknown taxon or part"));
        }
        if s.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            problems.push(format!("{tp} has no name"));
        }
    }
    report.check("families/seeds", "seeds resolve and are named", problems);
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use taxograph_spec::PathStep;

    use super::*;

    #[test]
    fn generated_off_substrate_fails() {
        let registry = TransformRegistry::from_canon(
            serde_json::from_value(json!({"transforms": [
                {"id": "tf:cure", "name": "Cure", "identity": true, "order": 1}
            ]}))
            .expect("canon"),
        );
        let edges = vec![SubstrateEdge::new("tx:a:sus:scrofa", "part:muscle")];
        let mut on = TptCandidate::new(
            "tx:a:sus:scrofa",
            "part:muscle",
            vec![PathStep::new("tf:cure")],
            Provenance::Generated,
        );
        on.family = Some("cured".into());
        let mut off = on.clone();
        off.part_id = "part:fat".into();

        let mut report = ConformanceReport::new();
        check_generated(&[on.clone()], &edges, &registry, &mut report);
        assert!(report.all_passed(), "{report:?}");

        let mut report = ConformanceReport::new();
        check_generated(&[on.clone(), on, off], &edges, &registry, &mut report);
        assert_eq!(report.failure_count(), 2);
    }
}

//! Canon stage validator.
//!
//! Every canonical TPT must re-derive: hashing its stored identity steps
//! reproduces its id suffix and identity hash, and canonicalizing those
//! steps again leaves them unchanged.

use std::collections::BTreeSet;

use anyhow::Result;
use taxograph_compiler::canon::{Canonicalizer, Signature, RAW_SUFFIX};
use taxograph_compiler::LintLog;
use taxograph_spec::layout::{build, ontology};
use taxograph_spec::rules::{stem, BucketTable};
use taxograph_spec::{io, ids, CanonicalTpt, TransformRegistry, TransformsCanon};

use super::{duplicates, load_json, load_jsonl, unsorted};
use crate::report::{ConformanceReport, TestResult};
use crate::VerifyPaths;

const V: &str = "canon";

/// Validates `tmp/tpt_canon.jsonl`.
///
/// # Errors
///
/// Never fails on artifact contents; reserved for I/O failures.
pub fn validate(paths: &VerifyPaths) -> Result<ConformanceReport> {
    let mut report = ConformanceReport::new();
    let canon = load_json::<TransformsCanon>(&mut report, V, &paths.build, build::TRANSFORMS_CANON);
    let tpts = load_jsonl::<CanonicalTpt>(&mut report, V, &paths.build, build::TPT_CANON);
    let buckets: Option<BucketTable> =
        match io::read_rule_map(&paths.ontology.join(ontology::RULES_DIR), stem::PARAM_BUCKETS) {
            Ok(b) => Some(b),
            Err(e) => {
                report.push(TestResult::fail(V, format!("param buckets unreadable: {e:#}")));
                None
            }
        };
    if let (Some(canon), Some(tpts), Some(buckets)) = (canon, tpts, buckets) {
        let registry = TransformRegistry::from_canon(canon);
        check_tpts(&tpts, &registry, &buckets, &mut report);
    }
    Ok(report)
}

fn check_tpts(
    tpts: &[CanonicalTpt],
    registry: &TransformRegistry,
    buckets: &BucketTable,
    report: &mut ConformanceReport,
) {
    report.push(TestResult::pass(V, format!("{} canonical TPTs", tpts.len())));
    let ids_in_order: Vec<&str> = tpts.iter().map(|t| t.id.as_str()).collect();
    let mut problems = duplicates(ids_in_order.iter().copied(), "TPT id");
    problems.extend(unsorted(&ids_in_order, "TPT id"));
    report.check("canon/unique", "TPT ids are unique and sorted", problems);

    let widths: BTreeSet<usize> = tpts
        .iter()
        .filter_map(|t| suffix_of(&t.id))
        .filter(|s| *s != RAW_SUFFIX)
        .map(str::len)
        .collect();
    let Some(&width) = widths.iter().next() else {
        report.push(TestResult::pass("canon/identity", "no hashed TPTs to re-derive"));
        return;
    };
    if widths.len() > 1 {
        report.push(TestResult::fail(
            "canon/identity",
            format!("mixed suffix widths {widths:?}"),
        ));
        return;
    }

    let mut log = LintLog::new();
    let engine = Canonicalizer::new(registry, buckets, &[], width, &mut log);
    let mut problems = Vec::new();
    for tpt in tpts {
        let sig = Signature::compute(&tpt.taxon_id, &tpt.part_id, &tpt.identity, width);
        let derived = sig.tpt_id(&tpt.taxon_id, &tpt.part_id);
        if derived != tpt.id {
            problems.push(format!("{} re-derives to {derived}", tpt.id));
        }
        if sig.hash != tpt.identity_hash {
            problems.push(format!("{} has a stale identity hash", tpt.id));
        }
        if engine.identity_steps(&tpt.identity) != tpt.identity {
            problems.push(format!("{} identity steps are not canonical", tpt.id));
        }
        if tpt.family.trim().is_empty() {
            problems.push(format!("{} has no family", tpt.id));
        }
    }
    report.check(
        "canon/identity",
        "ids re-derive from identity steps",
        problems,
    );
}

fn suffix_of(id: &str) -> Option<&str> {
    id.rsplit(ids::COMPOSITE_SEP).next()
}

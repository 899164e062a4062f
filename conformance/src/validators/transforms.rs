//! Transforms stage validator.

use std::collections::HashSet;

use anyhow::Result;
use taxograph_compiler::LintReport;
use taxograph_spec::layout::build;
use taxograph_spec::{ParamKind, TransformsCanon};

use super::{duplicates, load_json, unsorted};
use crate::report::{ConformanceReport, TestResult};
use crate::VerifyPaths;

const V: &str = "transforms";

/// Validates `tmp/transforms_canon.json` and `report/lint.json`.
///
/// # Errors
///
/// Never fails on artifact contents; reserved for I/O failures.
pub fn validate(paths: &VerifyPaths) -> Result<ConformanceReport> {
    let mut report = ConformanceReport::new();
    let canon = load_json::<TransformsCanon>(&mut report, V, &paths.build, build::TRANSFORMS_CANON);
    if let Some(canon) = canon {
        check_canon(&canon, &mut report);
    }
    if let Some(lint) = load_json::<LintReport>(&mut report, V, &paths.build, build::LINT_REPORT) {
        check_lint(&lint, &mut report);
    }
    Ok(report)
}

fn check_canon(canon: &TransformsCanon, report: &mut ConformanceReport) {
    let ids: Vec<&str> = canon.transforms.iter().map(|t| t.id.as_str()).collect();
    let mut problems = duplicates(ids.iter().copied(), "transform");
    problems.extend(unsorted(&ids, "transform"));
    problems.extend(
        ids.iter()
            .filter(|id| id.is_empty() || id.trim() != **id)
            .map(|id| format!("transform id `{id}` is blank or untrimmed")),
    );
    report.check(
        "transforms/ids",
        "transform ids are trimmed, unique and sorted",
        problems,
    );

    let mut problems = Vec::new();
    for tf in &canon.transforms {
        problems.extend(duplicates(
            tf.params.iter().map(|p| p.key.as_str()),
            &format!("{} param", tf.id),
        ));
        problems.extend(
            tf.params
                .iter()
                .filter(|p| p.kind == ParamKind::Enum && p.values.is_empty())
                .map(|p| format!("{}.{} is an enum without values", tf.id, p.key)),
        );
    }
    report.check(
        "transforms/params",
        "parameter schemas are well formed",
        problems,
    );

    let known: HashSet<&str> = ids.into_iter().collect();
    report.check(
        "transforms/applicability",
        "applicability rules reference known transforms",
        canon
            .applicability
            .iter()
            .filter(|a| !known.contains(a.transform.as_str()))
            .map(|a| format!("rule for unknown transform {}", a.transform))
            .collect(),
    );
}

fn check_lint(lint: &LintReport, report: &mut ConformanceReport) {
    let counted: usize = lint.counts.values().sum();
    if counted != lint.issues.len() || lint.errors + lint.warnings != lint.issues.len() {
        report.push(TestResult::fail(
            "transforms/lint",
            format!(
                "lint report totals disagree: {} issues, {counted} counted, {} errors + {} warnings",
                lint.issues.len(),
                lint.errors,
                lint.warnings
            ),
        ));
    } else if lint.errors > 0 {
        report.push(TestResult::warn(
            "transforms/lint",
            format!("{} rule row(s) dropped by lint", lint.errors),
        ));
    } else {
        report.push(TestResult::pass("transforms/lint", "rule files lint clean"));
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn untrimmed_and_unsorted_ids_fail() {
        let canon: TransformsCanon = serde_json::from_value(json!({"transforms": [
            {"id": "tf:smoke", "name": "Smoke", "identity": true, "order": 1},
            {"id": "cure ", "name": "Cure", "identity": true, "order": 2,
             "params": [{"key": "style", "kind": "enum"}]}
        ], "applicability": [{"transform": "tf:fry", "applies_to": []}]}))
        .expect("canon");
        let mut report = ConformanceReport::new();
        check_canon(&canon, &mut report);
        assert_eq!(report.failure_count(), 3);
        let ids = &report.results[0];
        assert_eq!(ids.details.len(), 2);
    }

    #[test]
    fn lint_errors_are_warnings() {
        let lint: LintReport = serde_json::from_value(json!({
            "errors": 1, "warnings": 0, "counts": {"bad_bucket": 1},
            "issues": [{"source": "rules/param_buckets", "code": "bad_bucket", "severity": "error", "message": "x"}]
        }))
        .expect("lint");
        let mut report = ConformanceReport::new();
        check_lint(&lint, &mut report);
        assert!(report.all_passed());
        assert_eq!(report.warning_count(), 1);
    }
}

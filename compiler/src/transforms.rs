//! Transform canonicalizer and rule lint.
//!
//! Normalizes `transforms.json` into `tmp/transforms_canon.json` and checks
//! every rule file for references to unknown transforms, parts or families,
//! malformed bucket specs and malformed condition trees. Rows with broken
//! references are dropped by the consuming stage; this stage only records
//! them in the lint log.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use taxograph_spec::registry::TransformsCanon;
use taxograph_spec::rules::{stem, PrefixScope, RuleBook, TransformApplicability};
use taxograph_spec::{ids, Condition, ParamKind, Part, Transform, TransformRegistry};

use crate::canon::buckets;
use crate::lint::LintLog;

const SOURCE: &str = "transforms.json";

/// Counters reported by the transforms stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformStats {
    /// Transforms written.
    pub transforms: usize,
    /// Identity-bearing transforms.
    pub identity: usize,
    /// Applicability rules kept.
    pub applicability_rules: usize,
    /// Lint errors across all rule files.
    pub lint_errors: usize,
    /// Lint warnings across all rule files.
    pub lint_warnings: usize,
}

/// Returns `id` as authored, minus surrounding whitespace.
///
/// Ids are never rewritten beyond trimming: seeds, family templates, part
/// proto paths, bucket keys and conditions all refer to transforms by the
/// id written in `transforms.json`.
#[must_use]
pub fn normalize_transform_id(id: &str) -> String {
    id.trim().to_owned()
}

fn normalize_scope(scope: &PrefixScope) -> PrefixScope {
    PrefixScope {
        taxon_prefix: ids::normalize_prefix(&scope.taxon_prefix).to_owned(),
        parts: scope.parts.as_ref().map(|parts| {
            let set: BTreeSet<&str> = parts.iter().map(|p| p.trim()).collect();
            set.into_iter().map(str::to_owned).collect()
        }),
    }
}

fn normalize_transform(raw: Transform, log: &mut LintLog) -> Option<Transform> {
    if raw.id.trim().is_empty() {
        log.error(
            SOURCE,
            "missing_id",
            format!("transform `{}` has no id", raw.name),
        );
        return None;
    }
    let id = normalize_transform_id(&raw.id);
    let mut params = Vec::with_capacity(raw.params.len());
    let mut seen = BTreeSet::new();
    for mut param in raw.params {
        if !seen.insert(param.key.clone()) {
            log.error(
                SOURCE,
                "duplicate_param",
                format!("{id}: param `{}` declared twice", param.key),
            );
            continue;
        }
        match param.kind {
            ParamKind::Enum if param.values.is_empty() => {
                log.error(
                    SOURCE,
                    "bad_param",
                    format!("{id}: enum param `{}` lists no values", param.key),
                );
                continue;
            }
            ParamKind::Enum => {
                let mut seen = BTreeSet::new();
                param.values.retain(|v| seen.insert(v.clone()));
            }
            ParamKind::Number | ParamKind::Boolean if !param.values.is_empty() => {
                log.warn(
                    SOURCE,
                    "bad_param",
                    format!("{id}: non-enum param `{}` lists enum values", param.key),
                );
                param.values.clear();
            }
            ParamKind::Number | ParamKind::Boolean => {}
        }
        params.push(param);
    }
    params.sort_by(|a, b| a.key.cmp(&b.key));
    let synonyms: BTreeSet<String> = raw
        .synonyms
        .iter()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect();
    Some(Transform {
        id,
        name: raw.name.trim().to_owned(),
        class: raw.class.map(|c| c.trim().to_lowercase()),
        params,
        synonyms: synonyms.into_iter().collect(),
        ..raw
    })
}

/// Normalizes transform definitions and their applicability rules.
///
/// Duplicate ids keep the first definition; applicability rules for unknown
/// transforms are dropped. Both outputs are sorted for stable artifacts.
#[must_use]
pub fn canonicalize_transforms(
    raw: Vec<Transform>,
    applicability: &[TransformApplicability],
    log: &mut LintLog,
) -> TransformsCanon {
    let mut by_id: BTreeMap<String, Transform> = BTreeMap::new();
    for transform in raw {
        let Some(transform) = normalize_transform(transform, log) else {
            continue;
        };
        if by_id.contains_key(&transform.id) {
            log.error(
                SOURCE,
                "duplicate_transform",
                format!(
                    "transform `{}` defined twice; keeping the first",
                    transform.id
                ),
            );
            continue;
        }
        by_id.insert(transform.id.clone(), transform);
    }

    let source = format!("rules/{}", stem::TRANSFORM_APPLICABILITY);
    let mut rules = Vec::with_capacity(applicability.len());
    for rule in applicability {
        let transform = normalize_transform_id(&rule.transform);
        if !by_id.contains_key(&transform) {
            log.error(
                &source,
                "unknown_transform",
                format!("applicability rule for unknown transform `{transform}` dropped"),
            );
            continue;
        }
        let mut exclude: Vec<String> = rule.exclude.iter().map(|t| t.trim().to_owned()).collect();
        exclude.sort();
        exclude.dedup();
        rules.push(TransformApplicability {
            transform,
            applies_to: rule.applies_to.iter().map(normalize_scope).collect(),
            exclude,
        });
    }
    rules.sort_by(|a, b| a.transform.cmp(&b.transform));

    tracing::info!(
        transforms = by_id.len(),
        applicability = rules.len(),
        "transforms normalized"
    );
    TransformsCanon {
        transforms: by_id.into_values().collect(),
        applicability: rules,
    }
}

struct Refs<'a> {
    registry: &'a TransformRegistry,
    parts: BTreeSet<&'a str>,
}

impl Refs<'_> {
    fn check_transform(&self, log: &mut LintLog, source: &str, context: &str, id: &str) {
        if !self.registry.contains(id) {
            log.warn(
                source,
                "unknown_transform",
                format!("{context}: unknown transform `{id}`"),
            );
        }
    }

    fn check_part(&self, log: &mut LintLog, source: &str, context: &str, id: &str) {
        if !self.parts.contains(id) {
            log.warn(
                source,
                "unknown_part",
                format!("{context}: unknown part `{id}`"),
            );
        }
    }

    fn check_scopes(&self, log: &mut LintLog, source: &str, context: &str, scopes: &[PrefixScope]) {
        for scope in scopes {
            for part in scope.parts.iter().flatten() {
                self.check_part(log, source, context, part);
            }
        }
    }

    fn check_condition(
        &self,
        log: &mut LintLog,
        source: &str,
        context: &str,
        raw: &serde_json::Value,
    ) {
        match Condition::parse(raw) {
            Ok(cond) => {
                for tf in cond.referenced_transforms() {
                    self.check_transform(log, source, context, tf);
                }
                for part in cond.referenced_parts() {
                    self.check_part(log, source, context, part);
                }
            }
            Err(e) => log.error(source, "bad_condition", format!("{context}: {e}")),
        }
    }
}

/// Lints every rule file against the normalized transforms and compiled parts.
pub fn lint_rules(
    registry: &TransformRegistry,
    parts: &[Part],
    rules: &RuleBook,
    log: &mut LintLog,
) {
    let refs = Refs {
        registry,
        parts: parts.iter().map(|p| p.id.as_str()).collect(),
    };
    let src = |name: &str| format!("rules/{name}");

    for part in parts {
        for step in &part.proto_path {
            refs.check_transform(log, "parts", &part.id, &step.id);
        }
    }

    let source = src(stem::PARTS_APPLICABILITY);
    for (i, rule) in rules.parts_applicability.iter().enumerate() {
        let context = format!("rule #{}", i + 1);
        if let Some(part) = &rule.part {
            refs.check_part(log, &source, &context, part);
        } else if rule.applies_to.iter().any(|s| s.parts.is_none()) {
            log.error(
                &source,
                "missing_part",
                format!("{context}: scope without part list and no rule part"),
            );
        }
        refs.check_scopes(log, &source, &context, &rule.applies_to);
    }

    let source = src(stem::IMPLIED_PARTS);
    for rule in &rules.implied_parts {
        refs.check_part(log, &source, "implied part", &rule.part);
    }

    let source = src(stem::FAMILY_EXPANSIONS);
    let mut families = BTreeSet::new();
    for rule in &rules.family_expansions {
        if !families.insert(rule.family.as_str()) {
            log.warn(
                &source,
                "duplicate_family",
                format!("family `{}` declared more than once", rule.family),
            );
        }
        if rule.applies_to.is_empty() {
            log.warn(
                &source,
                "empty_scope",
                format!("family `{}` applies to nothing", rule.family),
            );
        }
        for step in &rule.path {
            refs.check_transform(log, &source, &rule.family, &step.id);
        }
        refs.check_scopes(log, &source, &rule.family, &rule.applies_to);
    }

    let source = src(stem::FAMILY_ALLOWLIST);
    for entry in &rules.family_allowlist {
        if !families.contains(entry.family()) {
            log.warn(
                &source,
                "unknown_family",
                format!("allow-listed family `{}` has no template", entry.family()),
            );
        }
    }

    let source = src(stem::PARAM_BUCKETS);
    for (key, spec) in &rules.param_buckets {
        let target = key.split_once('.').and_then(|(tf, param)| {
            registry.get(tf).and_then(|t| t.param(param)).map(|p| p.kind)
        });
        match target {
            Some(ParamKind::Number) => {}
            Some(_) => log.error(&source, "bad_bucket", format!("{key}: param is not numeric")),
            None => log.error(
                &source,
                "bad_bucket",
                format!("{key}: no such transform param"),
            ),
        }
        if let Err(reason) = buckets::validate(spec) {
            log.error(&source, "bad_bucket", format!("{key}: {reason}"));
        }
    }

    let source = src(stem::DIET_SAFETY_RULES);
    for rule in &rules.diet_safety_rules {
        refs.check_condition(log, &source, &rule.flag, &rule.when);
    }
    let source = src(stem::CUISINE_MAP);
    for rule in &rules.cuisine_map {
        let context = rule.tags().join(",");
        if context.is_empty() {
            log.error(&source, "missing_cuisine", "cuisine rule without a tag");
        }
        refs.check_condition(log, &source, &context, &rule.when);
    }

    let source = src(stem::NAME_OVERRIDES);
    for rule in &rules.name_overrides {
        refs.check_part(log, &source, &rule.taxon_prefix, &rule.part_id);
    }
    let source = src(stem::TAXON_PART_SYNONYMS);
    for rule in &rules.taxon_part_synonyms {
        refs.check_part(log, &source, &rule.taxon_id, &rule.part_id);
    }
    let source = src(stem::TAXON_PART_POLICY);
    for (key, entry) in &rules.taxon_part_policy {
        for part in entry.allow.iter().chain(&entry.deny) {
            refs.check_part(log, &source, key, part);
        }
    }
}

/// Runs the whole transforms stage over in-memory inputs.
#[must_use]
pub fn compile_transforms(
    raw: Vec<Transform>,
    parts: &[Part],
    rules: &RuleBook,
    log: &mut LintLog,
) -> (TransformsCanon, TransformStats) {
    let canon = canonicalize_transforms(raw, &rules.transform_applicability, log);
    let registry = TransformRegistry::from_canon(canon.clone());
    lint_rules(&registry, parts, rules, log);
    let errors = log.error_count();
    let stats = TransformStats {
        transforms: canon.transforms.len(),
        identity: canon.transforms.iter().filter(|t| t.identity).count(),
        applicability_rules: canon.applicability.len(),
        lint_errors: errors,
        lint_warnings: log.issues().len() - errors,
    };
    (canon, stats)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn transforms() -> Vec<Transform> {
        serde_json::from_value(json!([
            {"id": "smoke", "name": " Smoke ", "order": 40, "identity": true,
             "synonyms": ["smoked", "smoked", " "]},
            {"id": "tf:cure", "name": "Cure", "order": 30, "identity": true, "class": "Preservation",
             "params": [
                {"key": "salt", "kind": "enum", "enum": ["dry", "wet", "dry"], "identity_param": true},
                {"key": "nitrite_ppm", "kind": "number", "identity_param": true},
                {"key": "salt", "kind": "boolean"}
             ]},
            {"id": "tf:cure", "name": "Cure again", "order": 31},
            {"id": "tf:mill", "name": "Mill", "order": 50, "class": "part_changing",
             "params": [{"key": "grade", "kind": "enum"}]}
        ]))
        .expect("transforms")
    }

    #[test]
    fn normalizes_ids_params_and_duplicates() {
        let mut log = LintLog::new();
        let canon = canonicalize_transforms(transforms(), &[], &mut log);
        let ids: Vec<&str> = canon.transforms.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["smoke", "tf:cure", "tf:mill"]);
        let cure = &canon.transforms[1];
        assert_eq!(cure.name, "Cure");
        assert_eq!(cure.class.as_deref(), Some("preservation"));
        let keys: Vec<&str> = cure.params.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["nitrite_ppm", "salt"]);
        assert_eq!(cure.params[1].values, vec!["dry", "wet"]);
        assert!(canon.transforms[2].params.is_empty());
        assert_eq!(canon.transforms[0].synonyms, vec!["smoked"]);
        assert_eq!(log.count("duplicate_transform"), 1);
        assert_eq!(log.count("duplicate_param"), 1);
        assert_eq!(log.count("bad_param"), 1);
    }

    #[test]
    fn applicability_for_unknown_transforms_is_dropped() {
        let rules: Vec<TransformApplicability> = serde_json::from_value(json!([
            {"transform": " tf:cure ", "applies_to": [{"taxon_prefix": "tx:a:"}]},
            {"transform": "cure", "applies_to": [{"taxon_prefix": "tx:a"}]}
        ]))
        .expect("rules");
        let mut log = LintLog::new();
        let canon = canonicalize_transforms(transforms(), &rules, &mut log);
        assert_eq!(canon.applicability.len(), 1);
        assert_eq!(canon.applicability[0].transform, "tf:cure");
        assert_eq!(canon.applicability[0].applies_to[0].taxon_prefix, "tx:a");
        assert_eq!(log.count("unknown_transform"), 1);
    }

    #[test]
    fn enum_values_are_deduplicated_in_first_seen_order() {
        let raw: Vec<Transform> = serde_json::from_value(json!([
            {"id": "grind", "name": "Grind", "order": 1,
             "params": [{"key": "grade", "kind": "enum", "enum": ["fine", "coarse", "fine", "coarse"]}]}
        ]))
        .expect("transforms");
        let canon = canonicalize_transforms(raw, &[], &mut LintLog::new());
        assert_eq!(canon.transforms[0].params[0].values, vec!["fine", "coarse"]);
    }

    #[test]
    fn rule_lint_flags_broken_references() {
        let mut log = LintLog::new();
        let canon = canonicalize_transforms(transforms(), &[], &mut log);
        let registry = TransformRegistry::from_canon(canon);
        let mut log = LintLog::new();
        let rules = RuleBook {
            param_buckets: serde_json::from_value(json!({
                "tf:cure.nitrite_ppm": {"cuts": [0, 120], "labels": ["none", "low", "high"]},
                "tf:cure.salt": {"cuts": [1], "labels": ["a", "b"]},
                "tf:cure.bogus": {"cuts": [2, 1], "labels": ["a", "b", "c"]}
            }))
            .expect("buckets"),
            diet_safety_rules: serde_json::from_value(json!([
                {"flag": "contains_nitrite", "type": "safety",
                 "when": {"param": {"transform": "tf:cure", "key": "nitrite_ppm", "op": "exists"}}},
                {"flag": "vegan", "when": {"noneOf": [{"has_part": "part:muscle"}]}},
                {"flag": "broken", "when": {"oneOf": []}}
            ]))
            .expect("flags"),
            family_allowlist: serde_json::from_value(json!(["ghost"])).expect("allowlist"),
            ..RuleBook::default()
        };
        lint_rules(&registry, &[], &rules, &mut log);
        assert_eq!(log.count("bad_bucket"), 3);
        assert_eq!(log.count("bad_condition"), 1);
        assert_eq!(log.count("unknown_part"), 1);
        assert_eq!(log.count("unknown_family"), 1);
    }
}

//! Condition evaluation over a TPT's identity steps.
//!
//! Flag and cuisine rules are parsed once into [`Condition`] trees and then
//! evaluated against [`IdentityFacts`], a typed index of one canonical TPT.
//! Parameter predicates see post-bucketing values. A predicate on a
//! parameter the TPT does not carry is false whatever its operator.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use taxograph_compiler::LintLog;
use taxograph_spec::rules::{CuisineRuleRecord, FlagRuleRecord};
use taxograph_spec::{ids, CanonicalTpt, CompareOp, Condition, ParamTest};

/// Facts about one canonical TPT.
#[derive(Debug, Clone)]
pub struct IdentityFacts<'a> {
    taxon_id: &'a str,
    part_id: &'a str,
    steps: BTreeMap<&'a str, Vec<&'a BTreeMap<String, Value>>>,
}

impl<'a> IdentityFacts<'a> {
    /// Indexes a TPT's identity steps.
    #[must_use]
    pub fn new(tpt: &'a CanonicalTpt) -> Self {
        let mut steps: BTreeMap<&str, Vec<_>> = BTreeMap::new();
        for step in &tpt.identity {
            steps.entry(step.id.as_str()).or_default().push(&step.params);
        }
        Self {
            taxon_id: &tpt.taxon_id,
            part_id: &tpt.part_id,
            steps,
        }
    }

    /// Evaluates `cond` against these facts.
    #[must_use]
    pub fn eval(&self, cond: &Condition) -> bool {
        match cond {
            Condition::AllOf(children) => children.iter().all(|c| self.eval(c)),
            Condition::AnyOf(children) => children.iter().any(|c| self.eval(c)),
            Condition::NoneOf(children) => !children.iter().any(|c| self.eval(c)),
            Condition::HasTransform(id) => self.steps.contains_key(id.as_str()),
            Condition::HasPart(id) => self.part_id == id,
            Condition::TaxonPrefix(prefix) => ids::matches_prefix(self.taxon_id, prefix),
            Condition::Param(test) => self.eval_param(test),
        }
    }

    /// A transform applied more than once satisfies the test if any of its
    /// occurrences does.
    fn eval_param(&self, test: &ParamTest) -> bool {
        self.steps
            .get(test.transform.as_str())
            .into_iter()
            .flatten()
            .filter_map(|params| params.get(test.key.as_str()))
            .any(|actual| param_holds(actual, test))
    }
}

fn param_holds(actual: &Value, test: &ParamTest) -> bool {
    let Some(operand) = test.value.as_ref() else {
        return test.op == CompareOp::Exists;
    };
    match test.op {
        CompareOp::Exists => true,
        CompareOp::Eq => values_equal(actual, operand),
        CompareOp::Ne => !values_equal(actual, operand),
        CompareOp::Gt => compare(actual, operand) == Some(Ordering::Greater),
        CompareOp::Gte => matches!(
            compare(actual, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CompareOp::Lt => compare(actual, operand) == Some(Ordering::Less),
        CompareOp::Lte => matches!(
            compare(actual, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        CompareOp::In => operand
            .as_array()
            .is_some_and(|items| items.iter().any(|v| values_equal(actual, v))),
        CompareOp::NotIn => operand
            .as_array()
            .is_some_and(|items| !items.iter().any(|v| values_equal(actual, v))),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

/// A parsed flag rule.
#[derive(Debug, Clone)]
pub struct FlagRule {
    /// Flag value.
    pub flag: String,
    /// Flag category.
    pub flag_type: String,
    /// Condition.
    pub when: Condition,
}

/// A parsed cuisine rule.
#[derive(Debug, Clone)]
pub struct CuisineRule {
    /// Cuisine tags.
    pub cuisines: Vec<String>,
    /// Condition.
    pub when: Condition,
}

/// Flag and cuisine rules ready for evaluation.
#[derive(Debug, Clone, Default)]
pub struct RuleEvaluator {
    flags: Vec<FlagRule>,
    cuisines: Vec<CuisineRule>,
}

impl RuleEvaluator {
    /// Parses rule records; malformed conditions are logged and skipped.
    #[must_use]
    pub fn new(
        flags: &[FlagRuleRecord],
        cuisines: &[CuisineRuleRecord],
        log: &mut LintLog,
    ) -> Self {
        let mut out = Self::default();
        for rec in flags {
            match Condition::parse(&rec.when) {
                Ok(when) => out.flags.push(FlagRule {
                    flag: rec.flag.clone(),
                    flag_type: rec.flag_type.clone(),
                    when,
                }),
                Err(e) => log.error(
                    "rules/diet_safety_rules",
                    "bad_condition",
                    format!("{}: {e}", rec.flag),
                ),
            }
        }
        for rec in cuisines {
            match Condition::parse(&rec.when) {
                Ok(when) => out.cuisines.push(CuisineRule {
                    cuisines: rec.tags().into_iter().map(str::to_owned).collect(),
                    when,
                }),
                Err(e) => log.error("rules/cuisine_map", "bad_condition", e.to_string()),
            }
        }
        out
    }

    /// Returns the `(flag_type, flag)` pairs that hold for `tpt`.
    #[must_use]
    pub fn flags(&self, tpt: &CanonicalTpt) -> BTreeSet<(String, String)> {
        let facts = IdentityFacts::new(tpt);
        self.flags
            .iter()
            .filter(|r| facts.eval(&r.when))
            .map(|r| (r.flag_type.clone(), r.flag.clone()))
            .collect()
    }

    /// Returns the cuisine tags that hold for `tpt`.
    #[must_use]
    pub fn cuisines(&self, tpt: &CanonicalTpt) -> BTreeSet<String> {
        let facts = IdentityFacts::new(tpt);
        self.cuisines
            .iter()
            .filter(|r| facts.eval(&r.when))
            .flat_map(|r| r.cuisines.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use taxograph_spec::{PathStep, Provenance};

    use super::*;

    fn ham() -> CanonicalTpt {
        CanonicalTpt {
            id: "tx:a:sus:scrofa|part:muscle|abc".into(),
            taxon_id: "tx:a:sus:scrofa".into(),
            part_id: "part:muscle".into(),
            family: "cured".into(),
            name: "Ham".into(),
            synonyms: Vec::new(),
            notes: None,
            identity: vec![
                PathStep::new("tf:cure")
                    .with_param("nitrite_ppm", json!("high"))
                    .with_param("days", json!(90)),
                PathStep::new("tf:smoke"),
            ],
            identity_hash: String::new(),
            path: Vec::new(),
            provenance: Provenance::Seed,
        }
    }

    fn cond(v: serde_json::Value) -> Condition {
        Condition::parse(&v).expect("condition")
    }

    #[test]
    fn combinators_and_predicates() {
        let tpt = ham();
        let facts = IdentityFacts::new(&tpt);
        assert!(facts.eval(&cond(json!({"allOf": [
            {"has_transform": "tf:cure"},
            {"has_part": "part:muscle"},
            {"taxon_prefix": "tx:a"}
        ]}))));
        assert!(facts.eval(&cond(json!({"noneOf": [{"has_part": "part:milk"}]}))));
        assert!(!facts.eval(&cond(json!({"anyOf": []}))));
        assert!(facts.eval(&cond(json!({"allOf": []}))));
    }

    #[test]
    fn param_operators_see_bucketed_values() {
        let tpt = ham();
        let facts = IdentityFacts::new(&tpt);
        let p = |op: &str, value: serde_json::Value| {
            facts.eval(&cond(json!({"param": {
                "transform": "tf:cure", "key": "days", "op": op, "value": value
            }})))
        };
        assert!(p("gt", json!(30)));
        assert!(p("gte", json!(90.0)));
        assert!(!p("lt", json!(90)));
        assert!(p("eq", json!(90)));
        assert!(p("ne", json!(91)));
        assert!(p("in", json!([30, 90])));
        assert!(p("not_in", json!([30])));
        assert!(facts.eval(&cond(json!({"param": {
            "transform": "tf:cure", "key": "nitrite_ppm", "op": "in", "value": ["high"]
        }}))));
        assert!(!facts.eval(&cond(json!({"param": {
            "transform": "tf:cure", "key": "salt", "op": "exists"
        }}))));
        assert!(!facts.eval(&cond(json!({"param": {
            "transform": "tf:cure", "key": "salt", "op": "ne", "value": "x"
        }}))));
    }

    #[test]
    fn evaluator_emits_flags_and_cuisines() {
        let flags: Vec<FlagRuleRecord> = serde_json::from_value(json!([
            {"flag": "contains_nitrite", "type": "safety",
             "when": {"param": {"transform": "tf:cure", "key": "nitrite_ppm", "op": "exists"}}},
            {"flag": "vegan", "when": {"noneOf": [{"taxon_prefix": "tx:a"}]}},
            {"flag": "broken", "when": {"oneOf": []}}
        ]))
        .expect("flags");
        let cuisines: Vec<CuisineRuleRecord> = serde_json::from_value(json!([
            {"cuisines": ["italian", "spanish"], "when": {"has_transform": "tf:cure"}}
        ]))
        .expect("cuisines");
        let mut log = LintLog::new();
        let eval = RuleEvaluator::new(&flags, &cuisines, &mut log);
        let tpt = ham();
        let got: Vec<(String, String)> = eval.flags(&tpt).into_iter().collect();
        assert_eq!(
            got,
            vec![("safety".to_owned(), "contains_nitrite".to_owned())]
        );
        assert_eq!(eval.cuisines(&tpt).len(), 2);
        assert_eq!(log.count("bad_condition"), 1);
    }

    #[test]
    fn repeated_transform_matches_any_occurrence() {
        let mut tpt = ham();
        tpt.identity = vec![
            PathStep::new("cook").with_param("method", json!("boil")),
            PathStep::new("cook").with_param("method", json!("fry")),
        ];
        let facts = IdentityFacts::new(&tpt);
        let method = |value: &str| {
            facts.eval(&cond(json!({"param": {
                "transform": "cook", "key": "method", "op": "eq", "value": value
            }})))
        };
        assert!(method("boil"));
        assert!(method("fry"));
        assert!(!method("bake"));
        assert!(facts.eval(&cond(json!({"has_transform": "cook"}))));
    }
}

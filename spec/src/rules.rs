//! Rule records: read-only configuration consumed by the engines.
//!
//! Rule files live under `rules/` in the ontology directory. Each one is
//! either JSONL (one record per line) or a JSON array; see
//! [`crate::io::read_rule_file`].

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ids, io};

/// File stems of the rule files under `rules/`.
pub mod stem {
    /// Taxon-prefix part applicability.
    pub const PARTS_APPLICABILITY: &str = "parts_applicability";
    /// Implied-part naming collapse.
    pub const IMPLIED_PARTS: &str = "implied_parts";
    /// Transform applicability scopes.
    pub const TRANSFORM_APPLICABILITY: &str = "transform_applicability";
    /// Family templates.
    pub const FAMILY_EXPANSIONS: &str = "family_expansions";
    /// Families allowed to expand.
    pub const FAMILY_ALLOWLIST: &str = "family_allowlist";
    /// Numeric parameter buckets (JSON map).
    pub const PARAM_BUCKETS: &str = "param_buckets";
    /// Diet and safety flags.
    pub const DIET_SAFETY_RULES: &str = "diet_safety_rules";
    /// Cuisine tags.
    pub const CUISINE_MAP: &str = "cuisine_map";
    /// Taxon+Part names.
    pub const NAME_OVERRIDES: &str = "name_overrides";
    /// Taxon+Part search synonyms.
    pub const TAXON_PART_SYNONYMS: &str = "taxon_part_synonyms";
    /// Kingdom/rank allow-deny policy (JSON map).
    pub const TAXON_PART_POLICY: &str = "taxon_part_policy";
}

/// A taxon-prefix scope with an optional part filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixScope {
    /// Segment-aware taxon id prefix.
    pub taxon_prefix: String,
    /// Restricts the scope to these parts; `None` means any part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<String>>,
}

impl PrefixScope {
    /// Returns true if `taxon_id` falls under this scope's prefix.
    #[must_use]
    pub fn matches_taxon(&self, taxon_id: &str) -> bool {
        ids::matches_prefix(taxon_id, &self.taxon_prefix)
    }

    /// Returns true if `part_id` passes this scope's part filter.
    #[must_use]
    pub fn allows_part(&self, part_id: &str) -> bool {
        match &self.parts {
            Some(parts) => parts.iter().any(|p| p == part_id),
            None => true,
        }
    }
}

/// `rules/parts_applicability`: which taxa carry a part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicabilityRule {
    /// Part emitted by this rule unless a scope lists its own parts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<String>,
    /// Prefix scopes.
    pub applies_to: Vec<PrefixScope>,
    /// Exact taxon ids excluded from this rule.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl ApplicabilityRule {
    /// Returns the parts this rule emits for `scope`.
    #[must_use]
    pub fn parts_for<'a>(&'a self, scope: &'a PrefixScope) -> Vec<&'a str> {
        match (&scope.parts, &self.part) {
            (Some(parts), _) => parts.iter().map(String::as_str).collect(),
            (None, Some(part)) => vec![part.as_str()],
            (None, None) => Vec::new(),
        }
    }
}

/// `rules/transform_applicability`: which (taxon, part) a transform may touch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformApplicability {
    /// Transform id.
    pub transform: String,
    /// Prefix scopes.
    pub applies_to: Vec<PrefixScope>,
    /// Exact taxon ids excluded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

/// One step of a family template path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyStep {
    /// Transform id.
    #[serde(alias = "transform_id")]
    pub id: String,
    /// Parameter values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
    /// Step may be absent when resolving a curated path's family.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

/// `rules/family_expansions`: a declarative TPT family template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyRule {
    /// Family id.
    pub family: String,
    /// Prefix scopes.
    pub applies_to: Vec<PrefixScope>,
    /// Transform path emitted verbatim for every matching substrate.
    pub path: Vec<FamilyStep>,
    /// Human label used in `family_meta` and generated names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Name template with `{taxon}` and `{part}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// `rules/family_allowlist`: a bare family id or `{family}` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowlistEntry {
    /// Bare id.
    Id(String),
    /// Record form.
    Record {
        /// Family id.
        family: String,
    },
}

impl AllowlistEntry {
    /// Returns the family id.
    #[must_use]
    pub fn family(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Record { family } => family,
        }
    }
}

/// `rules/implied_parts`: a part that a taxon implicitly *is* when eaten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpliedPartRule {
    /// Part id.
    pub part: String,
    /// Taxon prefixes the implication holds for (empty = all).
    #[serde(default, alias = "applies_to", skip_serializing_if = "Vec::is_empty")]
    pub taxon_prefixes: Vec<String>,
    /// Ranks the implication holds for (empty = all).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranks: Vec<String>,
}

impl ImpliedPartRule {
    /// Returns true if the rule covers (`taxon_id`, `rank`, `part_id`).
    #[must_use]
    pub fn covers(&self, taxon_id: &str, rank: &str, part_id: &str) -> bool {
        self.part == part_id
            && (self.taxon_prefixes.is_empty()
                || self
                    .taxon_prefixes
                    .iter()
                    .any(|p| ids::matches_prefix(taxon_id, p)))
            && (self.ranks.is_empty() || self.ranks.iter().any(|r| r == rank))
    }
}

/// `rules/name_overrides`: explicit Taxon+Part naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameOverride {
    /// Taxon prefix; the longest matching prefix wins.
    #[serde(alias = "taxon_id")]
    pub taxon_prefix: String,
    /// Part id.
    pub part_id: String,
    /// Name.
    pub name: String,
    /// Optional display name (defaults to `name`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// `rules/taxon_part_synonyms`: extra search terms for one Taxon+Part node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TpSynonyms {
    /// Taxon id.
    pub taxon_id: String,
    /// Part id.
    pub part_id: String,
    /// Synonyms.
    pub synonyms: Vec<String>,
}

/// One entry of `rules/param_buckets.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSpec {
    /// Ordered cut points.
    pub cuts: Vec<f64>,
    /// Labels; one more than cuts.
    pub labels: Vec<String>,
}

/// `rules/param_buckets.json`: bucket specs keyed by `"{transform_id}.{param_key}"`.
pub type BucketTable = BTreeMap<String, BucketSpec>;

/// Builds the bucket table key for a transform parameter.
#[must_use]
pub fn bucket_key(transform_id: &str, param_key: &str) -> String {
    format!("{transform_id}.{param_key}")
}

/// `rules/diet_safety_rules`: a categorical flag emitted when `when` holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagRuleRecord {
    /// Flag value (`vegan`, `contains_nitrite`).
    pub flag: String,
    /// Flag category (`diet`, `safety`).
    #[serde(default = "default_flag_type", rename = "type", alias = "flag_type")]
    pub flag_type: String,
    /// Condition tree; parsed into [`crate::Condition`].
    pub when: Value,
}

fn default_flag_type() -> String {
    "diet".to_owned()
}

/// `rules/cuisine_map`: cuisine tags emitted when `when` holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuisineRuleRecord {
    /// Single cuisine tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuisine: Option<String>,
    /// Several cuisine tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cuisines: Vec<String>,
    /// Condition tree; parsed into [`crate::Condition`].
    pub when: Value,
}

impl CuisineRuleRecord {
    /// Returns every cuisine tag of this rule.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        self.cuisine
            .iter()
            .chain(self.cuisines.iter())
            .map(String::as_str)
            .collect()
    }
}

/// One entry of `rules/taxon_part_policy.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyEntry {
    /// Parts force-accepted for matching taxa.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<String>,
    /// Parts rejected for matching taxa; deny wins over allow.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<String>,
}

/// `rules/taxon_part_policy.json`: entries keyed by `"{kingdom}:{rank}"`
/// where rank may be `*`.
pub type PartPolicy = BTreeMap<String, PolicyEntry>;

/// A documentation row from `docs/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonDoc {
    /// Taxon id.
    pub taxon_id: String,
    /// Language tag.
    #[serde(default = "default_lang")]
    pub lang: String,
    /// One-line summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Markdown body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_md: Option<String>,
}

fn default_lang() -> String {
    "en".to_owned()
}

/// Every rule file of an ontology, loaded at once.
#[derive(Debug, Clone, Default)]
pub struct RuleBook {
    /// `parts_applicability`
    pub parts_applicability: Vec<ApplicabilityRule>,
    /// `implied_parts`
    pub implied_parts: Vec<ImpliedPartRule>,
    /// `transform_applicability`
    pub transform_applicability: Vec<TransformApplicability>,
    /// `family_expansions`
    pub family_expansions: Vec<FamilyRule>,
    /// `family_allowlist`
    pub family_allowlist: Vec<AllowlistEntry>,
    /// `param_buckets.json`
    pub param_buckets: BucketTable,
    /// `diet_safety_rules`
    pub diet_safety_rules: Vec<FlagRuleRecord>,
    /// `cuisine_map`
    pub cuisine_map: Vec<CuisineRuleRecord>,
    /// `name_overrides`
    pub name_overrides: Vec<NameOverride>,
    /// `taxon_part_synonyms`
    pub taxon_part_synonyms: Vec<TpSynonyms>,
    /// `taxon_part_policy.json`
    pub taxon_part_policy: PartPolicy,
}

impl RuleBook {
    /// Loads every rule file under `rules_dir`. Absent files are empty.
    ///
    /// # Errors
    ///
    /// Returns an error if a present rule file cannot be read or parsed.
    pub fn load(rules_dir: &Path) -> Result<Self> {
        Ok(Self {
            parts_applicability: io::read_rule_file(rules_dir, stem::PARTS_APPLICABILITY)?,
            implied_parts: io::read_rule_file(rules_dir, stem::IMPLIED_PARTS)?,
            transform_applicability: io::read_rule_file(rules_dir, stem::TRANSFORM_APPLICABILITY)?,
            family_expansions: io::read_rule_file(rules_dir, stem::FAMILY_EXPANSIONS)?,
            family_allowlist: io::read_rule_file(rules_dir, stem::FAMILY_ALLOWLIST)?,
            param_buckets: io::read_rule_map(rules_dir, stem::PARAM_BUCKETS)?,
            diet_safety_rules: io::read_rule_file(rules_dir, stem::DIET_SAFETY_RULES)?,
            cuisine_map: io::read_rule_file(rules_dir, stem::CUISINE_MAP)?,
            name_overrides: io::read_rule_file(rules_dir, stem::NAME_OVERRIDES)?,
            taxon_part_synonyms: io::read_rule_file(rules_dir, stem::TAXON_PART_SYNONYMS)?,
            taxon_part_policy: io::read_rule_map(rules_dir, stem::TAXON_PART_POLICY)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn scope_part_filter() {
        let scope = PrefixScope {
            taxon_prefix: "tx:p:malus".into(),
            parts: Some(vec!["part:fruit".into()]),
        };
        assert!(scope.matches_taxon("tx:p:malus:domestica"));
        assert!(scope.allows_part("part:fruit"));
        assert!(!scope.allows_part("part:leaf"));
    }

    #[test]
    fn applicability_parts_prefer_scope_list() {
        let rule: ApplicabilityRule = serde_json::from_value(json!({
            "part": "part:fruit",
            "applies_to": [
                {"taxon_prefix": "tx:p:malus"},
                {"taxon_prefix": "tx:p:prunus", "parts": ["part:fruit", "part:seed"]}
            ]
        }))
        .expect("rule parses");
        assert_eq!(rule.parts_for(&rule.applies_to[0]), vec!["part:fruit"]);
        assert_eq!(
            rule.parts_for(&rule.applies_to[1]),
            vec!["part:fruit", "part:seed"]
        );
    }

    #[test]
    fn allowlist_accepts_both_forms() {
        let bare: AllowlistEntry = serde_json::from_value(json!("cured")).expect("bare");
        let rec: AllowlistEntry =
            serde_json::from_value(json!({"family": "dried"})).expect("record");
        assert_eq!(bare.family(), "cured");
        assert_eq!(rec.family(), "dried");
    }

    #[test]
    fn implied_part_coverage() {
        let rule = ImpliedPartRule {
            part: "part:fruit".into(),
            taxon_prefixes: vec!["tx:p".into()],
            ranks: vec!["species".into()],
        };
        assert!(rule.covers("tx:p:malus:domestica", "species", "part:fruit"));
        assert!(!rule.covers("tx:p:malus", "genus", "part:fruit"));
        assert!(!rule.covers("tx:a:bos:taurus", "species", "part:fruit"));
    }

    #[test]
    fn cuisine_tags_merge_single_and_list() {
        let rule: CuisineRuleRecord = serde_json::from_value(json!({
            "cuisine": "italian",
            "cuisines": ["spanish"],
            "when": {"has_transform": "tf:cure"}
        }))
        .expect("cuisine parses");
        assert_eq!(rule.tags(), vec!["italian", "spanish"]);
    }

    #[test]
    fn rule_book_loads_present_files_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("param_buckets.json"),
            r#"{"tf:cure.nitrite_ppm": {"cuts": [0, 120], "labels": ["none", "low", "high"]}}"#,
        )
        .expect("write buckets");
        std::fs::write(dir.path().join("family_allowlist.jsonl"), "\"cured\"\n")
            .expect("write allowlist");
        let book = RuleBook::load(dir.path()).expect("rules load");
        assert_eq!(book.family_allowlist.len(), 1);
        assert_eq!(book.param_buckets["tf:cure.nitrite_ppm"].labels.len(), 3);
        assert!(book.family_expansions.is_empty());
        assert!(book.taxon_part_policy.is_empty());
    }
}

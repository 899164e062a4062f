//! Family expansion and curated seed normalization.
//!
//! A family rule is a declarative TPT template: for every substrate edge
//! inside one of the rule's scopes, emit one generated candidate carrying
//! the rule's path verbatim. An allow-list gates which families expand.
//! Curated seeds from `tpts/` go through the same reference checks and are
//! stamped with seed provenance.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use taxograph_spec::rules::{AllowlistEntry, FamilyRule};
use taxograph_spec::{
    Part, PathStep, Provenance, SubstrateEdge, Taxon, TptCandidate, TransformRegistry,
};

use crate::canon::signature;
use crate::lint::LintLog;

/// Name template used when a family rule has none.
pub const DEFAULT_NAME_TEMPLATE: &str = "{taxon} {part}, {label}";

const SOURCE: &str = "families";

/// Counters reported by the families stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyStats {
    /// Family rules read.
    pub rules: usize,
    /// Rules skipped by the allow-list.
    pub not_allowed: usize,
    /// Candidates generated.
    pub generated: usize,
    /// Structurally identical candidates collapsed.
    pub duplicates: usize,
    /// Generated candidates dropped for an inapplicable transform.
    pub inapplicable: usize,
    /// Path steps naming an unknown transform (kept; canon drops them).
    pub unknown_transforms: usize,
    /// Curated seeds kept.
    pub seeds: usize,
    /// Curated seeds dropped for an unknown taxon or part.
    pub seeds_dropped: usize,
    /// Curated seeds using a transform outside its applicability.
    pub seeds_inapplicable: usize,
}

/// Display-name lookup for taxa and parts.
#[derive(Debug, Clone, Default)]
pub struct NameBook<'a> {
    taxa: BTreeMap<&'a str, &'a str>,
    parts: BTreeMap<&'a str, &'a str>,
}

impl<'a> NameBook<'a> {
    /// Indexes taxon display names and part names.
    #[must_use]
    pub fn new(taxa: &'a [Taxon], parts: &'a [Part]) -> Self {
        Self {
            taxa: taxa
                .iter()
                .map(|t| (t.id.as_str(), t.display_name.as_str()))
                .collect(),
            parts: parts.iter().map(|p| (p.id.as_str(), p.name.as_str())).collect(),
        }
    }

    /// Returns true if `id` is a known taxon.
    #[must_use]
    pub fn has_taxon(&self, id: &str) -> bool {
        self.taxa.contains_key(id)
    }

    /// Returns true if `id` is a known part.
    #[must_use]
    pub fn has_part(&self, id: &str) -> bool {
        self.parts.contains_key(id)
    }

    /// Fills a name template.
    #[must_use]
    pub fn render(&self, template: &str, taxon_id: &str, part_id: &str, label: &str) -> String {
        let taxon = self.taxa.get(taxon_id).copied().unwrap_or(taxon_id);
        let part = self.parts.get(part_id).copied().unwrap_or(part_id);
        template
            .replace("{taxon}", taxon)
            .replace("{part}", part)
            .replace("{label}", label)
    }
}

/// Returns the families allowed to expand, or `None` when every family is.
#[must_use]
pub fn allowed_families(allowlist: &[AllowlistEntry]) -> Option<BTreeSet<&str>> {
    if allowlist.is_empty() {
        return None;
    }
    Some(allowlist.iter().map(AllowlistEntry::family).collect())
}

fn rule_path(rule: &FamilyRule) -> Vec<PathStep> {
    rule.path
        .iter()
        .map(|s| PathStep {
            id: s.id.clone(),
            params: s.params.clone(),
        })
        .collect()
}

/// Inputs of family expansion.
#[derive(Debug, Clone, Copy)]
pub struct FamilyInputs<'a> {
    /// Surviving substrate edges.
    pub edges: &'a [SubstrateEdge],
    /// Family templates.
    pub rules: &'a [FamilyRule],
    /// `rules/family_allowlist`.
    pub allowlist: &'a [AllowlistEntry],
    /// Normalized transforms and applicability.
    pub registry: &'a TransformRegistry,
    /// Display names.
    pub names: &'a NameBook<'a>,
}

/// Expands family templates against the substrate edges.
#[must_use]
pub fn expand_families(
    inputs: FamilyInputs<'_>,
    log: &mut LintLog,
    stats: &mut FamilyStats,
) -> Vec<TptCandidate> {
    let allowed = allowed_families(inputs.allowlist);
    let mut seen: BTreeSet<(String, String, String, String)> = BTreeSet::new();
    let mut out = Vec::new();
    stats.rules += inputs.rules.len();

    for rule in inputs.rules {
        if allowed.as_ref().is_some_and(|a| !a.contains(rule.family.as_str())) {
            stats.not_allowed += 1;
            tracing::debug!(family = %rule.family, "family not allow-listed");
            continue;
        }
        let path = rule_path(rule);
        let unknown: Vec<&str> = path
            .iter()
            .filter(|s| !inputs.registry.contains(&s.id))
            .map(|s| s.id.as_str())
            .collect();
        if !unknown.is_empty() {
            log.warn(
                SOURCE,
                "unknown_transform",
                format!(
                    "family `{}` uses unknown transform(s) {}",
                    rule.family,
                    unknown.join(", ")
                ),
            );
        }
        let encoding = signature::path_encoding(&path);
        let label = rule.label.as_deref().unwrap_or(&rule.family);
        let template = rule.name.as_deref().unwrap_or(DEFAULT_NAME_TEMPLATE);

        for scope in &rule.applies_to {
            for edge in inputs
                .edges
                .iter()
                .filter(|e| scope.matches_taxon(&e.taxon_id) && scope.allows_part(&e.part_id))
            {
                let key = (
                    edge.taxon_id.clone(),
                    edge.part_id.clone(),
                    rule.family.clone(),
                    encoding.clone(),
                );
                if seen.contains(&key) {
                    stats.duplicates += 1;
                    continue;
                }
                let blocked = path.iter().find(|s| {
                    inputs.registry.contains(&s.id)
                        && !inputs
                            .registry
                            .is_applicable(&s.id, &edge.taxon_id, &edge.part_id)
                });
                if let Some(step) = blocked {
                    stats.inapplicable += 1;
                    tracing::debug!(
                        family = %rule.family,
                        tp = %edge.tp_id(),
                        transform = %step.id,
                        "transform not applicable"
                    );
                    continue;
                }
                stats.unknown_transforms += unknown.len();
                seen.insert(key);
                let mut candidate = TptCandidate::new(
                    edge.taxon_id.clone(),
                    edge.part_id.clone(),
                    path.clone(),
                    Provenance::Generated,
                );
                candidate.family = Some(rule.family.clone());
                candidate.name = Some(inputs.names.render(
                    template,
                    &edge.taxon_id,
                    &edge.part_id,
                    label,
                ));
                candidate.notes = rule.notes.clone();
                out.push(candidate);
            }
        }
    }
    stats.generated = out.len();
    tracing::info!(
        generated = stats.generated,
        duplicates = stats.duplicates,
        inapplicable = stats.inapplicable,
        "families expanded"
    );
    out
}

/// Validates curated seeds: drops unknown taxa/parts, warns on transforms
/// outside their applicability, stamps seed provenance and fills missing names.
#[must_use]
pub fn normalize_seeds(
    seeds: Vec<TptCandidate>,
    registry: &TransformRegistry,
    names: &NameBook<'_>,
    log: &mut LintLog,
    stats: &mut FamilyStats,
) -> Vec<TptCandidate> {
    let mut out = Vec::with_capacity(seeds.len());
    for mut seed in seeds {
        let tp = format!("{}|{}", seed.taxon_id, seed.part_id);
        if !names.has_taxon(&seed.taxon_id) || !names.has_part(&seed.part_id) {
            stats.seeds_dropped += 1;
            log.error(
                "tpts",
                "unknown_reference",
                format!("{tp}: unknown taxon or part; seed dropped"),
            );
            continue;
        }
        for step in &seed.path {
            if !registry.contains(&step.id) {
                log.warn(
                    "tpts",
                    "unknown_transform",
                    format!("{tp}: unknown transform `{}`", step.id),
                );
            } else if !registry.is_applicable(&step.id, &seed.taxon_id, &seed.part_id) {
                stats.seeds_inapplicable += 1;
                log.warn(
                    "tpts",
                    "inapplicable_transform",
                    format!("{tp}: `{}` is outside its applicability", step.id),
                );
            }
        }
        seed.provenance = Provenance::Seed;
        if seed.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            let label = seed.family.clone().unwrap_or_else(|| "curated".to_owned());
            seed.name = Some(if seed.path.is_empty() {
                names.render("{taxon} {part}", &seed.taxon_id, &seed.part_id, "")
            } else {
                names.render(DEFAULT_NAME_TEMPLATE, &seed.taxon_id, &seed.part_id, &label)
            });
        }
        out.push(seed);
    }
    stats.seeds = out.len();
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use taxograph_spec::registry::TransformsCanon;

    use super::*;

    fn registry() -> TransformRegistry {
        serde_json::from_value::<TransformsCanon>(json!({
            "transforms": [
                {"id": "tf:cure", "name": "Cure", "order": 30, "identity": true},
                {"id": "tf:smoke", "name": "Smoke", "order": 40, "identity": true}
            ],
            "applicability": [
                {"transform": "tf:cure", "applies_to": [{"taxon_prefix": "tx:a", "parts": ["part:muscle"]}]}
            ]
        }))
        .map(TransformRegistry::from_canon)
        .expect("registry")
    }

    fn edges() -> Vec<SubstrateEdge> {
        vec![
            SubstrateEdge::new("tx:a:sus:scrofa", "part:muscle"),
            SubstrateEdge::new("tx:a:sus:scrofa", "part:fat"),
            SubstrateEdge::new("tx:p:malus:domestica", "part:fruit"),
        ]
    }

    fn rules() -> Vec<FamilyRule> {
        serde_json::from_value(json!([
            {"family": "cured", "label": "cured",
             "applies_to": [{"taxon_prefix": "tx:a"}, {"taxon_prefix": "tx:a:sus"}],
             "path": [{"id": "tf:cure"}]},
            {"family": "smoked", "name": "smoked {taxon} {part}",
             "applies_to": [{"taxon_prefix": "tx:a:sus", "parts": ["part:fat"]}],
             "path": [{"id": "tf:smoke"}, {"id": "tf:glaze"}]}
        ]))
        .expect("rules")
    }

    fn taxa_and_parts() -> (Vec<Taxon>, Vec<Part>) {
        let taxa = serde_json::from_value(json!([
            {"id": "tx:a:sus:scrofa", "rank": "species", "display_name": "Pig", "latin_name": "Sus scrofa"},
            {"id": "tx:p:malus:domestica", "rank": "species", "display_name": "Apple", "latin_name": "Malus domestica"}
        ]))
        .expect("taxa");
        let parts = serde_json::from_value(json!([
            {"id": "part:muscle", "name": "meat", "kind": "animal"},
            {"id": "part:fat", "name": "fat", "kind": "animal"},
            {"id": "part:fruit", "name": "fruit", "kind": "plant"}
        ]))
        .expect("parts");
        (taxa, parts)
    }

    #[test]
    fn expansion_dedups_filters_and_names() {
        let (taxa, parts) = taxa_and_parts();
        let names = NameBook::new(&taxa, &parts);
        let registry = registry();
        let edges = edges();
        let rules = rules();
        let mut log = LintLog::new();
        let mut stats = FamilyStats::default();
        let out = expand_families(
            FamilyInputs {
                edges: &edges,
                rules: &rules,
                allowlist: &[],
                registry: &registry,
                names: &names,
            },
            &mut log,
            &mut stats,
        );
        let got: Vec<(String, String)> = out
            .iter()
            .map(|c| (c.tp_id(), c.name.clone().unwrap_or_default()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("tx:a:sus:scrofa|part:muscle".to_owned(), "Pig meat, cured".to_owned()),
                ("tx:a:sus:scrofa|part:fat".to_owned(), "smoked Pig fat".to_owned()),
            ]
        );
        // second scope re-matches muscle; fat is outside tf:cure applicability twice
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.inapplicable, 2);
        assert_eq!(stats.unknown_transforms, 1);
        assert_eq!(log.count("unknown_transform"), 1);
        assert!(out.iter().all(|c| c.provenance == Provenance::Generated));
    }

    #[test]
    fn allowlist_gates_families() {
        let (taxa, parts) = taxa_and_parts();
        let names = NameBook::new(&taxa, &parts);
        let registry = registry();
        let edges = edges();
        let rules = rules();
        let allow = vec![AllowlistEntry::Id("smoked".into())];
        let mut stats = FamilyStats::default();
        let out = expand_families(
            FamilyInputs {
                edges: &edges,
                rules: &rules,
                allowlist: &allow,
                registry: &registry,
                names: &names,
            },
            &mut LintLog::new(),
            &mut stats,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(stats.not_allowed, 1);
        assert_eq!(out[0].family.as_deref(), Some("smoked"));
    }

    #[test]
    fn seeds_are_checked_and_named() {
        let (taxa, parts) = taxa_and_parts();
        let names = NameBook::new(&taxa, &parts);
        let registry = registry();
        let seeds: Vec<TptCandidate> = serde_json::from_value(json!([
            {"taxon_id": "tx:p:malus:domestica", "part_id": "part:fruit"},
            {"taxon_id": "tx:p:malus:domestica", "part_id": "part:fruit", "path": [{"id": "tf:cure"}],
             "name": "Cured apple"},
            {"taxon_id": "tx:p:pyrus", "part_id": "part:fruit"}
        ]))
        .expect("seeds");
        let mut log = LintLog::new();
        let mut stats = FamilyStats::default();
        let out = normalize_seeds(seeds, &registry, &names, &mut log, &mut stats);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name.as_deref(), Some("Apple fruit"));
        assert_eq!(out[1].name.as_deref(), Some("Cured apple"));
        assert_eq!(stats.seeds_dropped, 1);
        assert_eq!(stats.seeds_inapplicable, 1);
        assert_eq!(log.count("inapplicable_transform"), 1);
    }
}

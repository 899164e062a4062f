//! Substrate rule engine.
//!
//! Expands part applicability into (taxon, part) edges, applies the
//! kingdom/rank policy table, lets accepted part promotions inherit their
//! parent part's edges, and prunes every edge that a descendant taxon
//! already carries. Animal species and subspecies keep their edges so that
//! breed-level siblings can coexist.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use taxograph_spec::rules::{ApplicabilityRule, PartPolicy, PolicyEntry};
use taxograph_spec::{
    ids, Kingdom, Part, PartKind, SubstrateEdge, Taxon, TpIndexRow, TransformRegistry,
};

use crate::forest::{Forest, ForestError};
use crate::lint::LintLog;

/// Transforms accepted in a promotion's proto-path even when not tagged
/// `part_changing`.
pub const DEFAULT_PART_CHANGING_FALLBACK: &[&str] = &["tf:mill", "tf:press", "tf:skim", "tf:churn"];

const PRUNE_EXEMPT_RANKS: &[&str] = &["species", "subspecies"];

/// Returns true if `taxon` keeps its edges even when a descendant also
/// carries the part (animal species and subspecies).
#[must_use]
pub fn is_prune_exempt(taxon: &Taxon) -> bool {
    taxon.kingdom() == Some(Kingdom::Animal) && PRUNE_EXEMPT_RANKS.contains(&taxon.rank.as_str())
}

const SOURCE: &str = "substrates";

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstrateConfig {
    /// Transforms accepted in promotions regardless of class.
    pub part_changing_fallback: Vec<String>,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            part_changing_fallback: DEFAULT_PART_CHANGING_FALLBACK
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }
}

/// Counters reported by the substrates stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstrateStats {
    /// Edges produced by part lists and applicability rules.
    pub expanded: usize,
    /// Edges added by policy `allow`.
    pub policy_allowed: usize,
    /// Edges removed by policy `deny`.
    pub policy_denied: usize,
    /// Edges inherited by accepted promotions.
    pub inherited: usize,
    /// Edges dropped because a descendant carries the same part.
    pub pruned: usize,
    /// Edges kept by the animal species/subspecies exception.
    pub prune_exempt: usize,
    /// Edges dropped because the part belongs to another kingdom.
    pub kind_mismatch: usize,
    /// Rule references to unknown parts.
    pub unknown_parts: usize,
    /// Accepted promotions.
    pub promotions_accepted: usize,
    /// Rejected promotions.
    pub promotions_rejected: usize,
    /// Ids of rejected promotions.
    pub rejected_promotions: Vec<String>,
    /// Final edge count.
    pub edges: usize,
}

/// Output of the substrates stage.
#[derive(Debug, Clone, Default)]
pub struct SubstrateOutput {
    /// Surviving edges, sorted.
    pub edges: Vec<SubstrateEdge>,
    /// One index row per edge.
    pub tp_index: Vec<TpIndexRow>,
    /// Counters.
    pub stats: SubstrateStats,
}

/// Returns why `part`'s promotion is invalid, or `None` if it is accepted.
#[must_use]
pub fn promotion_violation(
    part: &Part,
    registry: &TransformRegistry,
    fallback: &[String],
) -> Option<String> {
    part.proto_path.iter().find_map(|step| {
        let allowed = registry
            .get(&step.id)
            .is_some_and(|tf| tf.is_part_changing())
            || fallback.iter().any(|f| f == &step.id);
        (!allowed).then(|| format!("`{}` is not a part-changing transform", step.id))
    })
}

struct Engine<'a> {
    taxa: &'a [Taxon],
    forest: Forest,
    parts: BTreeMap<&'a str, &'a Part>,
    edges: BTreeSet<(usize, String)>,
}

impl<'a> Engine<'a> {
    fn new(taxa: &'a [Taxon], parts: &'a [Part]) -> Result<Self, ForestError> {
        Ok(Self {
            taxa,
            forest: Forest::build(taxa.iter().map(|t| (t.id.as_str(), t.parent_id())))?,
            parts: parts.iter().map(|p| (p.id.as_str(), p)).collect(),
            edges: BTreeSet::new(),
        })
    }

    /// Taxa matching a segment-aware prefix.
    fn matching(&self, prefix: &str) -> Vec<usize> {
        let prefix = ids::normalize_prefix(prefix);
        match self.forest.index_of(prefix) {
            Some(idx) => std::iter::once(idx)
                .chain(self.forest.descendants(idx))
                .collect(),
            None => (0..self.taxa.len())
                .filter(|&i| ids::matches_prefix(&self.taxa[i].id, prefix))
                .collect(),
        }
    }

    fn known_part(
        &self,
        part: &str,
        origin: &str,
        stats: &mut SubstrateStats,
        log: &mut LintLog,
    ) -> bool {
        if self.parts.contains_key(part) {
            return true;
        }
        stats.unknown_parts += 1;
        log.warn(
            SOURCE,
            "unknown_part",
            format!("{origin}: unknown part `{part}`"),
        );
        false
    }

    fn expand_part_lists(&mut self, stats: &mut SubstrateStats) {
        let mut added = Vec::new();
        for part in self.parts.values() {
            for prefix in part.applies_to.iter().flatten() {
                added.extend(
                    self.matching(prefix)
                        .into_iter()
                        .map(|t| (t, part.id.clone())),
                );
            }
        }
        for edge in added {
            if self.edges.insert(edge) {
                stats.expanded += 1;
            }
        }
    }

    fn expand_rules(
        &mut self,
        rules: &[ApplicabilityRule],
        stats: &mut SubstrateStats,
        log: &mut LintLog,
    ) {
        for (i, rule) in rules.iter().enumerate() {
            let origin = format!("parts_applicability #{}", i + 1);
            for scope in &rule.applies_to {
                let parts: Vec<&str> = rule
                    .parts_for(scope)
                    .into_iter()
                    .filter(|p| self.known_part(p, &origin, stats, log))
                    .collect();
                for taxon in self.matching(&scope.taxon_prefix) {
                    if rule.exclude.iter().any(|x| x == &self.taxa[taxon].id) {
                        continue;
                    }
                    for part in &parts {
                        if self.edges.insert((taxon, (*part).to_owned())) {
                            stats.expanded += 1;
                        }
                    }
                }
            }
        }
    }

    fn policy_for(&self, policy: &'a PartPolicy, taxon: usize) -> Vec<&'a PolicyEntry> {
        let taxon = &self.taxa[taxon];
        let Some(kingdom) = taxon.kingdom() else {
            return Vec::new();
        };
        [
            format!("{}:{}", kingdom.as_str(), taxon.rank),
            format!("{}:*", kingdom.as_str()),
        ]
        .iter()
        .filter_map(|key| policy.get(key))
        .collect()
    }

    fn apply_allow(
        &mut self,
        policy: &'a PartPolicy,
        stats: &mut SubstrateStats,
        log: &mut LintLog,
    ) {
        for taxon in 0..self.taxa.len() {
            for entry in self.policy_for(policy, taxon) {
                for part in &entry.allow {
                    if !self.known_part(part, "taxon_part_policy", stats, log) {
                        continue;
                    }
                    if self.edges.insert((taxon, part.clone())) {
                        stats.policy_allowed += 1;
                    }
                }
            }
        }
    }

    fn apply_deny(&mut self, policy: &'a PartPolicy, stats: &mut SubstrateStats) {
        for taxon in 0..self.taxa.len() {
            for entry in self.policy_for(policy, taxon) {
                for part in &entry.deny {
                    if self.edges.remove(&(taxon, part.clone())) {
                        stats.policy_denied += 1;
                    }
                }
            }
        }
    }

    fn promote(
        &mut self,
        registry: &TransformRegistry,
        config: &SubstrateConfig,
        stats: &mut SubstrateStats,
        log: &mut LintLog,
    ) {
        let mut accepted: Vec<(String, String)> = Vec::new();
        for part in self.parts.values().filter(|p| p.is_promotion()) {
            match promotion_violation(part, registry, &config.part_changing_fallback) {
                None => {
                    stats.promotions_accepted += 1;
                    if let Some(parent) = &part.parent_id {
                        accepted.push((part.id.clone(), parent.clone()));
                    }
                }
                Some(reason) => {
                    stats.promotions_rejected += 1;
                    stats.rejected_promotions.push(part.id.clone());
                    log.error(
                        SOURCE,
                        "rejected_promotion",
                        format!("{}: {reason}", part.id),
                    );
                    self.edges.retain(|(_, p)| p != &part.id);
                }
            }
        }
        // Chained promotions (grain -> flour -> dough) need a fixed point.
        loop {
            let mut added = Vec::new();
            for (promoted, parent) in &accepted {
                added.extend(
                    self.edges
                        .iter()
                        .filter(|(_, p)| p == parent)
                        .map(|(t, _)| (*t, promoted.clone())),
                );
            }
            let before = self.edges.len();
            self.edges.extend(added);
            let grown = self.edges.len() - before;
            if grown == 0 {
                break;
            }
            stats.inherited += grown;
        }
    }

    fn drop_kind_mismatches(&mut self, stats: &mut SubstrateStats) {
        let before = self.edges.len();
        let taxa = self.taxa;
        let parts = &self.parts;
        self.edges.retain(|(t, p)| {
            let Some(kingdom) = taxa[*t].kingdom() else {
                // no edge survives on the root
                return false;
            };
            match parts.get(p.as_str()).map(|part| part.kind) {
                Some(PartKind::Derived) | None => true,
                Some(PartKind::Plant) => kingdom == Kingdom::Plant,
                Some(PartKind::Fungus) => kingdom == Kingdom::Fungus,
                Some(PartKind::Animal) => kingdom == Kingdom::Animal,
            }
        });
        stats.kind_mismatch += before - self.edges.len();
    }

    fn prune(&mut self, stats: &mut SubstrateStats) {
        let mut by_part: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (t, p) in &self.edges {
            by_part.entry(p.as_str()).or_default().push(*t);
        }
        let mut covered: BTreeSet<(usize, String)> = BTreeSet::new();
        for (part, taxa) in by_part {
            for taxon in taxa {
                for ancestor in self.forest.ancestors(taxon) {
                    if !covered.insert((ancestor, part.to_owned())) {
                        break;
                    }
                }
            }
        }
        let taxa = self.taxa;
        let mut pruned = 0;
        let mut exempt = 0;
        self.edges.retain(|edge| {
            if !covered.contains(edge) {
                return true;
            }
            if is_prune_exempt(&taxa[edge.0]) {
                exempt += 1;
                return true;
            }
            pruned += 1;
            false
        });
        stats.pruned += pruned;
        stats.prune_exempt += exempt;
    }

    fn finish(self, mut stats: SubstrateStats) -> SubstrateOutput {
        let mut rows: Vec<(SubstrateEdge, TpIndexRow)> = Vec::with_capacity(self.edges.len());
        for (t, part) in self.edges {
            let taxon = &self.taxa[t];
            let Some(kingdom) = taxon.kingdom() else {
                continue;
            };
            let edge = SubstrateEdge::new(taxon.id.clone(), part);
            let row = TpIndexRow {
                id: edge.tp_id(),
                taxon_id: edge.taxon_id.clone(),
                part_id: edge.part_id.clone(),
                kingdom,
                rank: taxon.rank.clone(),
            };
            rows.push((edge, row));
        }
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        let (edges, tp_index): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
        stats.edges = edges.len();
        SubstrateOutput {
            edges,
            tp_index,
            stats,
        }
    }
}

/// Inputs of the substrate engine.
#[derive(Debug, Clone, Copy)]
pub struct SubstrateInputs<'a> {
    /// Compiled taxa.
    pub taxa: &'a [Taxon],
    /// Compiled parts.
    pub parts: &'a [Part],
    /// `rules/parts_applicability`.
    pub rules: &'a [ApplicabilityRule],
    /// `rules/taxon_part_policy.json`.
    pub policy: &'a PartPolicy,
    /// Normalized transforms.
    pub registry: &'a TransformRegistry,
}

/// Builds the pruned substrate edge set.
///
/// # Errors
///
/// Returns an error if the taxa are not parent-closed; the taxonomy stage
/// guarantees they are.
pub fn build_substrates(
    inputs: SubstrateInputs<'_>,
    config: &SubstrateConfig,
    log: &mut LintLog,
) -> Result<SubstrateOutput, ForestError> {
    let mut stats = SubstrateStats::default();
    let mut engine = Engine::new(inputs.taxa, inputs.parts)?;
    engine.expand_part_lists(&mut stats);
    engine.expand_rules(inputs.rules, &mut stats, log);
    engine.apply_allow(inputs.policy, &mut stats, log);
    engine.promote(inputs.registry, config, &mut stats, log);
    engine.apply_deny(inputs.policy, &mut stats);
    engine.drop_kind_mismatches(&mut stats);
    engine.prune(&mut stats);
    let out = engine.finish(stats);
    tracing::info!(
        edges = out.stats.edges,
        pruned = out.stats.pruned,
        rejected_promotions = out.stats.promotions_rejected,
        "substrates built"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use taxograph_spec::registry::TransformsCanon;

    use super::*;

    fn taxa() -> Vec<Taxon> {
        let rows = [
            ("tx", "root"),
            ("tx:p", "kingdom"),
            ("tx:p:malus", "genus"),
            ("tx:p:malus:domestica", "species"),
            ("tx:p:malus:domestica:fuji", "cultivar"),
            ("tx:a", "kingdom"),
            ("tx:a:bos", "genus"),
            ("tx:a:bos:taurus", "species"),
            ("tx:a:bos:taurus:angus", "breed"),
        ];
        rows.iter()
            .map(|(id, rank)| Taxon {
                id: (*id).into(),
                rank: (*rank).into(),
                display_name: ids::last_segment(id).into(),
                latin_name: ids::last_segment(id).into(),
                synonyms: Vec::new(),
                xref: None,
            })
            .collect()
    }

    fn parts() -> Vec<Part> {
        serde_json::from_value(json!([
            {"id": "part:fruit", "name": "fruit", "kind": "plant"},
            {"id": "part:muscle", "name": "muscle", "kind": "animal"},
            {"id": "part:milk", "name": "milk", "kind": "animal"},
            {"id": "part:cream", "name": "cream", "kind": "derived", "parent_id": "part:milk",
             "proto_path": [{"id": "tf:skim"}]},
            {"id": "part:butter", "name": "butter", "kind": "derived", "parent_id": "part:cream",
             "proto_path": [{"id": "tf:churn"}]},
            {"id": "part:juice", "name": "juice", "kind": "derived", "parent_id": "part:fruit",
             "proto_path": [{"id": "tf:cook"}]}
        ]))
        .expect("parts")
    }

    fn registry() -> TransformRegistry {
        TransformRegistry::from_canon(TransformsCanon {
            transforms: serde_json::from_value(json!([
                {"id": "tf:cook", "name": "Cook", "order": 10, "class": "cooking"}
            ]))
            .expect("transforms"),
            applicability: Vec::new(),
        })
    }

    fn run(rules: serde_json::Value, policy: serde_json::Value) -> (SubstrateOutput, LintLog) {
        let taxa = taxa();
        let parts = parts();
        let rules: Vec<ApplicabilityRule> = serde_json::from_value(rules).expect("rules");
        let policy: PartPolicy = serde_json::from_value(policy).expect("policy");
        let registry = registry();
        let mut log = LintLog::new();
        let out = build_substrates(
            SubstrateInputs {
                taxa: &taxa,
                parts: &parts,
                rules: &rules,
                policy: &policy,
                registry: &registry,
            },
            &SubstrateConfig::default(),
            &mut log,
        )
        .expect("substrates");
        (out, log)
    }

    fn pairs(out: &SubstrateOutput) -> Vec<String> {
        out.edges.iter().map(SubstrateEdge::tp_id).collect()
    }

    #[test]
    fn plant_edges_prune_to_leaf() {
        let (out, _) = run(
            json!([{"part": "part:fruit", "applies_to": [{"taxon_prefix": "tx:p:malus"}]}]),
            json!({}),
        );
        assert_eq!(pairs(&out), vec!["tx:p:malus:domestica:fuji|part:fruit"]);
        assert_eq!(out.stats.pruned, 2);
    }

    #[test]
    fn animal_species_survive_pruning() {
        let (out, _) = run(
            json!([{"part": "part:muscle", "applies_to": [{"taxon_prefix": "tx:a:bos"}]}]),
            json!({}),
        );
        assert_eq!(
            pairs(&out),
            vec!["tx:a:bos:taurus|part:muscle", "tx:a:bos:taurus:angus|part:muscle"]
        );
        assert_eq!(out.stats.prune_exempt, 1);
        assert_eq!(out.tp_index[0].kingdom, Kingdom::Animal);
    }

    #[test]
    fn exclusions_deny_and_kingdom_checks() {
        let (out, log) = run(
            json!([
                {"part": "part:fruit", "applies_to": [{"taxon_prefix": "tx"}],
                 "exclude": ["tx:p:malus:domestica:fuji"]},
                {"applies_to": [{"taxon_prefix": "tx:p", "parts": ["part:ghost"]}]}
            ]),
            json!({"plant:genus": {"deny": ["part:fruit"]}}),
        );
        // fuji excluded, genus denied, animal edges dropped as kind mismatch
        assert_eq!(pairs(&out), vec!["tx:p:malus:domestica|part:fruit"]);
        assert_eq!(out.stats.policy_denied, 1);
        assert!(out.stats.kind_mismatch >= 4);
        assert_eq!(log.count("unknown_part"), 1);
    }

    #[test]
    fn promotions_inherit_or_are_rejected() {
        let (out, log) = run(
            json!([
                {"part": "part:milk", "applies_to": [{"taxon_prefix": "tx:a:bos:taurus"}]},
                {"part": "part:fruit", "applies_to": [{"taxon_prefix": "tx:p:malus:domestica:fuji"}]}
            ]),
            json!({}),
        );
        let got = pairs(&out);
        assert!(got.contains(&"tx:a:bos:taurus|part:cream".to_owned()));
        assert!(got.contains(&"tx:a:bos:taurus|part:butter".to_owned()));
        assert!(!got.iter().any(|p| p.ends_with("part:juice")));
        assert_eq!(out.stats.rejected_promotions, vec!["part:juice"]);
        assert_eq!(out.stats.promotions_accepted, 2);
        assert_eq!(log.count("rejected_promotion"), 1);
    }

    #[test]
    fn policy_allow_adds_edges() {
        let (out, _) = run(json!([]), json!({"animal:breed": {"allow": ["part:muscle"]}}));
        assert_eq!(pairs(&out), vec!["tx:a:bos:taurus:angus|part:muscle"]);
        assert_eq!(out.stats.policy_allowed, 1);
    }
}

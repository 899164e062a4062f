//! Canonicalization and identity engine.
//!
//! Merges curated seeds and generated candidates into one deduplicated set
//! of content-addressed TPT nodes. Per candidate:
//!
//! 1. drop steps whose transform is unknown (counted) or not identity-bearing
//! 2. sort by (transform order, transform id, canonical params)
//! 3. project params onto the transform's `identity_param` keys
//! 4. bucket numeric values through `rules/param_buckets.json`
//! 5. hash `{taxon_id, part_id, steps}` into the id suffix
//!
//! Candidates sharing an id collapse to one node. A curated record always
//! supplies the surviving metadata, regardless of input order.

pub mod buckets;
pub mod family_match;
pub mod signature;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use taxograph_spec::rules::{BucketTable, FamilyRule};
use taxograph_spec::serializer::canonical;
use taxograph_spec::{CanonicalTpt, PathStep, Provenance, TptCandidate, TransformRegistry};

pub use buckets::Bucketer;
pub use family_match::FamilyMatcher;
pub use signature::{Signature, RAW_SUFFIX};

use crate::lint::LintLog;

/// Family tag of a TPT whose family could not be resolved.
pub const UNKNOWN_FAMILY: &str = "unknown";

const SOURCE: &str = "canon";

/// Counters reported by the canon stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonStats {
    /// Curated candidates read.
    pub seeds: usize,
    /// Generated candidates read.
    pub generated: usize,
    /// Canonical TPTs written.
    pub canonical: usize,
    /// Candidates merged into an existing id.
    pub collisions: usize,
    /// Ids where a curated record displaced generated metadata.
    pub seed_overrides: usize,
    /// Steps dropped because their transform is unknown.
    pub unknown_transforms_dropped: usize,
    /// Steps left out of the signature as non-identity.
    pub non_identity_steps: usize,
    /// Parameter values replaced by a bucket label.
    pub bucketed_values: usize,
    /// Curated TPTs whose family came from template matching.
    pub families_matched: usize,
    /// TPTs tagged `unknown`.
    pub families_unknown: usize,
}

/// One candidate after its identity has been computed.
#[derive(Debug, Clone)]
struct Resolved {
    candidate: TptCandidate,
    identity: Vec<PathStep>,
    signature: Signature,
    known_path: Vec<PathStep>,
}

/// Per-build canonicalization engine.
pub struct Canonicalizer<'a> {
    registry: &'a TransformRegistry,
    bucketer: Bucketer,
    matcher: FamilyMatcher,
    width: usize,
}

impl<'a> Canonicalizer<'a> {
    /// Builds the engine. Invalid bucket specs are logged and skipped.
    #[must_use]
    pub fn new(
        registry: &'a TransformRegistry,
        buckets: &BucketTable,
        families: &[FamilyRule],
        width: usize,
        log: &mut LintLog,
    ) -> Self {
        Self {
            registry,
            bucketer: Bucketer::new(buckets, log),
            matcher: FamilyMatcher::new(families, registry),
            width,
        }
    }

    /// Returns the canonical identity steps of `path`.
    #[must_use]
    pub fn identity_steps(&self, path: &[PathStep]) -> Vec<PathStep> {
        let mut stats = CanonStats::default();
        self.identity_steps_counted(path, &mut stats)
    }

    fn identity_steps_counted(&self, path: &[PathStep], stats: &mut CanonStats) -> Vec<PathStep> {
        let mut keyed: Vec<(i64, String, PathStep)> = Vec::with_capacity(path.len());
        for step in path {
            let Some(tf) = self.registry.get(&step.id) else {
                stats.unknown_transforms_dropped += 1;
                continue;
            };
            if !tf.identity {
                stats.non_identity_steps += 1;
                continue;
            }
            let mut params = BTreeMap::new();
            for (key, value) in &step.params {
                if !tf.param(key).is_some_and(|p| p.identity_param) {
                    continue;
                }
                let value = match self.bucketer.apply(&tf.id, key, value) {
                    Some(label) => {
                        stats.bucketed_values += 1;
                        label
                    }
                    None => value.clone(),
                };
                params.insert(key.clone(), value);
            }
            let projected = PathStep {
                id: tf.id.clone(),
                params,
            };
            let params_key = canonical::encode(&Value::Object(
                projected
                    .params
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ));
            keyed.push((tf.order, params_key, projected));
        }
        keyed.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.2.id.cmp(&b.2.id))
                .then_with(|| a.1.cmp(&b.1))
        });
        keyed.into_iter().map(|(_, _, step)| step).collect()
    }

    /// Computes the final id of (`taxon_id`, `part_id`, `path`).
    #[must_use]
    pub fn tpt_id(&self, taxon_id: &str, part_id: &str, path: &[PathStep]) -> String {
        let identity = self.identity_steps(path);
        Signature::compute(taxon_id, part_id, &identity, self.width).tpt_id(taxon_id, part_id)
    }

    fn resolve(&self, candidate: TptCandidate, stats: &mut CanonStats) -> Resolved {
        let identity = self.identity_steps_counted(&candidate.path, stats);
        let signature = Signature::compute(
            &candidate.taxon_id,
            &candidate.part_id,
            &identity,
            self.width,
        );
        let known_path = candidate
            .path
            .iter()
            .filter(|s| self.registry.contains(&s.id))
            .cloned()
            .collect();
        Resolved {
            candidate,
            identity,
            signature,
            known_path,
        }
    }

    /// Merges seeds and generated candidates into canonical TPTs sorted by id.
    #[must_use]
    pub fn canonicalize(
        &self,
        seeds: Vec<TptCandidate>,
        generated: Vec<TptCandidate>,
        log: &mut LintLog,
    ) -> (Vec<CanonicalTpt>, CanonStats) {
        let mut stats = CanonStats {
            seeds: seeds.len(),
            generated: generated.len(),
            ..CanonStats::default()
        };
        let mut groups: BTreeMap<String, Vec<Resolved>> = BTreeMap::new();
        for candidate in seeds.into_iter().chain(generated) {
            let dropped_before = stats.unknown_transforms_dropped;
            let resolved = self.resolve(candidate, &mut stats);
            if stats.unknown_transforms_dropped > dropped_before {
                log.warn(
                    SOURCE,
                    "unknown_transform",
                    format!(
                        "{}|{}: {} unknown transform step(s) dropped",
                        resolved.candidate.taxon_id,
                        resolved.candidate.part_id,
                        stats.unknown_transforms_dropped - dropped_before
                    ),
                );
            }
            let id = resolved
                .signature
                .tpt_id(&resolved.candidate.taxon_id, &resolved.candidate.part_id);
            groups.entry(id).or_default().push(resolved);
        }

        let mut out = Vec::with_capacity(groups.len());
        for (id, group) in groups {
            stats.collisions += group.len().saturating_sub(1);
            out.extend(self.merge(id, group, &mut stats));
        }
        stats.canonical = out.len();
        tracing::info!(
            canonical = stats.canonical,
            collisions = stats.collisions,
            seed_overrides = stats.seed_overrides,
            "canonicalized TPT candidates"
        );
        (out, stats)
    }

    fn merge(
        &self,
        id: String,
        group: Vec<Resolved>,
        stats: &mut CanonStats,
    ) -> Option<CanonicalTpt> {
        let (seeds, generated): (Vec<Resolved>, Vec<Resolved>) = group
            .into_iter()
            .partition(|r| r.candidate.provenance == Provenance::Seed);
        if !seeds.is_empty() && !generated.is_empty() {
            stats.seed_overrides += 1;
        }
        let generated_family = generated
            .iter()
            .filter_map(|r| r.candidate.family.clone())
            .min();

        let winner = if seeds.is_empty() {
            generated.into_iter().min_by(|a, b| {
                a.candidate
                    .family
                    .cmp(&b.candidate.family)
                    .then_with(|| a.candidate.name.cmp(&b.candidate.name))
            })
        } else {
            seeds.into_iter().min_by(|a, b| {
                a.candidate
                    .name
                    .cmp(&b.candidate.name)
                    .then_with(|| {
                        signature::path_encoding(&a.candidate.path)
                            .cmp(&signature::path_encoding(&b.candidate.path))
                    })
            })
        };
        let winner = winner?;

        let family = match (winner.candidate.family.clone(), generated_family) {
            (Some(family), _) | (None, Some(family)) => family,
            (None, None) => match self.matcher.resolve(
                &winner.candidate.taxon_id,
                &winner.candidate.part_id,
                &winner.identity,
            ) {
                Some(family) => {
                    stats.families_matched += 1;
                    family.to_owned()
                }
                None => {
                    stats.families_unknown += 1;
                    UNKNOWN_FAMILY.to_owned()
                }
            },
        };

        let Resolved {
            candidate,
            identity,
            signature,
            known_path,
        } = winner;
        Some(CanonicalTpt {
            name: candidate.name.unwrap_or_else(|| id.clone()),
            id,
            taxon_id: candidate.taxon_id,
            part_id: candidate.part_id,
            family,
            synonyms: candidate.synonyms,
            notes: candidate.notes,
            identity,
            identity_hash: signature.hash,
            path: known_path,
            provenance: candidate.provenance,
        })
    }
}

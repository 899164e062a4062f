//! Taxon+Part node naming.
//!
//! Precedence, first match wins:
//!
//! 1. the `name_overrides` rule with the longest matching taxon prefix for
//!    the part;
//! 2. implied-part collapse: when the part is the taxon's only implied part
//!    (an apple's fruit), the node is named after the taxon itself;
//! 3. `"{taxon display name} {part name}"`.

use std::collections::{BTreeMap, HashMap};

use taxograph_spec::ids;
use taxograph_spec::rules::{ImpliedPartRule, NameOverride};
use taxograph_spec::{Part, Taxon};

/// Which rule produced a TP name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSource {
    /// An explicit override rule.
    Override,
    /// Sole implied part collapsed onto the taxon name.
    Implied,
    /// Synthesized from taxon and part names.
    Default,
}

impl NameSource {
    /// Returns the value stored in `taxon_part_nodes.name_source`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::Implied => "implied",
            Self::Default => "default",
        }
    }
}

/// A resolved TP name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpName {
    /// Name.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Rule that produced it.
    pub source: NameSource,
}

/// Resolves names for a fixed set of TP nodes.
#[derive(Debug)]
pub struct TpNamer<'a> {
    taxa: HashMap<&'a str, &'a Taxon>,
    parts: HashMap<&'a str, &'a Part>,
    overrides: &'a [NameOverride],
    sole_implied: HashMap<&'a str, &'a str>,
}

impl<'a> TpNamer<'a> {
    /// Prepares a namer for the `(taxon, part)` pairs in `tps`.
    #[must_use]
    pub fn new(
        taxa: &'a [Taxon],
        parts: &'a [Part],
        overrides: &'a [NameOverride],
        implied: &[ImpliedPartRule],
        tps: &[(&'a str, &'a str)],
    ) -> Self {
        let taxa: HashMap<&str, &Taxon> = taxa.iter().map(|t| (t.id.as_str(), t)).collect();
        let mut implied_by_taxon: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for &(taxon_id, part_id) in tps {
            let Some(taxon) = taxa.get(taxon_id) else {
                continue;
            };
            if implied.iter().any(|r| r.covers(taxon_id, &taxon.rank, part_id)) {
                let entry = implied_by_taxon.entry(taxon_id).or_default();
                if !entry.contains(&part_id) {
                    entry.push(part_id);
                }
            }
        }
        let sole_implied = implied_by_taxon
            .into_iter()
            .filter_map(|(taxon, parts)| match parts.as_slice() {
                [part] => Some((taxon, *part)),
                _ => None,
            })
            .collect();
        Self {
            taxa,
            parts: parts.iter().map(|p| (p.id.as_str(), p)).collect(),
            overrides,
            sole_implied,
        }
    }

    /// Returns the name of one TP node.
    #[must_use]
    pub fn name(&self, taxon_id: &str, part_id: &str) -> TpName {
        if let Some(rule) = self.best_override(taxon_id, part_id) {
            return TpName {
                name: rule.name.clone(),
                display_name: rule.display_name.clone().unwrap_or_else(|| rule.name.clone()),
                source: NameSource::Override,
            };
        }
        let taxon_name = self
            .taxa
            .get(taxon_id)
            .map_or_else(
                || ids::last_segment(taxon_id).replace('_', " "),
                |t| t.display_name.clone(),
            );
        if self.sole_implied.get(taxon_id).is_some_and(|p| *p == part_id) {
            return TpName {
                name: taxon_name.clone(),
                display_name: taxon_name,
                source: NameSource::Implied,
            };
        }
        let part_name = self
            .parts
            .get(part_id)
            .map_or_else(
                || part_id.trim_start_matches("part:").replace('_', " "),
                |p| p.name.clone(),
            );
        let name = format!("{taxon_name} {part_name}");
        TpName {
            display_name: name.clone(),
            name,
            source: NameSource::Default,
        }
    }

    fn best_override(&self, taxon_id: &str, part_id: &str) -> Option<&'a NameOverride> {
        let mut best: Option<&NameOverride> = None;
        for rule in self.overrides {
            if rule.part_id != part_id || !ids::matches_prefix(taxon_id, &rule.taxon_prefix) {
                continue;
            }
            let len = ids::normalize_prefix(&rule.taxon_prefix).len();
            let better = match best {
                Some(b) => len > ids::normalize_prefix(&b.taxon_prefix).len(),
                None => true,
            };
            if better {
                best = Some(rule);
            }
        }
        best
    }
}

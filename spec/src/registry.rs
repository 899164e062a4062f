//! The immutable transform registry.
//!
//! Built once per build from `tmp/transforms_canon.json` and passed by
//! reference into every stage that needs transform metadata.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::io;
use crate::model::Transform;
use crate::rules::TransformApplicability;

/// Contents of `tmp/transforms_canon.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformsCanon {
    /// Normalized transform definitions, sorted by id.
    pub transforms: Vec<Transform>,
    /// Normalized applicability rules.
    #[serde(default)]
    pub applicability: Vec<TransformApplicability>,
}

/// Read-only index over normalized transforms and their applicability.
#[derive(Debug, Clone, Default)]
pub struct TransformRegistry {
    transforms: BTreeMap<String, Transform>,
    applicability: BTreeMap<String, Vec<TransformApplicability>>,
}

impl TransformRegistry {
    /// Indexes a normalized transform set.
    #[must_use]
    pub fn from_canon(canon: TransformsCanon) -> Self {
        let transforms = canon
            .transforms
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        let mut applicability: BTreeMap<String, Vec<TransformApplicability>> = BTreeMap::new();
        for rule in canon.applicability {
            applicability
                .entry(rule.transform.clone())
                .or_default()
                .push(rule);
        }
        Self {
            transforms,
            applicability,
        }
    }

    /// Loads `tmp/transforms_canon.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let canon: TransformsCanon = io::read_json(path)?;
        Ok(Self::from_canon(canon))
    }

    /// Looks up a transform by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Transform> {
        self.transforms.get(id)
    }

    /// Returns true if `id` is a known transform.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.transforms.contains_key(id)
    }

    /// Iterates transforms in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Transform> {
        self.transforms.values()
    }

    /// Returns the number of transforms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Returns true if the registry holds no transforms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Returns true if `transform_id` may be applied to (`taxon_id`, `part_id`).
    /// A transform without applicability rules applies everywhere.
    #[must_use]
    pub fn is_applicable(&self, transform_id: &str, taxon_id: &str, part_id: &str) -> bool {
        let Some(rules) = self.applicability.get(transform_id) else {
            return true;
        };
        rules.iter().any(|rule| {
            !rule.exclude.iter().any(|t| t == taxon_id)
                && rule
                    .applies_to
                    .iter()
                    .any(|scope| scope.matches_taxon(taxon_id) && scope.allows_part(part_id))
        })
    }
}

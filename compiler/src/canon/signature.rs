//! Content-addressed TPT signatures.
//!
//! The signature of a TPT is the canonical encoding of
//! `{"part_id", "steps": [{"id", "params"}], "taxon_id"}` over its identity
//! steps. Its SHA-256 prefix becomes the id suffix; an empty identity path
//! uses the [`RAW_SUFFIX`] sentinel instead.

use serde_json::{json, Map, Value};
use taxograph_spec::serializer::canonical;
use taxograph_spec::{ids, PathStep};

/// Suffix of a TPT with no identity steps.
pub const RAW_SUFFIX: &str = "raw";

/// Default number of hex characters kept from the digest.
pub const DEFAULT_WIDTH: usize = 12;

/// Narrowest accepted suffix width.
pub const MIN_WIDTH: usize = 8;

/// Full SHA-256 hex length.
pub const MAX_WIDTH: usize = 64;

/// A computed signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Canonical encoding that was hashed.
    pub encoding: String,
    /// Full SHA-256 hex digest.
    pub hash: String,
    /// Id suffix (`raw` or a digest prefix).
    pub suffix: String,
}

impl Signature {
    /// Computes the signature of (`taxon_id`, `part_id`, `steps`).
    /// `steps` must already be canonical (filtered, ordered, projected, bucketed).
    #[must_use]
    pub fn compute(taxon_id: &str, part_id: &str, steps: &[PathStep], width: usize) -> Self {
        let encoding = canonical::encode(&json!({
            "taxon_id": taxon_id,
            "part_id": part_id,
            "steps": steps.iter().map(step_value).collect::<Vec<_>>(),
        }));
        let hash = canonical::sha256_hex(encoding.as_bytes());
        let suffix = if steps.is_empty() {
            RAW_SUFFIX.to_owned()
        } else {
            hash[..width.clamp(MIN_WIDTH, MAX_WIDTH)].to_owned()
        };
        Self {
            encoding,
            hash,
            suffix,
        }
    }

    /// Returns the final `taxon|part|suffix` id.
    #[must_use]
    pub fn tpt_id(&self, taxon_id: &str, part_id: &str) -> String {
        ids::tpt_id(taxon_id, part_id, &self.suffix)
    }
}

/// Returns the `{id, params}` value of a step, always carrying `params`.
#[must_use]
pub fn step_value(step: &PathStep) -> Value {
    let params: Map<String, Value> = step
        .params
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    json!({ "id": step.id, "params": params })
}

/// Canonical encoding of a whole path, used as a dedup key.
#[must_use]
pub fn path_encoding(steps: &[PathStep]) -> String {
    canonical::encode(&Value::Array(steps.iter().map(step_value).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_identity_is_raw() {
        let sig = Signature::compute("tx:p:malus:domestica", "part:fruit", &[], DEFAULT_WIDTH);
        assert_eq!(sig.suffix, "raw");
        assert_eq!(
            sig.tpt_id("tx:p:malus:domestica", "part:fruit"),
            "tx:p:malus:domestica|part:fruit|raw"
        );
        assert_eq!(
            sig.encoding,
            r#"{"part_id":"part:fruit","steps":[],"taxon_id":"tx:p:malus:domestica"}"#
        );
    }

    #[test]
    fn suffix_is_digest_prefix() {
        let steps = vec![PathStep::new("tf:cure").with_param("nitrite_ppm", json!("high"))];
        let sig = Signature::compute("tx:a:sus:scrofa", "part:muscle", &steps, DEFAULT_WIDTH);
        assert_eq!(sig.suffix.len(), DEFAULT_WIDTH);
        assert!(sig.hash.starts_with(&sig.suffix));
        assert!(sig.encoding.contains(r#"{"id":"tf:cure","params":{"nitrite_ppm":"high"}}"#));
        let narrow = Signature::compute("tx:a:sus:scrofa", "part:muscle", &steps, 2);
        assert_eq!(narrow.suffix.len(), MIN_WIDTH);
    }
}

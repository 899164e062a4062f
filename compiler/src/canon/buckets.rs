//! Numeric parameter bucketing.
//!
//! A bucket spec maps a number to the first label whose cut it does not
//! exceed, else to the last label. Specs are linted before use; a bad spec
//! is reported and skipped, and values under it pass through unchanged.

use std::collections::BTreeMap;

use serde_json::Value;
use taxograph_spec::rules::{BucketSpec, BucketTable};

use crate::lint::LintLog;

/// Lint source name for bucket issues.
pub const SOURCE: &str = "rules/param_buckets";

/// Checks that cuts are finite and non-decreasing and that there is exactly
/// one more label than cuts.
///
/// # Errors
///
/// Returns a description of the first problem found.
pub fn validate(spec: &BucketSpec) -> Result<(), String> {
    if spec.labels.len() != spec.cuts.len() + 1 {
        return Err(format!(
            "{} label(s) for {} cut(s); expected {}",
            spec.labels.len(),
            spec.cuts.len(),
            spec.cuts.len() + 1
        ));
    }
    if let Some(bad) = spec.cuts.iter().find(|c| !c.is_finite()) {
        return Err(format!("cut {bad} is not a finite number"));
    }
    if let Some(w) = spec.cuts.windows(2).find(|w| w[1] < w[0]) {
        return Err(format!("cuts decrease ({} then {})", w[0], w[1]));
    }
    if spec.labels.iter().any(|l| l.trim().is_empty()) {
        return Err("empty label".into());
    }
    Ok(())
}

/// Returns the label for `value` under a valid `spec`.
#[must_use]
pub fn label_for(spec: &BucketSpec, value: f64) -> &str {
    let idx = spec
        .cuts
        .iter()
        .position(|&cut| value <= cut)
        .unwrap_or(spec.cuts.len());
    spec.labels.get(idx).map_or("", String::as_str)
}

/// The validated bucket table.
#[derive(Debug, Clone, Default)]
pub struct Bucketer {
    specs: BTreeMap<String, BucketSpec>,
}

impl Bucketer {
    /// Keeps the valid specs of `table`; invalid ones are logged as `bad_bucket`.
    #[must_use]
    pub fn new(table: &BucketTable, log: &mut LintLog) -> Self {
        let mut specs = BTreeMap::new();
        for (key, spec) in table {
            match validate(spec) {
                Ok(()) => {
                    specs.insert(key.clone(), spec.clone());
                }
                Err(reason) => log.error(SOURCE, "bad_bucket", format!("{key}: {reason}")),
            }
        }
        Self { specs }
    }

    /// Returns the number of usable specs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns true if no spec is usable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Buckets `value` if it is numeric and a spec exists for the key.
    /// Returns `None` when the value is left unchanged.
    #[must_use]
    pub fn apply(&self, transform_id: &str, param_key: &str, value: &Value) -> Option<Value> {
        let number = value.as_f64()?;
        let spec = self
            .specs
            .get(&taxograph_spec::rules::bucket_key(transform_id, param_key))?;
        Some(Value::String(label_for(spec, number).to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn spec(cuts: &[f64], labels: &[&str]) -> BucketSpec {
        BucketSpec {
            cuts: cuts.to_vec(),
            labels: labels.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    #[test]
    fn labels_follow_cut_points() {
        let s = spec(&[0.0, 120.0], &["none", "low", "high"]);
        assert!(validate(&s).is_ok());
        assert_eq!(label_for(&s, -5.0), "none");
        assert_eq!(label_for(&s, 0.0), "none");
        assert_eq!(label_for(&s, 50.0), "low");
        assert_eq!(label_for(&s, 120.0), "low");
        assert_eq!(label_for(&s, 121.0), "high");
    }

    #[test]
    fn bad_specs_are_reported_and_skipped() {
        let mut table = BucketTable::new();
        table.insert(
            "tf:cure.nitrite_ppm".into(),
            spec(&[0.0, 120.0], &["none", "low", "high"]),
        );
        table.insert(
            "tf:smoke.hours".into(),
            spec(&[10.0, 2.0], &["a", "b", "c"]),
        );
        table.insert("tf:dry.aw".into(), spec(&[0.5], &["dry"]));
        let mut log = LintLog::new();
        let bucketer = Bucketer::new(&table, &mut log);
        assert_eq!(bucketer.len(), 1);
        assert_eq!(log.count("bad_bucket"), 2);
        assert_eq!(
            bucketer.apply("tf:cure", "nitrite_ppm", &json!(140)),
            Some(json!("high"))
        );
        assert_eq!(bucketer.apply("tf:smoke", "hours", &json!(4)), None);
        assert_eq!(bucketer.apply("tf:cure", "nitrite_ppm", &json!("high")), None);
    }
}

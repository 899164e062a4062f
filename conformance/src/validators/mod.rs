//! Per-stage artifact validators.
//!
//! Each validator reads only the artifacts its stage wrote (plus upstream
//! artifacts it needs as reference) and never mutates them. An artifact that
//! is missing or unparseable is a failed check, not an I/O error.

pub mod canon;
pub mod families;
pub mod pack;
pub mod substrates;
pub mod taxonomy;
pub mod transforms;

use std::collections::HashSet;
use std::hash::Hash;
use std::path::Path;

use serde::de::DeserializeOwned;
use taxograph_spec::io;

use crate::report::{ConformanceReport, TestResult};

/// Reads a JSONL artifact, recording a failure if it is missing or malformed.
pub(crate) fn load_jsonl<T: DeserializeOwned>(
    report: &mut ConformanceReport,
    validator: &str,
    build: &Path,
    rel: &str,
) -> Option<Vec<T>> {
    let path = build.join(rel);
    if !path.exists() {
        report.push(TestResult::fail(validator, format!("{rel} not found")));
        return None;
    }
    match io::read_jsonl(&path) {
        Ok(rows) => Some(rows),
        Err(e) => {
            report.push(TestResult::fail(validator, format!("{rel} is malformed: {e:#}")));
            None
        }
    }
}

/// Reads a JSON artifact, recording a failure if it is missing or malformed.
pub(crate) fn load_json<T: DeserializeOwned>(
    report: &mut ConformanceReport,
    validator: &str,
    build: &Path,
    rel: &str,
) -> Option<T> {
    let path = build.join(rel);
    if !path.exists() {
        report.push(TestResult::fail(validator, format!("{rel} not found")));
        return None;
    }
    match io::read_json(&path) {
        Ok(value) => Some(value),
        Err(e) => {
            report.push(TestResult::fail(validator, format!("{rel} is malformed: {e:#}")));
            None
        }
    }
}

/// Returns one problem per repeated key.
pub(crate) fn duplicates<K, I>(keys: I, what: &str) -> Vec<String>
where
    K: Eq + Hash + std::fmt::Display,
    I: IntoIterator<Item = K>,
{
    let mut seen = HashSet::new();
    keys.into_iter()
        .filter_map(|k| {
            let msg = format!("duplicate {what} {k}");
            (!seen.insert(k)).then_some(msg)
        })
        .collect()
}

/// Returns one problem per adjacent pair out of order.
pub(crate) fn unsorted<K: Ord + std::fmt::Debug>(keys: &[K], what: &str) -> Vec<String> {
    keys.windows(2)
        .filter(|w| w[0] > w[1])
        .map(|w| format!("{what} out of order: {:?} before {:?}", w[0], w[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_and_order_helpers() {
        assert_eq!(
            duplicates(["a", "b", "a"], "id"),
            vec!["duplicate id a".to_owned()]
        );
        assert!(unsorted(&[1, 2, 2, 3], "n").is_empty());
        assert_eq!(unsorted(&[2, 1], "n").len(), 1);
    }
}

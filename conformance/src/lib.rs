//! Taxograph build verification.
//!
//! Each pipeline stage has a validator that re-reads the artifacts the stage
//! wrote and checks the structural promises downstream stages rely on:
//!
//! | Stage | Checks |
//! |-------|--------|
//! | `taxonomy` | unique ids, single root, parent closure, kingdom ranks, ordering, part hierarchy |
//! | `transforms` | prefixed sorted ids, parameter schemas, applicability references, lint totals |
//! | `substrates` | edge references, leaf pruning, TP index agreement |
//! | `families` | candidate uniqueness, substrate membership, transform applicability, seed names |
//! | `canon` | id and hash re-derivation, identity idempotence, suffix width |
//! | `pack` | foreign keys, closure counts, search coverage, meta counts, FTS lookup |
//!
//! # Entry Point
//!
//! ```no_run
//! use std::path::PathBuf;
//! use taxograph_conformance::{run_all, VerifyPaths};
//!
//! let paths = VerifyPaths {
//!     ontology: PathBuf::from("ontology"),
//!     build: PathBuf::from("build"),
//! };
//! let report = run_all(&paths).expect("Failed to run verification");
//! assert!(report.all_passed());
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]

pub mod report;
pub mod validators;

use std::path::PathBuf;

pub use report::{ConformanceReport, Severity, TestResult};

/// Directories a validator may read.
#[derive(Debug, Clone)]
pub struct VerifyPaths {
    /// Ontology source directory.
    pub ontology: PathBuf,
    /// Build directory holding stage artifacts.
    pub build: PathBuf,
}

/// Signature shared by every stage validator.
pub type Validator = fn(&VerifyPaths) -> anyhow::Result<ConformanceReport>;

/// Every validator, in stage order.
pub const VALIDATORS: &[(&str, Validator)] = &[
    ("taxonomy", validators::taxonomy::validate),
    ("transforms", validators::transforms::validate),
    ("substrates", validators::substrates::validate),
    ("families", validators::families::validate),
    ("canon", validators::canon::validate),
    ("pack", validators::pack::validate),
];

/// Returns the validator of `stage`, if it has one.
#[must_use]
pub fn validator_for(stage: &str) -> Option<Validator> {
    VALIDATORS
        .iter()
        .find(|(id, _)| *id == stage)
        .map(|(_, v)| *v)
}

/// Runs every stage validator and returns the aggregated report.
///
/// # Errors
///
/// Returns an error only if a file system or database operation fails.
pub fn run_all(paths: &VerifyPaths) -> anyhow::Result<ConformanceReport> {
    let mut report = ConformanceReport::new();
    for (_, validate) in VALIDATORS {
        report.extend(validate(paths)?);
    }
    Ok(report)
}

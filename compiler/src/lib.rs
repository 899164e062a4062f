//! Taxograph compiler stages.
//!
//! Each module is one pure compiler stage over typed records; file I/O is
//! left to the stage orchestrator, which reads artifacts through
//! `taxograph_spec::io` and hands the records in here.
//!
//! | Module | Stage |
//! |--------|-------|
//! | [`taxonomy`] | Validate and merge taxon shards and part registries |
//! | [`transforms`] | Normalize transforms and lint every rule file |
//! | [`substrates`] | Expand applicability rules into (taxon, part) edges, prune to leaves |
//! | [`families`] | Generate TPT candidates from family templates; normalize curated seeds |
//! | [`canon`] | Merge candidates into content-addressed canonical TPTs |
//!
//! Data flows strictly forward; no stage mutates an upstream artifact.

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::missing_errors_doc
)]
#![warn(missing_docs)]

pub mod canon;
pub mod families;
pub mod forest;
pub mod lint;
pub mod substrates;
pub mod taxonomy;
pub mod transforms;

pub use lint::{LintIssue, LintLog, LintReport, LintSeverity};
pub use taxonomy::TaxonomyError;

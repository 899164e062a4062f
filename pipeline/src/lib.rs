//! Stage orchestrator for taxograph builds.
//!
//! Runs the stage table (`taxonomy`, `transforms`, `substrates`, `families`,
//! `canon`, `pack`) strictly in order over an ontology directory and a build
//! directory. Before each stage it computes
//! `fingerprint = sha256(sha256(stage logic), sha256(matched input files))`;
//! when that equals the fingerprint of the stage's last successful run and
//! its outputs still exist, the stage is skipped as cached. Every attempted
//! stage leaves `report/stages/<id>.json`, and the run leaves `report/run.json`.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use taxograph_pipeline::{Pipeline, RunOptions};
//!
//! # fn main() -> Result<(), taxograph_pipeline::PipelineError> {
//! let pipeline = Pipeline::new(
//!     PathBuf::from("ontology"),
//!     PathBuf::from("build"),
//!     RunOptions::default(),
//! )?;
//! let outcome = pipeline.run("build")?;
//! println!("{} stage(s) cached", outcome.report.cached_count());
//! std::process::exit(i32::from(outcome.exit_code()));
//! # }
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::missing_errors_doc
)]
#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod error;
pub mod fingerprint;
pub mod report;
pub mod runner;
pub mod stages;

pub use config::BuildConfig;
pub use context::StageContext;
pub use error::{PipelineError, EXIT_FAILURE, EXIT_PREFLIGHT};
pub use report::{RunReport, StageReport, StageStatus, VerificationSummary};
pub use runner::{verification_exit_code, Pipeline, RunOptions, RunOutcome};
pub use stages::{StageDef, STAGES};

//! `taxograph`: compiles a hand-authored food ontology into a packed graph
//! database and verifies the intermediate artifacts.
//!
//! **Usage:**
//! ```text
//! taxograph run <stage|start..end|build> --in <ontology> --build <dir> [--verbose] [--with-tests] [--no-cache]
//! taxograph test <stage|start..end|build> --in <ontology> --build <dir> [--verbose]
//! ```
//!
//! Stages: `taxonomy`, `transforms`, `substrates`, `families`, `canon`, `pack`.
//!
//! Exit codes: `0` success, `1` stage or verification failure, `2` preflight
//! failure (missing upstream artifact, unknown stage).

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use taxograph_conformance::{ConformanceReport, Severity};
use taxograph_pipeline::{
    verification_exit_code, Pipeline, PipelineError, RunOptions, RunReport, StageStatus,
};
use tracing_subscriber::EnvFilter;

/// Compile and verify taxograph builds.
#[derive(Parser)]
#[command(
    name = "taxograph",
    version,
    about = "Compile a food ontology into a packed graph/search database"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Directories and logging shared by every subcommand.
#[derive(Args)]
struct Common {
    /// Ontology source directory.
    #[arg(long = "in", env = "TAXOGRAPH_IN", default_value = "ontology")]
    ontology: PathBuf,

    /// Build directory for artifacts and reports.
    #[arg(long, env = "TAXOGRAPH_BUILD", default_value = "build")]
    build: PathBuf,

    /// Log per-record detail (overrides RUST_LOG).
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run one stage, a `start..end` range, or `build` for every stage.
    Run {
        /// Stage id, range, or `build`.
        stage: String,

        #[command(flatten)]
        common: Common,

        /// Verify each stage's artifacts right after it runs.
        #[arg(long)]
        with_tests: bool,

        /// Run every selected stage even if its inputs are unchanged.
        #[arg(long, env = "TAXOGRAPH_NO_CACHE")]
        no_cache: bool,
    },
    /// Verify the artifacts of already-built stages.
    Test {
        /// Stage id, range, or `build`.
        stage: String,

        #[command(flatten)]
        common: Common,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run {
            stage,
            common,
            with_tests,
            no_cache,
        } => {
            init_logging(common.verbose);
            let options = RunOptions {
                use_cache: !no_cache,
                with_tests,
            };
            run(&stage, common, options)
        }
        Command::Test { stage, common } => {
            init_logging(common.verbose);
            test(&stage, common)
        }
    };
    ExitCode::from(code)
}

fn fail(err: &PipelineError) -> u8 {
    eprintln!("Build FAILED: {err}");
    err.exit_code()
}

fn run(selection: &str, common: Common, options: RunOptions) -> u8 {
    let pipeline = match Pipeline::new(common.ontology, common.build, options) {
        Ok(pipeline) => pipeline,
        Err(err) => return fail(&err),
    };
    let outcome = match pipeline.run(selection) {
        Ok(outcome) => outcome,
        Err(err) => return fail(&err),
    };
    print_run(&outcome.report);
    match &outcome.error {
        Some(err) => {
            fail(err);
        }
        None => println!("Build PASSED."),
    }
    outcome.exit_code()
}

fn print_run(report: &RunReport) {
    println!("Taxograph Run Report");
    println!("====================");
    println!();

    let mut ran = 0usize;
    let mut cached = 0usize;
    let mut failed = 0usize;
    for stage in &report.stages {
        let tag = match stage.status {
            StageStatus::Ok => {
                ran += 1;
                "OK"
            }
            StageStatus::SkippedCached => {
                cached += 1;
                "SKIP"
            }
            StageStatus::Failed => {
                failed += 1;
                "FAIL"
            }
        };
        println!(
            "[{tag}] {}: {} ({} ms)",
            stage.stage,
            stage.status.label(),
            stage.duration_ms
        );
        if let Some(v) = &stage.verification {
            println!(
                "       verification: {} passed, {} warnings, {} failed",
                v.passed, v.warnings, v.failed
            );
        }
        if let Some(error) = &stage.error {
            println!("       {error}");
        }
    }

    println!();
    println!(
        "Summary: {ran} ran, {cached} cached, {failed} failed ({} ms)",
        report.duration_ms
    );
}

fn test(selection: &str, common: Common) -> u8 {
    let options = RunOptions::default();
    let pipeline = match Pipeline::new(common.ontology, common.build, options) {
        Ok(pipeline) => pipeline,
        Err(err) => return fail(&err),
    };
    let report = match pipeline.verify(selection) {
        Ok(report) => report,
        Err(err) => return fail(&err),
    };
    print_checks(&report);
    let code = verification_exit_code(&report);
    if code == 0 {
        println!("Verification PASSED.");
    } else {
        eprintln!(
            "Verification FAILED: {} check(s) did not pass.",
            report.failure_count()
        );
    }
    code
}

fn print_checks(report: &ConformanceReport) {
    println!("Taxograph Verification Report");
    println!("=============================");
    println!();

    for result in &report.results {
        println!(
            "[{}] {}: {}",
            result.severity.tag(),
            result.validator,
            result.message
        );
        for detail in &result.details {
            println!("       {detail}");
        }
    }

    let failed = report.failure_count();
    let warned = report.warning_count();
    let passed = report
        .results
        .iter()
        .filter(|r| r.severity == Severity::Pass)
        .count();
    println!();
    println!("Summary: {passed} passed, {warned} warnings, {failed} failed");
}

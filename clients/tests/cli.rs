//! Drives the `taxograph` binary over the pipeline fixture ontology.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../pipeline/tests/fixtures/ontology")
}

fn taxograph(args: &[&str], build: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_taxograph"))
        .args(args)
        .arg("--in")
        .arg(fixture())
        .arg("--build")
        .arg(build)
        .env_remove("RUST_LOG")
        .env_remove("TAXOGRAPH_NO_CACHE")
        .output()
        .expect("spawn taxograph")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn build_then_cached_rebuild_then_test() {
    let build = tempfile::tempdir().expect("tempdir");

    let first = taxograph(&["run", "build", "--with-tests"], build.path());
    assert_eq!(
        first.status.code(),
        Some(0),
        "{}",
        String::from_utf8_lossy(&first.stderr)
    );
    assert!(stdout(&first).contains("Build PASSED."));
    assert!(build.path().join("database/graph.db").is_file());

    let second = taxograph(&["run", "build"], build.path());
    assert_eq!(second.status.code(), Some(0));
    let text = stdout(&second);
    assert_eq!(text.matches("skipped (cached)").count(), 6, "{text}");
    assert!(text.contains("Summary: 0 ran, 6 cached, 0 failed"));

    let verify = taxograph(&["test", "canon"], build.path());
    assert_eq!(verify.status.code(), Some(0));
    assert!(stdout(&verify).contains("Verification PASSED."));
}

#[test]
fn preflight_and_selection_errors_exit_two() {
    let build = tempfile::tempdir().expect("tempdir");
    let missing = taxograph(&["run", "families"], build.path());
    assert_eq!(missing.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&missing.stderr).contains("preflight failed"));

    let unknown = taxograph(&["run", "bake"], build.path());
    assert_eq!(unknown.status.code(), Some(2));

    let untested = taxograph(&["test", "pack"], build.path());
    assert_eq!(untested.status.code(), Some(2));
}

#[test]
fn no_cache_flag_forces_a_rerun() {
    let build = tempfile::tempdir().expect("tempdir");
    assert_eq!(
        taxograph(&["run", "taxonomy"], build.path()).status.code(),
        Some(0)
    );
    let rerun = taxograph(&["run", "taxonomy", "--no-cache"], build.path());
    assert_eq!(rerun.status.code(), Some(0));
    assert!(stdout(&rerun).contains("Summary: 1 ran, 0 cached, 0 failed"));
}

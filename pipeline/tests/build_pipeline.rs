//! Runs the whole pipeline over the fixture ontology.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use taxograph_pipeline::{
    Pipeline, PipelineError, RunOptions, RunReport, StageReport, StageStatus, EXIT_FAILURE,
    EXIT_PREFLIGHT, STAGES,
};
use taxograph_spec::{io, CanonicalTpt};
use tempfile::TempDir;
use walkdir::WalkDir;

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/ontology")
}

/// Copies the fixture so a test can edit it.
fn editable_fixture() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = fixture();
    for entry in WalkDir::new(&src).into_iter().filter_map(Result::ok) {
        let rel = entry.path().strip_prefix(&src).expect("relative");
        let dest = dir.path().join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).expect("mkdir");
        } else {
            fs::copy(entry.path(), &dest).expect("copy");
        }
    }
    dir
}

fn pipeline(ontology: &Path, build: &Path, options: RunOptions) -> Pipeline {
    Pipeline::new(ontology.to_path_buf(), build.to_path_buf(), options)
        .expect("pipeline")
}

fn statuses(report: &RunReport) -> Vec<(&str, StageStatus)> {
    report
        .stages
        .iter()
        .map(|s| (s.stage.as_str(), s.status))
        .collect()
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).expect(sql)
}

#[test]
fn second_run_is_fully_cached() {
    let build = tempfile::tempdir().expect("tempdir");
    let first = pipeline(&fixture(), build.path(), RunOptions::default())
        .run("build")
        .expect("first run");
    assert_eq!(first.exit_code(), 0, "{:?}", first.error);
    assert!(first.report.stages.iter().all(|s| s.status == StageStatus::Ok));

    let second = pipeline(&fixture(), build.path(), RunOptions::default())
        .run("build")
        .expect("second run");
    assert_eq!(second.exit_code(), 0);
    assert_eq!(second.report.cached_count(), STAGES.len());
    for (first, second) in first.report.stages.iter().zip(&second.report.stages) {
        assert_eq!(first.fingerprint, second.fingerprint, "{}", first.stage);
        assert_eq!(first.stats, second.stats, "{}", first.stage);
    }

    let run: RunReport = io::read_json(&build.path().join("report/run.json")).expect("run.json");
    assert_eq!(run.cached_count(), STAGES.len());
    let canon = StageReport::previous(build.path(), "canon")
        .expect("canon report");
    assert_eq!(canon.status, StageStatus::SkippedCached);
}

#[test]
fn editing_a_pack_only_input_reruns_only_pack() {
    let ontology = editable_fixture();
    let build = tempfile::tempdir().expect("tempdir");
    pipeline(ontology.path(), build.path(), RunOptions::default())
        .run("build")
        .expect("first run");

    fs::write(
        ontology.path().join("docs/taxa.jsonl"),
        "{\"taxon_id\": \"tx:a:sus:scrofa\", \"summary\": \"Domestic pig.\"}\n",
    )
    .expect("edit docs");
    let outcome = pipeline(ontology.path(), build.path(), RunOptions::default())
        .run("build")
        .expect("second run");
    assert_eq!(
        statuses(&outcome.report),
        [
            ("taxonomy", StageStatus::SkippedCached),
            ("transforms", StageStatus::SkippedCached),
            ("substrates", StageStatus::SkippedCached),
            ("families", StageStatus::SkippedCached),
            ("canon", StageStatus::SkippedCached),
            ("pack", StageStatus::Ok),
        ]
    );
}

#[test]
fn no_cache_reruns_everything() {
    let build = tempfile::tempdir().expect("tempdir");
    pipeline(&fixture(), build.path(), RunOptions::default())
        .run("build")
        .expect("first run");
    let options = RunOptions {
        use_cache: false,
        ..RunOptions::default()
    };
    let outcome = pipeline(&fixture(), build.path(), options)
        .run("taxonomy..substrates")
        .expect("rerun");
    assert_eq!(outcome.report.stages.len(), 3);
    assert_eq!(outcome.report.cached_count(), 0);
}

#[test]
fn with_tests_verifies_every_stage() {
    let build = tempfile::tempdir().expect("tempdir");
    let options = RunOptions {
        use_cache: true,
        with_tests: true,
    };
    let outcome = pipeline(&fixture(), build.path(), options)
        .run("build")
        .expect("run");
    assert_eq!(outcome.exit_code(), 0, "{:?}", outcome.error);
    for stage in &outcome.report.stages {
        let verification = stage.verification.expect("verified");
        assert_eq!(verification.failed, 0, "{}", stage.stage);
        assert!(verification.passed > 0, "{}", stage.stage);
    }

    let checks = pipeline(&fixture(), build.path(), RunOptions::default())
        .verify("build")
        .expect("verify");
    assert!(checks.all_passed());
}

#[test]
fn builds_the_expected_graph() {
    let build = tempfile::tempdir().expect("tempdir");
    let outcome = pipeline(&fixture(), build.path(), RunOptions::default())
        .run("build")
        .expect("run");
    assert_eq!(outcome.exit_code(), 0, "{:?}", outcome.error);

    let canon: Vec<CanonicalTpt> =
        io::read_jsonl(&build.path().join("tmp/tpt_canon.jsonl")).expect("canon");
    // ham seed + three generated candidates, the cured one merged into the ham
    assert_eq!(canon.len(), 4);
    let ham = canon.iter().find(|t| t.name == "Ham").expect("ham");
    assert_eq!(ham.notes.as_deref(), Some("dry-cured leg"));
    assert_eq!(ham.family, "cured");
    assert!(canon
        .iter()
        .any(|t| t.id == "tx:p:malus:domestica|part:fruit|raw"));
    let canon_stats = &outcome.report.stages[4].stats;
    assert_eq!(canon_stats["collisions"], 1);

    let conn = Connection::open(build.path().join("database/graph.db")).expect("open");
    assert_eq!(count(&conn, "SELECT count(*) FROM nodes"), 7);
    assert_eq!(count(&conn, "SELECT count(*) FROM tpt_nodes"), 4);
    assert_eq!(
        count(
            &conn,
            "SELECT count(*) FROM tpt_nodes WHERE name = 'Pig muscle, cured'",
        ),
        0
    );
    assert_eq!(count(&conn, "SELECT count(*) FROM taxon_part_nodes"), 3);
    let pork: String = conn
        .query_row(
            "SELECT name FROM taxon_part_nodes WHERE id = 'tx:a:sus:scrofa|part:muscle'",
            [],
            |row| row.get(0),
        )
        .expect("pork");
    assert_eq!(pork, "Pork");
    assert_eq!(count(&conn, "SELECT count(*) FROM taxon_doc"), 1);
    assert_eq!(
        count(&conn, "SELECT count(*) FROM search_content"),
        7 + 3 + 4
    );
    assert!(count(&conn, "SELECT count(*) FROM search_fts WHERE search_fts MATCH 'pomme'") >= 1);
}

#[test]
fn missing_upstream_artifacts_fail_preflight() {
    let build = tempfile::tempdir().expect("tempdir");
    let pipeline = pipeline(&fixture(), build.path(), RunOptions::default());
    let err = pipeline.run("canon").expect_err("preflight");
    assert_eq!(err.exit_code(), EXIT_PREFLIGHT);
    match err {
        PipelineError::Preflight { stage, missing } => {
            assert_eq!(stage, "canon");
            assert!(
                missing.contains(&"tmp/tpt_seed.jsonl".to_owned()),
                "{missing:?}"
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!build.path().join("report/run.json").exists());

    let err = pipeline.verify("pack").expect_err("nothing packed yet");
    assert_eq!(err.exit_code(), EXIT_PREFLIGHT);
    assert_eq!(
        pipeline.run("bake").expect_err("unknown").exit_code(),
        EXIT_PREFLIGHT
    );
}

#[test]
fn stage_failure_stops_the_run_and_is_reported() {
    let ontology = editable_fixture();
    fs::write(
        ontology.path().join("taxa/orphans.jsonl"),
        "{\"id\": \"tx:a:bos:taurus\", \"rank\": \"species\", \"display_name\": \"Cow\", \"latin_name\": \"Bos taurus\"}\n",
    )
    .expect("write orphan");
    let build = tempfile::tempdir().expect("tempdir");
    let outcome = pipeline(ontology.path(), build.path(), RunOptions::default())
        .run("build")
        .expect("run");
    assert_eq!(outcome.exit_code(), EXIT_FAILURE);
    assert_eq!(outcome.report.stages.len(), 1);
    assert_eq!(outcome.report.failed_stage.as_deref(), Some("taxonomy"));

    let report = StageReport::previous(build.path(), "taxonomy")
        .expect("stage report");
    assert_eq!(report.status, StageStatus::Failed);
    let error = report.error.expect("error message");
    assert!(error.contains("tx:a:bos"), "{error}");
    assert!(build.path().join("report/run.json").is_file());
}

#[test]
fn disabled_cache_in_config_wins() {
    let ontology = editable_fixture();
    fs::write(
        ontology.path().join("taxograph.toml"),
        "[cache]\nenabled = false\n",
    )
        .expect("config");
    let build = tempfile::tempdir().expect("tempdir");
    let pipeline = pipeline(ontology.path(), build.path(), RunOptions::default());
    assert!(!pipeline.options().use_cache);
    pipeline.run("taxonomy").expect("first");
    let outcome = pipeline.run("taxonomy").expect("second");
    assert_eq!(outcome.report.cached_count(), 0);
}

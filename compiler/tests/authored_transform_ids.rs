//! Transform ids written without a `tf:` prefix resolve everywhere they are
//! referenced: registry, seed paths, family templates and bucket keys.

use serde_json::json;
use taxograph_compiler::canon::{Canonicalizer, RAW_SUFFIX};
use taxograph_compiler::transforms::canonicalize_transforms;
use taxograph_compiler::LintLog;
use taxograph_spec::rules::{BucketTable, FamilyRule};
use taxograph_spec::{PathStep, Provenance, Transform, TptCandidate, TransformRegistry};

fn registry() -> TransformRegistry {
    let raw: Vec<Transform> = serde_json::from_value(json!([
        {"id": "cure", "name": "Cure", "identity": true, "order": 10, "params": [
            {"key": "nitrite_ppm", "kind": "number", "identity_param": true}
        ]},
        {"id": "smoke", "name": "Smoke", "identity": true, "order": 20}
    ]))
    .expect("transforms");
    let mut log = LintLog::new();
    let canon = canonicalize_transforms(raw, &[], &mut log);
    assert_eq!(log.issues().len(), 0);
    TransformRegistry::from_canon(canon)
}

#[test]
fn unprefixed_ids_keep_their_identity() {
    let registry = registry();
    assert!(registry.contains("cure"));
    assert!(!registry.contains("tf:cure"));

    let buckets: BucketTable = serde_json::from_value(json!({
        "cure.nitrite_ppm": {"cuts": [0, 120], "labels": ["none", "low", "high"]}
    }))
    .expect("buckets");
    let families: Vec<FamilyRule> = serde_json::from_value(json!([
        {"family": "cured", "applies_to": [{"taxon_prefix": "tx:a"}], "path": [{"id": "cure"}]}
    ]))
    .expect("families");
    let mut log = LintLog::new();
    let engine = Canonicalizer::new(&registry, &buckets, &families, 12, &mut log);

    let ham = TptCandidate::new(
        "tx:a:sus:scrofa",
        "part:muscle",
        vec![PathStep::new("cure").with_param("nitrite_ppm", json!(200))],
        Provenance::Seed,
    );
    let smoked = TptCandidate::new(
        "tx:a:sus:scrofa",
        "part:muscle",
        vec![PathStep::new("smoke")],
        Provenance::Seed,
    );
    let (tpts, stats) = engine.canonicalize(vec![ham, smoked], Vec::new(), &mut log);

    assert_eq!(stats.unknown_transforms_dropped, 0);
    assert_eq!(tpts.len(), 2, "distinct products must not merge");
    assert!(tpts.iter().all(|t| !t.id.ends_with(RAW_SUFFIX)));
    let cured = tpts
        .iter()
        .find(|t| t.identity[0].id == "cure")
        .expect("cured tpt");
    assert_eq!(cured.identity[0].params.get("nitrite_ppm"), Some(&json!("high")));
    assert_eq!(cured.family, "cured");
}

//! Property-based tests for the canonical identity engine.
//!
//! Ids must be a pure function of (taxon, part, identity steps after
//! bucketing): insensitive to step order, provenance and non-identity content.

use proptest::prelude::*;
use serde_json::json;
use taxograph_compiler::canon::{Canonicalizer, RAW_SUFFIX};
use taxograph_compiler::LintLog;
use taxograph_spec::registry::TransformsCanon;
use taxograph_spec::rules::BucketTable;
use taxograph_spec::{PathStep, Provenance, TptCandidate, TransformRegistry};

fn registry() -> TransformRegistry {
    let canon: TransformsCanon = serde_json::from_value(json!({
        "transforms": [
            {"id": "tf:brine", "name": "Brine", "identity": true, "order": 10, "params": [
                {"key": "salt_pct", "kind": "number", "identity_param": true}
            ]},
            {"id": "tf:cure", "name": "Cure", "identity": true, "order": 30, "params": [
                {"key": "nitrite_ppm", "kind": "number", "identity_param": true},
                {"key": "operator", "kind": "enum", "enum": ["a", "b"]}
            ]},
            {"id": "tf:smoke", "name": "Smoke", "identity": true, "order": 40, "params": [
                {"key": "wood", "kind": "enum", "enum": ["oak", "beech"], "identity_param": true}
            ]},
            {"id": "tf:dry", "name": "Dry", "identity": true, "order": 50},
            {"id": "tf:pasteurize", "name": "Pasteurize", "identity": false, "order": 5},
            {"id": "tf:package", "name": "Package", "identity": false, "order": 90}
        ]
    }))
    .expect("transforms canon");
    TransformRegistry::from_canon(canon)
}

fn buckets() -> BucketTable {
    serde_json::from_value(json!({
        "tf:cure.nitrite_ppm": {"cuts": [0, 120], "labels": ["none", "low", "high"]}
    }))
    .expect("buckets")
}

fn with_engine<T>(f: impl FnOnce(&Canonicalizer<'_>) -> T) -> T {
    let registry = registry();
    let mut log = LintLog::new();
    let engine = Canonicalizer::new(&registry, &buckets(), &[], 12, &mut log);
    f(&engine)
}

fn identity_pool() -> Vec<PathStep> {
    vec![
        PathStep::new("tf:brine").with_param("salt_pct", json!(3)),
        PathStep::new("tf:cure").with_param("nitrite_ppm", json!(150)),
        PathStep::new("tf:smoke").with_param("wood", json!("oak")),
        PathStep::new("tf:dry"),
    ]
}

fn subset_strategy() -> impl Strategy<Value = Vec<PathStep>> {
    proptest::sample::subsequence(identity_pool(), 0..=4).prop_shuffle()
}

// =============================================================================
// Order and content insensitivity
// =============================================================================

proptest! {
    /// Permuting the authored path never changes the id.
    #[test]
    fn prop_order_insensitive(path in subset_strategy(), seed in any::<u64>()) {
        with_engine(|engine| {
            let base = engine.tpt_id("tx:a:sus:scrofa", "part:muscle", &path);
            let mut rotated = path.clone();
            if !rotated.is_empty() {
                let by = (seed % rotated.len() as u64) as usize;
                rotated.rotate_left(by);
            }
            rotated.reverse();
            prop_assert_eq!(engine.tpt_id("tx:a:sus:scrofa", "part:muscle", &rotated), base);
            Ok(())
        })?;
    }

    /// Adding non-identity steps or non-identity params never changes the id.
    #[test]
    fn prop_non_identity_content_irrelevant(path in subset_strategy(), at in 0usize..5) {
        with_engine(|engine| {
            let base = engine.tpt_id("tx:a:sus:scrofa", "part:muscle", &path);
            let mut noisy: Vec<PathStep> = path
                .iter()
                .cloned()
                .map(|s| if s.id == "tf:cure" { s.with_param("operator", json!("b")) } else { s })
                .collect();
            noisy.insert(at.min(noisy.len()), PathStep::new("tf:pasteurize"));
            noisy.push(PathStep::new("tf:package").with_param("film", json!("pe")));
            prop_assert_eq!(engine.tpt_id("tx:a:sus:scrofa", "part:muscle", &noisy), base);
            Ok(())
        })?;
    }

    /// Nitrite levels inside one bucket collapse to one id.
    #[test]
    fn prop_bucket_collapse(a in 121i64..10_000, b in 121i64..10_000) {
        with_engine(|engine| {
            let id_a = engine.tpt_id("tx:a:sus:scrofa", "part:muscle",
                &[PathStep::new("tf:cure").with_param("nitrite_ppm", json!(a))]);
            let id_b = engine.tpt_id("tx:a:sus:scrofa", "part:muscle",
                &[PathStep::new("tf:cure").with_param("nitrite_ppm", json!(b))]);
            prop_assert_eq!(id_a, id_b);
            Ok(())
        })?;
    }

    /// Canonicalizing an already-canonical TPT reproduces its id.
    #[test]
    fn prop_idempotent(path in subset_strategy()) {
        with_engine(|engine| {
            let cand = TptCandidate::new(
                "tx:a:sus:scrofa",
                "part:muscle",
                path.clone(),
                Provenance::Seed,
            );
            let (first, _) = engine.canonicalize(vec![cand], Vec::new(), &mut LintLog::new());
            let tpt = &first[0];
            let again = TptCandidate::new(
                tpt.taxon_id.clone(),
                tpt.part_id.clone(),
                tpt.identity.clone(),
                Provenance::Generated,
            );
            let (second, _) = engine.canonicalize(Vec::new(), vec![again], &mut LintLog::new());
            prop_assert_eq!(&second[0].id, &tpt.id);
            prop_assert_eq!(&second[0].identity_hash, &tpt.identity_hash);
            Ok(())
        })?;
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn raw_path_uses_sentinel_suffix() {
    with_engine(|engine| {
        let id = engine.tpt_id("tx:p:malus:domestica", "part:fruit", &[]);
        assert_eq!(id, format!("tx:p:malus:domestica|part:fruit|{RAW_SUFFIX}"));
        // non-identity steps alone are still raw
        let id = engine.tpt_id(
            "tx:p:malus:domestica",
            "part:fruit",
            &[PathStep::new("tf:pasteurize")],
        );
        assert!(id.ends_with("|raw"));
    });
}

#[test]
fn nitrite_140_and_200_share_an_id() {
    with_engine(|engine| {
        let cand = |ppm: i64, provenance| {
            TptCandidate::new(
                "tx:a:sus:scrofa",
                "part:muscle",
                vec![
                    PathStep::new("tf:smoke").with_param("wood", json!("beech")),
                    PathStep::new("tf:cure").with_param("nitrite_ppm", json!(ppm)),
                ],
                provenance,
            )
        };
        let (tpts, stats) = engine.canonicalize(
            Vec::new(),
            vec![cand(140, Provenance::Generated), cand(200, Provenance::Generated)],
            &mut LintLog::new(),
        );
        assert_eq!(tpts.len(), 1);
        assert_eq!(stats.collisions, 1);
        assert_eq!(
            tpts[0].identity[0].params.get("nitrite_ppm"),
            Some(&json!("high"))
        );
        assert_eq!(tpts[0].identity[1].id, "tf:smoke");
    });
}

#[test]
fn different_buckets_get_different_ids() {
    with_engine(|engine| {
        let low = engine.tpt_id(
            "tx:a:sus:scrofa",
            "part:muscle",
            &[PathStep::new("tf:cure").with_param("nitrite_ppm", json!(50))],
        );
        let high = engine.tpt_id(
            "tx:a:sus:scrofa",
            "part:muscle",
            &[PathStep::new("tf:cure").with_param("nitrite_ppm", json!(140))],
        );
        assert_ne!(low, high);
    });
}

#[test]
fn curated_metadata_survives_either_input_order() {
    with_engine(|engine| {
        let path = vec![PathStep::new("tf:dry")];
        let mut seed = TptCandidate::new(
            "tx:a:sus:scrofa",
            "part:muscle",
            path.clone(),
            Provenance::Seed,
        );
        seed.name = Some("Curated".into());
        seed.notes = Some("from tpts".into());
        let mut gen = TptCandidate::new(
            "tx:a:sus:scrofa",
            "part:muscle",
            path,
            Provenance::Generated,
        );
        gen.name = Some("Generated".into());
        gen.synonyms = vec!["generated alias".into()];
        gen.family = Some("dried".into());

        let (a, _) = engine.canonicalize(
            vec![seed.clone()],
            vec![gen.clone()],
            &mut LintLog::new(),
        );
        // a seed that arrives through the generated stream keeps seed provenance
        let (b, _) = engine.canonicalize(Vec::new(), vec![gen, seed], &mut LintLog::new());
        for tpts in [&a, &b] {
            assert_eq!(tpts.len(), 1);
            assert_eq!(tpts[0].name, "Curated");
            assert_eq!(tpts[0].notes.as_deref(), Some("from tpts"));
            assert!(tpts[0].synonyms.is_empty());
            assert_eq!(tpts[0].family, "dried");
        }
        assert_eq!(a[0].id, b[0].id);
    });
}

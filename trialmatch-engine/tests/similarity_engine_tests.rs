//! Criterion similarity and human-tuned thresholds

mod helpers;

use helpers::{test_pool, FakeEmbeddings};
use std::sync::Arc;
use std::time::Duration;
use trialmatch_common::EventBus;
use trialmatch_engine::config::SimilarityConfig;
use trialmatch_engine::db::{corrections, embeddings};
use trialmatch_engine::models::{CorrectionAction, Criterion};
use trialmatch_engine::services::{SimilarityEngine, SimilarityError};

fn engine(pool: &sqlx::SqlitePool, provider: FakeEmbeddings) -> SimilarityEngine {
    engine_with(pool, Arc::new(provider))
}

fn engine_with(pool: &sqlx::SqlitePool, provider: Arc<FakeEmbeddings>) -> SimilarityEngine {
    SimilarityEngine::new(
        pool.clone(),
        provider,
        SimilarityConfig::default(),
        Duration::from_secs(5),
        1000,
        EventBus::new(16),
    )
}

#[tokio::test]
async fn merge_correction_lowers_threshold_within_limit() {
    let pool = test_pool().await;
    let engine = engine(&pool, FakeEmbeddings::new(3));

    assert!((engine.threshold_for("dosage").await.unwrap() - 0.75).abs() < 1e-9);

    let applied = engine
        .record_correction("dose-a", "dose-b", CorrectionAction::Merge, 0.68, "dosage", None)
        .await
        .unwrap();

    assert!((applied.previous_threshold - 0.75).abs() < 1e-9);
    assert!(applied.new_threshold < 0.75);
    assert!(applied.new_threshold >= 0.60);
    assert!((engine.threshold_for("dosage").await.unwrap() - applied.new_threshold).abs() < 1e-9);
    // Other tags are unaffected
    assert!((engine.threshold_for("eligibility-age").await.unwrap() - 0.75).abs() < 1e-9);
}

#[tokio::test]
async fn threshold_stays_in_bounds_under_any_corrections() {
    let pool = test_pool().await;
    let engine = engine(&pool, FakeEmbeddings::new(3));

    for i in 0..40 {
        engine
            .record_correction("a", "b", CorrectionAction::Merge, -1.0 + (i as f64) * 0.01, "dosage", None)
            .await
            .unwrap();
        let t = engine.threshold_for("dosage").await.unwrap();
        assert!((0.5..=0.95).contains(&t), "threshold {} escaped bounds", t);
    }
    for _ in 0..200 {
        engine
            .record_correction("a", "b", CorrectionAction::Separate, 0.99, "dosage", None)
            .await
            .unwrap();
        let t = engine.threshold_for("dosage").await.unwrap();
        assert!((0.5..=0.95).contains(&t), "threshold {} escaped bounds", t);
    }
}

#[tokio::test]
async fn corrections_survive_a_restart() {
    let pool = test_pool().await;
    let before = {
        let engine = engine(&pool, FakeEmbeddings::new(3));
        engine
            .record_correction("a", "b", CorrectionAction::Separate, 0.80, "route", Some("cmp-1".to_string()))
            .await
            .unwrap()
            .new_threshold
    };

    let restarted = engine(&pool, FakeEmbeddings::new(3));
    assert!((restarted.threshold_for("route").await.unwrap() - before).abs() < 1e-9);

    let history = corrections::list_for_tag(&pool, "route", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].comparison_id.as_deref(), Some("cmp-1"));
}

#[tokio::test]
async fn out_of_range_similarity_is_rejected() {
    let pool = test_pool().await;
    let engine = engine(&pool, FakeEmbeddings::new(3));

    let result = engine
        .record_correction("a", "b", CorrectionAction::Merge, 1.7, "dosage", None)
        .await;
    assert!(matches!(result, Err(SimilarityError::InvalidInput(_))));
    assert!((engine.threshold_for("dosage").await.unwrap() - 0.75).abs() < 1e-9);
}

#[tokio::test]
async fn compare_sets_keeps_pairs_above_threshold() {
    let pool = test_pool().await;
    let provider = FakeEmbeddings::new(3)
        .vector("Age 18 or older", vec![1.0, 0.0, 0.0])
        .vector("Adults aged 18+", vec![0.9, 0.1, 0.0])
        .vector("No prior chemotherapy", vec![0.0, 1.0, 0.0])
        .vector("Chemo-naive patients", vec![0.1, 0.95, 0.05]);
    let engine = engine(&pool, provider);

    let set_a = vec![
        Criterion::new("a1", "Age 18 or older"),
        Criterion::new("a2", "No prior chemotherapy"),
    ];
    let set_b = vec![
        Criterion::new("b1", "Adults aged 18+"),
        Criterion::new("b2", "Chemo-naive patients"),
    ];
    let comparison = engine.compare_sets(&set_a, &set_b, "eligibility").await.unwrap();

    assert!(comparison.excluded.is_empty());
    let pairs: Vec<(&str, &str)> = comparison
        .matches
        .iter()
        .map(|p| (p.criterion_a.as_str(), p.criterion_b.as_str()))
        .collect();
    assert_eq!(pairs.len(), 2);
    assert!(pairs.contains(&("a1", "b1")));
    assert!(pairs.contains(&("a2", "b2")));
    assert!(comparison.matches[0].score >= comparison.matches[1].score);
}

#[tokio::test]
async fn failed_embedding_excludes_the_criterion() {
    let pool = test_pool().await;
    let provider = FakeEmbeddings::new(2)
        .vector("Hemoglobin above 9", vec![1.0, 0.0])
        .vector("Hgb > 9 g/dL", vec![1.0, 0.05])
        .failing_on("Platelets above 100k");
    let engine = engine(&pool, provider);

    let set_a = vec![
        Criterion::new("a1", "Hemoglobin above 9"),
        Criterion::new("a2", "Platelets above 100k"),
    ];
    let set_b = vec![Criterion::new("b1", "Hgb > 9 g/dL")];
    let comparison = engine.compare_sets(&set_a, &set_b, "labs").await.unwrap();

    assert_eq!(comparison.excluded, vec!["a2".to_string()]);
    assert_eq!(comparison.matches.len(), 1);
    assert_eq!(comparison.matches[0].criterion_a, "a1");
}

#[tokio::test]
async fn zero_vector_never_matches() {
    let pool = test_pool().await;
    let provider = FakeEmbeddings::new(2)
        .vector("blank", vec![0.0, 0.0])
        .vector("real", vec![0.6, 0.8]);
    let engine = engine(&pool, provider);

    let comparison = engine
        .compare_sets(&[Criterion::new("z", "blank")], &[Criterion::new("r", "real")], "misc")
        .await
        .unwrap();
    assert!(comparison.matches.is_empty());
    assert!(comparison.excluded.is_empty());
}

#[tokio::test]
async fn stored_vectors_are_reused_until_the_model_changes() {
    let pool = test_pool().await;
    let criterion = Criterion::new("c1", "ECOG 0-1");

    let first = Arc::new(FakeEmbeddings::new(2).vector("ECOG 0-1", vec![0.3, 0.4]));
    let engine_v1 = engine_with(&pool, first.clone());
    engine_v1.embed(&criterion).await.unwrap();
    engine_v1.embed(&criterion).await.unwrap();
    assert_eq!(first.call_count(), 1);

    let upgraded = Arc::new(
        FakeEmbeddings::new(2)
            .with_model("fake-embed-2")
            .vector("ECOG 0-1", vec![0.5, 0.5]),
    );
    let engine_v2 = engine_with(&pool, upgraded.clone());
    let vector = engine_v2.embed(&criterion).await.unwrap();
    assert_eq!(upgraded.call_count(), 1);
    assert_eq!(vector.model_version, "fake-embed-2");

    let stored = embeddings::get_vector(&pool, "c1").await.unwrap().expect("stored vector");
    assert_eq!(stored.model_version, "fake-embed-2");
    assert_eq!(stored.values, vec![0.5, 0.5]);
}

#[tokio::test]
async fn wrong_dimension_is_an_embedding_failure() {
    let pool = test_pool().await;
    let provider = FakeEmbeddings::new(4).vector("short", vec![1.0, 0.0]);
    let engine = engine(&pool, provider);

    let result = engine.embed(&Criterion::new("s", "short")).await;
    assert!(matches!(result, Err(SimilarityError::Embedding { ref criterion_id, .. }) if criterion_id == "s"));
}

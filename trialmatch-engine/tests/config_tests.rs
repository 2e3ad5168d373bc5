//! Embedding key and threshold resolution
//!
//! Tests touching TRIALMATCH_EMBEDDING_API_KEY run under `#[serial]`.

mod helpers;

use helpers::test_pool;
use serial_test::serial;
use trialmatch_engine::config::{
    resolve_embedding_api_key, resolve_low_confidence_threshold, EmbeddingConfig, EngineConfig,
    MatchingConfig, EMBEDDING_API_KEY_ENV,
};
use trialmatch_engine::db::settings;

fn toml_with_key(key: Option<&str>) -> EmbeddingConfig {
    EmbeddingConfig {
        api_key: key.map(str::to_string),
        ..EmbeddingConfig::default()
    }
}

#[tokio::test]
#[serial]
async fn database_key_wins() {
    let pool = test_pool().await;
    settings::set_embedding_api_key(&pool, "db-key").await.unwrap();
    std::env::set_var(EMBEDDING_API_KEY_ENV, "env-key");

    let key = resolve_embedding_api_key(&pool, &toml_with_key(Some("toml-key"))).await.unwrap();
    assert_eq!(key, "db-key");

    std::env::remove_var(EMBEDDING_API_KEY_ENV);
}

#[tokio::test]
#[serial]
async fn environment_beats_toml() {
    let pool = test_pool().await;
    std::env::set_var(EMBEDDING_API_KEY_ENV, "env-key");

    let key = resolve_embedding_api_key(&pool, &toml_with_key(Some("toml-key"))).await.unwrap();
    assert_eq!(key, "env-key");

    std::env::remove_var(EMBEDDING_API_KEY_ENV);
}

#[tokio::test]
#[serial]
async fn toml_is_last_resort() {
    let pool = test_pool().await;
    std::env::remove_var(EMBEDDING_API_KEY_ENV);

    let key = resolve_embedding_api_key(&pool, &toml_with_key(Some("toml-key"))).await.unwrap();
    assert_eq!(key, "toml-key");
}

#[tokio::test]
#[serial]
async fn blank_keys_are_ignored() {
    let pool = test_pool().await;
    settings::set_embedding_api_key(&pool, "   ").await.unwrap();
    std::env::set_var(EMBEDDING_API_KEY_ENV, "");

    let result = resolve_embedding_api_key(&pool, &toml_with_key(None)).await;
    assert!(matches!(result, Err(trialmatch_common::Error::Config(_))));

    std::env::remove_var(EMBEDDING_API_KEY_ENV);
}

#[tokio::test]
async fn threshold_override_must_stay_below_auto_accept() {
    let pool = test_pool().await;
    let config = MatchingConfig::default();
    assert!((resolve_low_confidence_threshold(&pool, &config).await.unwrap() - 0.70).abs() < 1e-9);

    settings::set_low_confidence_threshold(&pool, 0.60).await.unwrap();
    assert!((resolve_low_confidence_threshold(&pool, &config).await.unwrap() - 0.60).abs() < 1e-9);

    settings::set_low_confidence_threshold(&pool, 0.97).await.unwrap();
    assert!((resolve_low_confidence_threshold(&pool, &config).await.unwrap() - 0.70).abs() < 1e-9);
}

#[test]
fn config_file_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.toml");
    std::fs::write(
        &path,
        r#"
[server]
port = 6100

[matching]
auto_accept_threshold = 0.92

[[review.reviewers]]
id = "carol"
expertise = ["protocol_quality"]
"#,
    )
    .unwrap();

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.base.server.port, 6100);
    assert!((config.matching.auto_accept_threshold - 0.92).abs() < 1e-9);
    assert!((config.matching.low_confidence_threshold - 0.70).abs() < 1e-9);
    assert_eq!(config.review.reviewers.len(), 1);

    let missing = EngineConfig::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(missing, EngineConfig::default());
}

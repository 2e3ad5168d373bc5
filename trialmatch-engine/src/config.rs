//! Engine configuration
//!
//! One TOML file holds the shared `[logging]`/`[server]` tables plus the
//! engine's own `[matching]`, `[similarity]`, `[review]` and `[embedding]`
//! tables. Every tunable constant of the matching and review policy lives
//! here with its default, so behaviour can change without touching code.
//!
//! Two values can also come from the database `settings` table, which wins
//! over everything else: the low-confidence threshold and the embedding API key.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{info, warn};
use trialmatch_common::config::{load_toml, TomlConfig};
use trialmatch_common::{Error, Result};

use crate::db::settings;
use crate::models::ReviewType;

/// Environment variable holding the embedding API key
pub const EMBEDDING_API_KEY_ENV: &str = "TRIALMATCH_EMBEDDING_API_KEY";

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(flatten)]
    pub base: TomlConfig,
    pub matching: MatchingConfig,
    pub similarity: SimilarityConfig,
    pub review: ReviewConfig,
    pub embedding: EmbeddingConfig,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        load_toml(path)
    }
}

/// Identity resolver weights, gates and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub exact_identifier_confidence: f64,
    pub registry_number_confidence: f64,
    /// Fixed confidence once the fuzzy identifier gate is passed
    pub fuzzy_identifier_confidence: f64,
    pub fuzzy_identifier_gate: f64,
    /// Similarity assigned when identifiers differ only by a version suffix
    pub version_strip_similarity: f64,
    pub title_similarity_gate: f64,
    /// Title confidence = weight × similarity
    pub title_confidence_weight: f64,
    pub sponsor_phase_confidence: f64,
    /// At or above: `approved` without review
    pub auto_accept_threshold: f64,
    /// Below: `needs_manual_review`
    pub low_confidence_threshold: f64,
    pub max_alternatives: usize,
    pub sponsor_pool_limit: u32,
    pub phase_pool_limit: u32,
    pub sponsor_phase_pool_limit: u32,
    /// Per catalog lookup
    pub lookup_timeout_ms: u64,
    pub db_max_lock_wait_ms: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            exact_identifier_confidence: 0.95,
            registry_number_confidence: 0.99,
            fuzzy_identifier_confidence: 0.85,
            fuzzy_identifier_gate: 0.7,
            version_strip_similarity: 0.9,
            title_similarity_gate: 0.6,
            title_confidence_weight: 0.75,
            sponsor_phase_confidence: 0.70,
            auto_accept_threshold: 0.90,
            low_confidence_threshold: 0.70,
            max_alternatives: 5,
            sponsor_pool_limit: 50,
            phase_pool_limit: 50,
            sponsor_phase_pool_limit: 20,
            lookup_timeout_ms: 5000,
            db_max_lock_wait_ms: 5000,
        }
    }
}

/// Adaptive threshold bounds and correction step sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub default_threshold: f64,
    pub min_threshold: f64,
    pub max_threshold: f64,
    /// Largest downward step a single `merge` correction may apply
    pub max_merge_decrease: f64,
    pub separate_increase: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            default_threshold: 0.75,
            min_threshold: 0.5,
            max_threshold: 0.95,
            max_merge_decrease: 0.15,
            separate_increase: 0.05,
        }
    }
}

/// Review routing policy and reviewer roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Match confidence below this is `high` priority
    pub high_priority_below: f64,
    /// Match confidence below this (and above the high cut) is `medium`
    pub medium_priority_below: f64,
    /// Field coverage floor, percent
    pub min_field_coverage: f64,
    pub min_extraction_confidence: f64,
    /// Share of clean jobs sampled for a `low` priority spot check, 0-1
    pub spot_check_rate: f64,
    /// Window for reviewer dashboard statistics
    pub stats_window_days: i64,
    pub reviewers: Vec<ReviewerConfig>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            high_priority_below: 0.70,
            medium_priority_below: 0.85,
            min_field_coverage: 60.0,
            min_extraction_confidence: 0.60,
            spot_check_rate: 0.0,
            stats_window_days: 30,
            reviewers: Vec::new(),
        }
    }
}

impl ReviewConfig {
    pub fn reviewer(&self, reviewer_id: &str) -> Option<&ReviewerConfig> {
        self.reviewers.iter().find(|r| r.id == reviewer_id)
    }
}

/// One known reviewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Review types this reviewer handles; empty means all
    #[serde(default)]
    pub expertise: Vec<ReviewType>,
}

impl ReviewerConfig {
    pub fn handles(&self, review_type: ReviewType) -> bool {
        self.expertise.is_empty() || self.expertise.contains(&review_type)
    }
}

/// Remote embedding model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    /// Stored with every vector; a change forces regeneration
    pub model_version: String,
    pub dimension: usize,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Minimum spacing between requests
    pub min_request_interval_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            model_version: "text-embedding-004".to_string(),
            dimension: 768,
            api_key: None,
            timeout_secs: 30,
            min_request_interval_ms: 100,
        }
    }
}

/// Embedding API key, database → environment → TOML
pub async fn resolve_embedding_api_key(
    db: &SqlitePool,
    config: &EmbeddingConfig,
) -> Result<String> {
    let db_key = settings::get_embedding_api_key(db).await?.filter(|k| is_valid_key(k));
    let env_key = std::env::var(EMBEDDING_API_KEY_ENV)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = config.api_key.clone().filter(|k| is_valid_key(k));

    let sources: Vec<&str> = [
        db_key.as_ref().map(|_| "database"),
        env_key.as_ref().map(|_| "environment"),
        toml_key.as_ref().map(|_| "TOML"),
    ]
    .into_iter()
    .flatten()
    .collect();
    if sources.len() > 1 {
        warn!(
            sources = %sources.join(", "),
            "Embedding API key configured in several places, using highest priority"
        );
    }

    if let Some(key) = db_key {
        info!("Embedding API key loaded from database");
        return Ok(key);
    }
    if let Some(key) = env_key {
        info!("Embedding API key loaded from environment");
        return Ok(key);
    }
    if let Some(key) = toml_key {
        info!("Embedding API key loaded from TOML config");
        return Ok(key);
    }

    Err(Error::Config(format!(
        "Embedding API key not configured. Set the `{}` setting, the {} environment variable, or `embedding.api_key` in the config file",
        settings::EMBEDDING_API_KEY,
        EMBEDDING_API_KEY_ENV
    )))
}

/// Low-confidence threshold, with a database override when present and in range
pub async fn resolve_low_confidence_threshold(
    db: &SqlitePool,
    config: &MatchingConfig,
) -> Result<f64> {
    match settings::get_low_confidence_threshold(db).await? {
        Some(value) if (0.0..=config.auto_accept_threshold).contains(&value) => {
            info!(threshold = value, "Low-confidence threshold overridden from database");
            Ok(value)
        }
        Some(value) => {
            warn!(
                threshold = value,
                fallback = config.low_confidence_threshold,
                "Ignoring out-of-range low-confidence threshold setting"
            );
            Ok(config.low_confidence_threshold)
        }
        None => Ok(config.low_confidence_threshold),
    }
}

/// Non-empty after trimming
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_documented_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.matching.auto_accept_threshold, 0.90);
        assert_eq!(config.matching.low_confidence_threshold, 0.70);
        assert_eq!(config.matching.max_alternatives, 5);
        assert_eq!(config.similarity.default_threshold, 0.75);
        assert_eq!(config.embedding.dimension, 768);
        assert_eq!(config.review.spot_check_rate, 0.0);
        assert_eq!(config.base.server.port, 5740);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            root_folder = "/srv/trialmatch"

            [logging]
            level = "debug"

            [matching]
            auto_accept_threshold = 0.93

            [[review.reviewers]]
            id = "alice"
            expertise = ["trial_matching"]
            "#,
        )
        .unwrap();

        assert_eq!(config.base.logging.level, "debug");
        assert_eq!(config.matching.auto_accept_threshold, 0.93);
        assert_eq!(config.matching.exact_identifier_confidence, 0.95);

        let alice = config.review.reviewer("alice").unwrap();
        assert!(alice.handles(ReviewType::TrialMatching));
        assert!(!alice.handles(ReviewType::ProtocolQuality));
        assert!(config.review.reviewer("bob").is_none());
    }

    #[test]
    fn reviewer_without_expertise_handles_everything() {
        let reviewer = ReviewerConfig {
            id: "generalist".to_string(),
            name: None,
            expertise: vec![],
        };
        assert!(reviewer.handles(ReviewType::BatchCompletion));
    }
}

//! Similarity Engine
//!
//! Embeds free-text criteria, compares them by cosine similarity and keeps a
//! per-concept acceptance threshold that drifts with reviewer corrections.
//!
//! Thresholds start at the configured default (0.75) and move by the running
//! average of recorded deltas, always clamped to [0.5, 0.95]. A `merge`
//! correction pulls the threshold toward the similarity the reviewer accepted
//! (at most 0.15 per event); a `separate` correction pushes it up by 0.05.

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use trialmatch_common::{EngineEvent, EventBus};
use uuid::Uuid;

use super::embedding_client::{EmbeddingError, EmbeddingProvider};
use crate::config::SimilarityConfig;
use crate::db::{audit, corrections, embeddings};
use crate::models::{CorrectionAction, CorrectionEvent, Criterion, CriterionPairScore, CriterionVector};

#[derive(Debug, Error)]
pub enum SimilarityError {
    #[error("Embedding failed for criterion {criterion_id}: {source}")]
    Embedding {
        criterion_id: String,
        #[source]
        source: EmbeddingError,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(#[from] trialmatch_common::Error),
}

/// Accumulated corrections for one concept tag
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ThresholdState {
    delta_sum: f64,
    count: i64,
}

/// Outcome of `record_correction`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedCorrection {
    pub event: CorrectionEvent,
    pub previous_threshold: f64,
    pub new_threshold: f64,
}

/// Outcome of `compare_sets`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetComparison {
    pub concept_tag: String,
    pub threshold: f64,
    /// Pairs at or above the threshold, best first
    pub matches: Vec<CriterionPairScore>,
    /// Criteria left out because their embedding failed
    pub excluded: Vec<String>,
}

pub struct SimilarityEngine {
    db: SqlitePool,
    provider: Arc<dyn EmbeddingProvider>,
    config: SimilarityConfig,
    embedding_timeout: Duration,
    max_wait_ms: u64,
    thresholds: RwLock<HashMap<String, ThresholdState>>,
    events: EventBus,
}

impl SimilarityEngine {
    pub fn new(
        db: SqlitePool,
        provider: Arc<dyn EmbeddingProvider>,
        config: SimilarityConfig,
        embedding_timeout: Duration,
        max_wait_ms: u64,
        events: EventBus,
    ) -> Self {
        Self {
            db,
            provider,
            config,
            embedding_timeout,
            max_wait_ms,
            thresholds: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Vector for a criterion, generated only when missing or from another model
    pub async fn embed(&self, criterion: &Criterion) -> Result<CriterionVector, SimilarityError> {
        let model_version = self.provider.model_version();
        let dimension = self.provider.dimension();

        match embeddings::get_vector(&self.db, &criterion.id).await {
            Ok(Some(stored)) if stored.model_version == model_version && stored.values.len() == dimension => {
                return Ok(stored);
            }
            Ok(Some(stored)) => debug!(
                criterion_id = %criterion.id,
                stored_model = %stored.model_version,
                active_model = %model_version,
                "Regenerating stale embedding"
            ),
            Ok(None) => {}
            Err(e) => warn!(criterion_id = %criterion.id, error = %e, "Stored embedding unreadable, regenerating"),
        }

        let embedding_failure = |source: EmbeddingError| SimilarityError::Embedding {
            criterion_id: criterion.id.clone(),
            source,
        };

        let values = tokio::time::timeout(self.embedding_timeout, self.provider.generate_embedding(&criterion.text))
            .await
            .map_err(|_| embedding_failure(EmbeddingError::Timeout))?
            .map_err(embedding_failure)?;

        if values.len() != dimension {
            return Err(embedding_failure(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: values.len(),
            }));
        }

        let vector = CriterionVector {
            criterion_id: criterion.id.clone(),
            values,
            model_version: model_version.to_string(),
            generated_at: Utc::now(),
        };
        embeddings::upsert_vector(&self.db, &vector, &criterion.text, self.max_wait_ms).await?;
        Ok(vector)
    }

    /// Current threshold for a concept tag
    pub async fn threshold_for(&self, concept_tag: &str) -> Result<f64, SimilarityError> {
        self.ensure_loaded(concept_tag).await?;
        let thresholds = self.thresholds.read().await;
        let state = thresholds.get(concept_tag).copied().unwrap_or_default();
        Ok(self.threshold_from(state))
    }

    /// Apply a reviewer's verdict on a criterion pair to the concept threshold
    pub async fn record_correction(
        &self,
        criterion_a: &str,
        criterion_b: &str,
        action: CorrectionAction,
        similarity: f64,
        concept_tag: &str,
        comparison_id: Option<String>,
    ) -> Result<AppliedCorrection, SimilarityError> {
        if concept_tag.trim().is_empty() {
            return Err(SimilarityError::InvalidInput("concept tag is empty".to_string()));
        }
        if !similarity.is_finite() || !(-1.0..=1.0).contains(&similarity) {
            return Err(SimilarityError::InvalidInput(format!(
                "similarity {} is outside [-1, 1]",
                similarity
            )));
        }

        self.ensure_loaded(concept_tag).await?;

        let (delta, previous_threshold, new_threshold) = {
            let mut thresholds = self.thresholds.write().await;
            let state = thresholds.entry(concept_tag.to_string()).or_default();
            let previous = self.threshold_from(*state);
            let delta = self.correction_delta(action, similarity, previous);
            state.delta_sum += delta;
            state.count += 1;
            (delta, previous, self.threshold_from(*state))
        };

        let event = CorrectionEvent {
            id: Uuid::new_v4(),
            criterion_a: criterion_a.to_string(),
            criterion_b: criterion_b.to_string(),
            action,
            similarity,
            concept_tag: concept_tag.to_string(),
            threshold_delta: delta,
            comparison_id,
            recorded_at: Utc::now(),
        };

        if let Err(e) = corrections::insert_correction(&self.db, &event, self.max_wait_ms).await {
            let mut thresholds = self.thresholds.write().await;
            if let Some(state) = thresholds.get_mut(concept_tag) {
                state.delta_sum -= delta;
                state.count -= 1;
            }
            return Err(e.into());
        }

        info!(
            concept_tag,
            action = action.as_str(),
            similarity,
            delta,
            previous_threshold,
            new_threshold,
            "Threshold correction recorded"
        );

        audit::record_lossy(
            &self.db,
            None,
            audit::ACTION_THRESHOLD_CORRECTED,
            Some(similarity),
            json!({
                "correction_id": event.id,
                "concept_tag": concept_tag,
                "action": action.as_str(),
                "criterion_a": criterion_a,
                "criterion_b": criterion_b,
                "delta": delta,
                "new_threshold": new_threshold,
            }),
            self.max_wait_ms,
        )
        .await;

        self.events.emit_lossy(EngineEvent::ThresholdAdjusted {
            concept_tag: concept_tag.to_string(),
            delta,
            new_threshold,
            timestamp: Utc::now(),
        });

        Ok(AppliedCorrection {
            event,
            previous_threshold,
            new_threshold,
        })
    }

    /// All pairs across the two sets scoring at or above the tag's threshold
    ///
    /// Criteria whose embedding fails are excluded, never scored as zero.
    pub async fn compare_sets(
        &self,
        set_a: &[Criterion],
        set_b: &[Criterion],
        concept_tag: &str,
    ) -> Result<SetComparison, SimilarityError> {
        let threshold = self.threshold_for(concept_tag).await?;

        let (vectors_a, vectors_b) = tokio::join!(
            join_all(set_a.iter().map(|c| self.embed(c))),
            join_all(set_b.iter().map(|c| self.embed(c))),
        );

        let mut excluded = Vec::new();
        let mut keep = |criteria: &[Criterion], results: Vec<Result<CriterionVector, SimilarityError>>| {
            criteria
                .iter()
                .zip(results)
                .filter_map(|(criterion, result)| match result {
                    Ok(vector) => Some((criterion.id.clone(), vector.values)),
                    Err(e) => {
                        warn!(criterion_id = %criterion.id, error = %e, "Criterion excluded from comparison");
                        excluded.push(criterion.id.clone());
                        None
                    }
                })
                .collect::<Vec<_>>()
        };
        let embedded_a = keep(set_a, vectors_a);
        let embedded_b = keep(set_b, vectors_b);

        let mut matches: Vec<CriterionPairScore> = embedded_a
            .iter()
            .flat_map(|(id_a, a)| {
                embedded_b.iter().map(move |(id_b, b)| CriterionPairScore {
                    criterion_a: id_a.clone(),
                    criterion_b: id_b.clone(),
                    score: cosine_similarity(a, b),
                })
            })
            .filter(|pair| pair.score >= threshold)
            .collect();
        matches.sort_by(|x, y| y.score.partial_cmp(&x.score).unwrap_or(std::cmp::Ordering::Equal));

        debug!(
            concept_tag,
            threshold,
            compared = embedded_a.len() * embedded_b.len(),
            matched = matches.len(),
            excluded = excluded.len(),
            "Criteria sets compared"
        );

        Ok(SetComparison {
            concept_tag: concept_tag.to_string(),
            threshold,
            matches,
            excluded,
        })
    }

    async fn ensure_loaded(&self, concept_tag: &str) -> Result<(), SimilarityError> {
        if self.thresholds.read().await.contains_key(concept_tag) {
            return Ok(());
        }
        let (delta_sum, count) = corrections::delta_totals(&self.db, concept_tag).await?;
        self.thresholds
            .write()
            .await
            .entry(concept_tag.to_string())
            .or_insert(ThresholdState { delta_sum, count });
        Ok(())
    }

    fn threshold_from(&self, state: ThresholdState) -> f64 {
        let adjustment = if state.count > 0 {
            state.delta_sum / state.count as f64
        } else {
            0.0
        };
        (self.config.default_threshold + adjustment).clamp(self.config.min_threshold, self.config.max_threshold)
    }

    fn correction_delta(&self, action: CorrectionAction, similarity: f64, current: f64) -> f64 {
        match action {
            CorrectionAction::Merge => (similarity - current).max(-self.config.max_merge_decrease),
            CorrectionAction::Separate => self.config.separate_increase,
        }
    }
}

/// Cosine similarity; 0 for empty, mismatched or zero-magnitude vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

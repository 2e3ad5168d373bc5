//! Identity Resolver
//!
//! Decides which catalog record an extracted document most likely belongs to.
//!
//! # Pipeline
//! 1. Normalize the extracted identity
//! 2. Duplicate check on the document hash; a hit short-circuits everything
//! 3. Run the five strategies concurrently, each skipped when its inputs are absent:
//!    exact identifier (0.95), registry number (0.99), fuzzy identifier + sponsor
//!    (0.85 above the gate), title + phase (0.75 × similarity above the gate),
//!    sponsor + phase (0.70)
//! 4. Keep one candidate per record (highest confidence), rank, classify
//! 5. Persist, audit and publish the result
//!
//! A strategy whose lookup errors or times out is degraded, not fatal. Only
//! when every attempted strategy fails does `resolve` return an error.

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use trialmatch_common::{EngineEvent, EventBus};
use uuid::Uuid;

use super::hash_deduplicator::{HashDeduplicator, HashResult};
use super::string_similarity::{identifier_similarity, title_similarity};
use crate::config::MatchingConfig;
use crate::db::{audit, catalog::CatalogStore, matches};
use crate::models::{
    CandidateRecord, ExtractedIdentity, MatchCandidate, MatchJustification, MatchResult,
    MatchReviewStatus, MatchType,
};

#[derive(Debug, Error)]
pub enum ResolveError {
    /// Every strategy that had inputs failed its catalog lookup
    #[error("All {attempted} attempted catalog lookups failed; last error: {last_error}")]
    AllLookupsFailed { attempted: usize, last_error: String },

    #[error("Match result not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Storage(#[from] trialmatch_common::Error),
}

/// Maps a best-match confidence to a review status
///
/// Non-decreasing in confidence: below `low` → `needs_manual_review`,
/// `[low, auto_accept)` → `pending`, at or above `auto_accept` → `approved`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationPolicy {
    pub auto_accept: f64,
    pub low_confidence: f64,
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self {
            auto_accept: 0.90,
            low_confidence: 0.70,
        }
    }
}

impl ClassificationPolicy {
    pub fn classify(&self, confidence: Option<f64>) -> MatchReviewStatus {
        match confidence {
            None => MatchReviewStatus::NeedsManualReview,
            Some(c) if c >= self.auto_accept => MatchReviewStatus::Approved,
            Some(c) if c >= self.low_confidence => MatchReviewStatus::Pending,
            Some(_) => MatchReviewStatus::NeedsManualReview,
        }
    }
}

/// Result of one strategy
#[derive(Debug)]
enum StrategyOutcome {
    /// Inputs absent; the strategy did not run
    Skipped,
    /// Lookup errored or timed out
    Failed(String),
    Matched(Vec<MatchCandidate>),
}

pub struct IdentityResolver {
    db: SqlitePool,
    catalog: Arc<dyn CatalogStore>,
    dedup: HashDeduplicator,
    config: MatchingConfig,
    policy: ClassificationPolicy,
    events: EventBus,
}

impl IdentityResolver {
    /// `low_confidence_threshold` is the resolved value (config or settings override)
    pub fn new(
        db: SqlitePool,
        catalog: Arc<dyn CatalogStore>,
        config: MatchingConfig,
        low_confidence_threshold: f64,
        events: EventBus,
    ) -> Self {
        let policy = ClassificationPolicy {
            auto_accept: config.auto_accept_threshold,
            low_confidence: low_confidence_threshold,
        };
        Self {
            dedup: HashDeduplicator::new(db.clone()),
            db,
            catalog,
            config,
            policy,
            events,
        }
    }

    pub fn policy(&self) -> ClassificationPolicy {
        self.policy
    }

    /// Resolve one extracted identity against the catalog
    ///
    /// `document_path` is hashed for duplicate detection unless the identity
    /// already carries a content hash.
    pub async fn resolve(
        &self,
        identity: &ExtractedIdentity,
        document_path: Option<&Path>,
    ) -> Result<MatchResult, ResolveError> {
        let identity = identity.normalized();
        let job_id = identity.processing_job_id;

        let hash = match document_path {
            Some(path) => {
                self.dedup
                    .document_hash(identity.content_hash.as_deref(), path)
                    .await
            }
            None => identity
                .content_hash
                .as_deref()
                .map(|h| h.trim().to_lowercase())
                .unwrap_or_default(),
        };

        if let HashResult::Duplicate { hash, prior } = self.dedup.check_duplicate(&hash, job_id).await? {
            return self.answer_from_duplicate(identity, hash, *prior).await;
        }

        if !identity.has_identity_fields() {
            info!(job_id = %job_id, "No identity fields extracted, routing to manual review");
        }

        let (exact, registry, fuzzy, title, sponsor_phase) = tokio::join!(
            self.exact_identifier(&identity),
            self.registry_number(&identity),
            self.fuzzy_identifier_sponsor(&identity),
            self.title_phase(&identity),
            self.sponsor_phase(&identity),
        );
        let outcomes = [
            ("exact_identifier", exact),
            ("registry_number", registry),
            ("fuzzy_identifier_sponsor", fuzzy),
            ("title_phase", title),
            ("sponsor_phase", sponsor_phase),
        ];

        let mut attempted = 0;
        let mut failures = Vec::new();
        let mut candidates = Vec::new();
        for (strategy, outcome) in outcomes {
            match outcome {
                StrategyOutcome::Skipped => debug!(strategy, "Strategy skipped, inputs absent"),
                StrategyOutcome::Failed(error) => {
                    attempted += 1;
                    failures.push(error);
                }
                StrategyOutcome::Matched(found) => {
                    attempted += 1;
                    debug!(strategy, candidates = found.len(), "Strategy finished");
                    candidates.extend(found);
                }
            }
        }

        if attempted > 0 && failures.len() == attempted {
            return Err(ResolveError::AllLookupsFailed {
                attempted,
                last_error: failures.pop().unwrap_or_default(),
            });
        }

        let ranked = rank_candidates(candidates);
        let total_candidates = ranked.len();
        let mut ranked = ranked.into_iter();
        let best_match = ranked.next();
        let alternatives: Vec<MatchCandidate> = ranked.take(self.config.max_alternatives).collect();
        let review_status = self.policy.classify(best_match.as_ref().map(|m| m.confidence));

        let result = MatchResult {
            id: Uuid::new_v4(),
            processing_job_id: job_id,
            source_file_path: identity.source_file_path.clone(),
            document_hash: hash,
            extracted: identity,
            best_match,
            alternatives,
            total_candidates,
            review_status,
            duplicate_of: None,
            reviewed_by: None,
            review_notes: None,
            reviewed_at: None,
            resolved_at: Utc::now(),
        };

        info!(
            job_id = %job_id,
            status = result.review_status.as_str(),
            confidence = result.confidence(),
            candidates = total_candidates,
            degraded_strategies = failures.len(),
            "Resolved document identity"
        );

        self.commit(&result, audit::ACTION_MATCH_RESOLVED, json!({
            "match_id": result.id,
            "match_type": result.best_match.as_ref().map(|m| m.match_type.as_str()),
            "matched_record_id": result.matched_record_id(),
            "review_status": result.review_status.as_str(),
            "total_candidates": total_candidates,
            "degraded_strategies": failures,
        }))
        .await?;

        Ok(result)
    }

    /// Latest result for a processing job
    pub async fn get_match_status(&self, job_id: Uuid) -> Result<Option<MatchResult>, ResolveError> {
        Ok(matches::get_latest_for_job(&self.db, job_id).await?)
    }

    pub async fn approve_match(
        &self,
        match_id: Uuid,
        reviewer_id: &str,
        notes: Option<&str>,
    ) -> Result<MatchResult, ResolveError> {
        self.set_review_status(match_id, MatchReviewStatus::Approved, reviewer_id, notes, audit::ACTION_MATCH_APPROVED)
            .await
    }

    pub async fn reject_match(
        &self,
        match_id: Uuid,
        reviewer_id: &str,
        notes: Option<&str>,
    ) -> Result<MatchResult, ResolveError> {
        self.set_review_status(match_id, MatchReviewStatus::Rejected, reviewer_id, notes, audit::ACTION_MATCH_REJECTED)
            .await
    }

    async fn set_review_status(
        &self,
        match_id: Uuid,
        status: MatchReviewStatus,
        reviewer_id: &str,
        notes: Option<&str>,
        action: &str,
    ) -> Result<MatchResult, ResolveError> {
        let mut result = matches::get_match_result(&self.db, match_id)
            .await?
            .ok_or(ResolveError::NotFound(match_id))?;

        let reviewed_at = Utc::now();
        matches::set_review_status(
            &self.db,
            match_id,
            status,
            reviewer_id,
            notes,
            reviewed_at,
            self.config.db_max_lock_wait_ms,
        )
        .await?;

        result.review_status = status;
        result.reviewed_by = Some(reviewer_id.to_string());
        result.review_notes = notes.map(str::to_string);
        result.reviewed_at = Some(reviewed_at);

        info!(match_id = %match_id, reviewer = reviewer_id, status = status.as_str(), "Match reviewed");
        audit::record_lossy(
            &self.db,
            Some(result.processing_job_id),
            action,
            Some(result.confidence()),
            json!({ "match_id": match_id, "reviewer_id": reviewer_id, "notes": notes }),
            self.config.db_max_lock_wait_ms,
        )
        .await;

        Ok(result)
    }

    async fn answer_from_duplicate(
        &self,
        identity: ExtractedIdentity,
        hash: String,
        prior: MatchResult,
    ) -> Result<MatchResult, ResolveError> {
        let job_id = identity.processing_job_id;
        let best_match = prior.best_match.map(|prior_best| {
            MatchCandidate::new(
                prior_best.record,
                MatchType::DuplicateDocument,
                1.0,
                MatchJustification::new(
                    format!("Identical document already processed in job {}", prior.processing_job_id),
                    vec![format!("Document hash: {}", hash)],
                ),
            )
        });

        let result = MatchResult {
            id: Uuid::new_v4(),
            processing_job_id: job_id,
            source_file_path: identity.source_file_path.clone(),
            document_hash: hash,
            extracted: identity,
            total_candidates: usize::from(best_match.is_some()),
            best_match,
            alternatives: Vec::new(),
            review_status: MatchReviewStatus::Approved,
            duplicate_of: Some(prior.processing_job_id),
            reviewed_by: None,
            review_notes: None,
            reviewed_at: None,
            resolved_at: Utc::now(),
        };

        info!(job_id = %job_id, duplicate_of = %prior.processing_job_id, "Answered from duplicate document");

        self.commit(&result, audit::ACTION_DUPLICATE_DETECTED, json!({
            "match_id": result.id,
            "duplicate_of": prior.processing_job_id,
            "matched_record_id": result.matched_record_id(),
        }))
        .await?;

        Ok(result)
    }

    /// Persist, audit and publish
    async fn commit(
        &self,
        result: &MatchResult,
        action: &str,
        details: serde_json::Value,
    ) -> Result<(), ResolveError> {
        let max_wait_ms = self.config.db_max_lock_wait_ms;
        matches::save_match_result(&self.db, result, max_wait_ms).await?;
        audit::record_lossy(
            &self.db,
            Some(result.processing_job_id),
            action,
            Some(result.confidence()),
            details,
            max_wait_ms,
        )
        .await;

        self.events.emit_lossy(EngineEvent::MatchResolved {
            match_id: result.id,
            processing_job_id: result.processing_job_id,
            review_status: result.review_status.as_str().to_string(),
            confidence: result.confidence(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Catalog call bounded by the lookup timeout
    async fn lookup<F>(&self, strategy: &'static str, query: F) -> Result<Vec<CandidateRecord>, String>
    where
        F: Future<Output = trialmatch_common::Result<Vec<CandidateRecord>>>,
    {
        let timeout = Duration::from_millis(self.config.lookup_timeout_ms);
        match tokio::time::timeout(timeout, query).await {
            Ok(Ok(records)) => Ok(records),
            Ok(Err(e)) => {
                warn!(strategy, error = %e, "Catalog lookup failed, strategy degraded");
                Err(format!("{}: {}", strategy, e))
            }
            Err(_) => {
                warn!(strategy, timeout_ms = self.config.lookup_timeout_ms, "Catalog lookup timed out, strategy degraded");
                Err(format!("{}: timed out after {} ms", strategy, self.config.lookup_timeout_ms))
            }
        }
    }

    async fn exact_identifier(&self, identity: &ExtractedIdentity) -> StrategyOutcome {
        let Some(protocol) = identity.protocol_number.as_deref() else {
            return StrategyOutcome::Skipped;
        };
        match self
            .lookup("exact_identifier", self.catalog.find_by_exact_identifier(protocol))
            .await
        {
            Ok(records) => StrategyOutcome::Matched(
                records
                    .into_iter()
                    .map(|record| {
                        MatchCandidate::new(
                            record,
                            MatchType::ExactIdentifier,
                            self.config.exact_identifier_confidence,
                            MatchJustification::new(
                                format!("Exact protocol number match: {}", protocol),
                                vec![],
                            ),
                        )
                    })
                    .collect(),
            ),
            Err(e) => StrategyOutcome::Failed(e),
        }
    }

    async fn registry_number(&self, identity: &ExtractedIdentity) -> StrategyOutcome {
        let Some(registry) = identity.registry_number.as_deref() else {
            return StrategyOutcome::Skipped;
        };
        match self
            .lookup("registry_number", self.catalog.find_by_registry_number(registry))
            .await
        {
            Ok(records) => StrategyOutcome::Matched(
                records
                    .into_iter()
                    .map(|record| {
                        MatchCandidate::new(
                            record,
                            MatchType::RegistryNumber,
                            self.config.registry_number_confidence,
                            MatchJustification::new(
                                format!("Registry number match: {}", registry),
                                vec![],
                            ),
                        )
                    })
                    .collect(),
            ),
            Err(e) => StrategyOutcome::Failed(e),
        }
    }

    async fn fuzzy_identifier_sponsor(&self, identity: &ExtractedIdentity) -> StrategyOutcome {
        let (Some(protocol), Some(sponsor)) =
            (identity.protocol_number.as_deref(), identity.sponsor.as_deref())
        else {
            return StrategyOutcome::Skipped;
        };

        let records = match self
            .lookup(
                "fuzzy_identifier_sponsor",
                self.catalog.find_by_sponsor(sponsor, self.config.sponsor_pool_limit),
            )
            .await
        {
            Ok(records) => records,
            Err(e) => return StrategyOutcome::Failed(e),
        };

        let candidates = records
            .into_iter()
            .filter_map(|record| {
                let similarity = identifier_similarity(
                    protocol,
                    &record.protocol_number,
                    self.config.version_strip_similarity,
                );
                if similarity < self.config.fuzzy_identifier_gate {
                    return None;
                }
                let justification = MatchJustification::new(
                    format!("Similar protocol ({:.2}) + sponsor match", similarity),
                    vec![
                        format!("Extracted: {}, catalog: {}", protocol, record.protocol_number),
                        format!("Sponsor match: {}", sponsor),
                    ],
                );
                Some(MatchCandidate::new(
                    record,
                    MatchType::FuzzyIdentifierSponsor,
                    self.config.fuzzy_identifier_confidence,
                    justification,
                ))
            })
            .collect();
        StrategyOutcome::Matched(candidates)
    }

    async fn title_phase(&self, identity: &ExtractedIdentity) -> StrategyOutcome {
        let (Some(title), Some(phase)) = (identity.title.as_deref(), identity.phase.as_deref()) else {
            return StrategyOutcome::Skipped;
        };

        let records = match self
            .lookup(
                "title_phase",
                self.catalog.find_by_phase(phase, self.config.phase_pool_limit),
            )
            .await
        {
            Ok(records) => records,
            Err(e) => return StrategyOutcome::Failed(e),
        };

        let candidates = records
            .into_iter()
            .filter_map(|record| {
                let similarity = title_similarity(title, &record.title);
                if similarity < self.config.title_similarity_gate {
                    return None;
                }
                let justification = MatchJustification::new(
                    format!("Title similarity ({:.2}) within {}", similarity, phase),
                    vec![format!("Catalog title: {}", record.title)],
                );
                Some(MatchCandidate::new(
                    record,
                    MatchType::TitlePhase,
                    self.config.title_confidence_weight * similarity,
                    justification,
                ))
            })
            .collect();
        StrategyOutcome::Matched(candidates)
    }

    async fn sponsor_phase(&self, identity: &ExtractedIdentity) -> StrategyOutcome {
        let (Some(sponsor), Some(phase)) = (identity.sponsor.as_deref(), identity.phase.as_deref()) else {
            return StrategyOutcome::Skipped;
        };
        match self
            .lookup(
                "sponsor_phase",
                self.catalog
                    .find_by_sponsor_and_phase(sponsor, phase, self.config.sponsor_phase_pool_limit),
            )
            .await
        {
            Ok(records) => StrategyOutcome::Matched(
                records
                    .into_iter()
                    .map(|record| {
                        MatchCandidate::new(
                            record,
                            MatchType::SponsorPhase,
                            self.config.sponsor_phase_confidence,
                            MatchJustification::new(
                                format!("Sponsor + phase combination: {}, {}", sponsor, phase),
                                vec![],
                            ),
                        )
                    })
                    .collect(),
            ),
            Err(e) => StrategyOutcome::Failed(e),
        }
    }
}

/// One candidate per record, highest confidence first
///
/// On equal confidence the earlier strategy's candidate is kept; equal
/// confidences across records are ordered by record id so runs are stable.
pub fn rank_candidates(candidates: Vec<MatchCandidate>) -> Vec<MatchCandidate> {
    let mut best: HashMap<Uuid, MatchCandidate> = HashMap::new();
    for candidate in candidates {
        match best.get(&candidate.record.id) {
            Some(existing) if existing.confidence >= candidate.confidence => {}
            _ => {
                best.insert(candidate.record.id, candidate);
            }
        }
    }

    let mut ranked: Vec<MatchCandidate> = best.into_values().collect();
    ranked.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    ranked
}

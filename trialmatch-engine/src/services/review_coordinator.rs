//! Review Workflow Coordinator
//!
//! Owns the review queue and drives each item through
//! `pending → in_review → {approved | rejected | needs_more_info | escalated}`.
//!
//! Every transition is a conditional update in the store first; the
//! in-memory queue is only touched after the store has accepted the change,
//! so two workers racing for the same item cannot both win. Decisions feed
//! back into match results (approve) and the job tracker (reject).

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info, warn};
use trialmatch_common::{EngineEvent, EventBus};
use uuid::Uuid;

use super::review_queue::ReviewQueue;
use crate::config::ReviewConfig;
use crate::db::{audit, jobs, matches, reviews};
use crate::models::{
    JobOutcome, JobStatus, MatchReviewStatus, ReviewDecision, ReviewItem, ReviewPriority,
    ReviewStatus, ReviewType,
};

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Review item not found: {0}")]
    NotFound(Uuid),

    /// Item is not in the state the operation requires
    #[error("Review state conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(#[from] trialmatch_common::Error),
}

/// Why and how urgently a job needs a human look
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRequirement {
    pub review_type: ReviewType,
    pub priority: ReviewPriority,
    pub reasons: Vec<String>,
}

/// Decide whether a job outcome enters the review queue
///
/// The most urgent applicable rule sets the priority; every applicable rule
/// contributes a reason. `spot_check_draw` is a uniform sample in [0, 1)
/// compared against the configured spot-check rate for otherwise clean jobs.
pub fn review_requirement(
    outcome: &JobOutcome,
    config: &ReviewConfig,
    spot_check_draw: f64,
) -> Option<ReviewRequirement> {
    let mut reasons = Vec::new();
    let mut priority: Option<ReviewPriority> = None;
    let mut review_type = ReviewType::ProtocolQuality;

    match outcome.status {
        JobStatus::Failed => {
            reasons.push("Processing failed".to_string());
            raise(ReviewPriority::Critical, &mut priority);
        }
        JobStatus::CompletedWithErrors => {
            reasons.push("Processing completed with errors".to_string());
            raise(ReviewPriority::High, &mut priority);
        }
        JobStatus::Completed | JobStatus::Processing | JobStatus::NeedsReprocessing => {}
    }

    if let Some(status) = outcome.match_status.filter(|s| s.requires_review()) {
        let confidence = outcome.match_confidence.unwrap_or(0.0);
        review_type = ReviewType::TrialMatching;
        if outcome.match_confidence.is_none()
            || (status == MatchReviewStatus::NeedsManualReview && confidence == 0.0)
        {
            reasons.push("No catalog match found".to_string());
            raise(ReviewPriority::High, &mut priority);
        } else if confidence < config.high_priority_below {
            reasons.push(format!("Low confidence match: {:.2}", confidence));
            raise(ReviewPriority::High, &mut priority);
        } else if confidence < config.medium_priority_below {
            reasons.push(format!("Medium confidence match: {:.2}", confidence));
            raise(ReviewPriority::Medium, &mut priority);
        } else {
            reasons.push(format!("Match awaiting confirmation: {:.2}", confidence));
            raise(ReviewPriority::Low, &mut priority);
        }
    }

    if let Some(quality) = outcome.quality {
        if quality.field_coverage_percentage < config.min_field_coverage {
            reasons.push(format!("Low field coverage: {:.0}%", quality.field_coverage_percentage));
            raise(ReviewPriority::High, &mut priority);
        }
        if quality.extraction_confidence < config.min_extraction_confidence {
            reasons.push(format!("Low extraction confidence: {:.2}", quality.extraction_confidence));
            raise(ReviewPriority::High, &mut priority);
        }
    }

    if priority.is_none() && outcome.status == JobStatus::Completed && spot_check_draw < config.spot_check_rate {
        reasons.push("Routine spot check".to_string());
        review_type = ReviewType::TrialMatching;
        raise(ReviewPriority::Low, &mut priority);
    }

    priority.map(|priority| ReviewRequirement {
        review_type,
        priority,
        reasons,
    })
}

fn raise(priority: ReviewPriority, current: &mut Option<ReviewPriority>) {
    *current = Some(current.map_or(priority, |c| c.min(priority)));
}

/// Queue entry as shown to reviewers
#[derive(Debug, Clone, Serialize)]
pub struct QueuedReview {
    #[serde(flatten)]
    pub item: ReviewItem,
    pub wait_minutes: i64,
    pub estimated_review_minutes: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriorityGroup {
    pub priority: ReviewPriority,
    pub items: Vec<QueuedReview>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PriorityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl From<[usize; 4]> for PriorityCounts {
    fn from(counts: [usize; 4]) -> Self {
        Self {
            critical: counts[0],
            high: counts[1],
            medium: counts[2],
            low: counts[3],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatistics {
    /// Items in this (possibly filtered) view
    pub total_items: usize,
    pub average_wait_minutes: f64,
    pub estimated_review_minutes: u32,
    /// Whole queue, unfiltered
    pub queue_by_priority: PriorityCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewQueueView {
    /// Non-empty groups, most urgent first
    pub queue: Vec<PriorityGroup>,
    pub statistics: QueueStatistics,
    pub retrieved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewerStatistics {
    pub window_days: i64,
    pub total_completed: usize,
    pub average_review_minutes: f64,
    pub approval_rate: f64,
    pub currently_assigned: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewerDashboard {
    pub reviewer_id: String,
    pub assigned_reviews: Vec<ReviewItem>,
    pub available_queue: Vec<PriorityGroup>,
    pub statistics: ReviewerStatistics,
    pub dashboard_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewMetrics {
    pub total_reviews: i64,
    pub approved: i64,
    pub approval_rate: f64,
    pub pending: PriorityCounts,
}

/// Result of `complete_review`
#[derive(Debug, Clone, Serialize)]
pub struct CompletedReview {
    pub item: ReviewItem,
    /// New critical item when the decision was `escalated`
    pub escalation: Option<ReviewItem>,
}

pub struct ReviewCoordinator {
    db: SqlitePool,
    queue: ReviewQueue,
    config: ReviewConfig,
    max_wait_ms: u64,
    events: EventBus,
}

impl ReviewCoordinator {
    pub fn new(db: SqlitePool, config: ReviewConfig, max_wait_ms: u64, events: EventBus) -> Self {
        Self {
            db,
            queue: ReviewQueue::new(),
            config,
            max_wait_ms,
            events,
        }
    }

    /// Reload pending items from the store; returns how many were queued
    pub async fn restore(&self) -> Result<usize, ReviewError> {
        let pending = reviews::list_pending(&self.db).await?;
        let count = pending.len();
        for item in pending {
            self.queue.enqueue(item).await;
        }
        info!(count, "Review queue restored");
        Ok(count)
    }

    pub async fn enqueue(
        &self,
        job_id: Uuid,
        review_type: ReviewType,
        priority: ReviewPriority,
        reasons: Vec<String>,
    ) -> Result<ReviewItem, ReviewError> {
        self.insert_item(ReviewItem::new(job_id, review_type, priority, reasons)).await
    }

    /// Apply the review policy to a finished job, queueing it when required
    pub async fn submit_job_outcome(&self, outcome: &JobOutcome) -> Result<Option<ReviewItem>, ReviewError> {
        let draw = if self.config.spot_check_rate > 0.0 {
            rand::random::<f64>()
        } else {
            1.0
        };
        match review_requirement(outcome, &self.config, draw) {
            Some(requirement) => {
                let item = self
                    .enqueue(outcome.job_id, requirement.review_type, requirement.priority, requirement.reasons)
                    .await?;
                Ok(Some(item))
            }
            None => {
                debug!(job_id = %outcome.job_id, "Job needs no review");
                Ok(None)
            }
        }
    }

    /// Take a pending item; fails if someone already holds it
    pub async fn assign_review(&self, review_id: Uuid, reviewer_id: &str) -> Result<ReviewItem, ReviewError> {
        let reviewer_id = validate_reviewer(reviewer_id)?;
        let now = Utc::now();

        if !reviews::try_assign(&self.db, review_id, reviewer_id, now, self.max_wait_ms).await? {
            return Err(self.transition_refused(review_id, "assign").await);
        }

        let item = match self.queue.remove(review_id).await {
            Some(mut item) => {
                item.status = ReviewStatus::InReview;
                item.assigned_to = Some(reviewer_id.to_string());
                item.assigned_at = Some(now);
                item
            }
            None => self.load(review_id).await?,
        };

        info!(review_id = %review_id, reviewer = reviewer_id, "Review assigned");
        audit::record_lossy(
            &self.db,
            Some(item.job_id),
            audit::ACTION_REVIEW_ASSIGNED,
            None,
            json!({ "review_id": review_id, "reviewer_id": reviewer_id }),
            self.max_wait_ms,
        )
        .await;
        self.events.emit_lossy(EngineEvent::ReviewAssigned {
            review_id,
            reviewer_id: reviewer_id.to_string(),
            timestamp: now,
        });
        Ok(item)
    }

    /// Hand an in-review item back to the queue
    pub async fn release_review(&self, review_id: Uuid, reviewer_id: &str) -> Result<ReviewItem, ReviewError> {
        let reviewer_id = validate_reviewer(reviewer_id)?;

        if !reviews::try_release(&self.db, review_id, reviewer_id, self.max_wait_ms).await? {
            return Err(self.transition_refused(review_id, "release").await);
        }

        let item = self.load(review_id).await?;
        self.queue_if_pending(&item).await;

        info!(review_id = %review_id, reviewer = reviewer_id, "Review released");
        audit::record_lossy(
            &self.db,
            Some(item.job_id),
            audit::ACTION_REVIEW_RELEASED,
            None,
            json!({ "review_id": review_id, "reviewer_id": reviewer_id }),
            self.max_wait_ms,
        )
        .await;
        self.events.emit_lossy(EngineEvent::ReviewReleased {
            review_id,
            reviewer_id: reviewer_id.to_string(),
            timestamp: Utc::now(),
        });
        Ok(item)
    }

    /// Record a decision on an item the reviewer holds
    pub async fn complete_review(
        &self,
        review_id: Uuid,
        reviewer_id: &str,
        decision: ReviewDecision,
        notes: Option<&str>,
    ) -> Result<CompletedReview, ReviewError> {
        let reviewer_id = validate_reviewer(reviewer_id)?;
        let notes = notes.map(str::trim).filter(|n| !n.is_empty());
        let now = Utc::now();

        if !reviews::try_complete(&self.db, review_id, reviewer_id, decision.status(), notes, now, self.max_wait_ms)
            .await?
        {
            return Err(self.transition_refused(review_id, "decide").await);
        }
        self.queue.remove(review_id).await;

        let item = self.load(review_id).await?;
        let escalation = self.apply_decision(&item, reviewer_id, decision, notes).await?;

        info!(
            review_id = %review_id,
            job_id = %item.job_id,
            reviewer = reviewer_id,
            decision = decision.as_str(),
            "Review completed"
        );
        audit::record_lossy(
            &self.db,
            Some(item.job_id),
            audit::ACTION_REVIEW_COMPLETED,
            None,
            json!({
                "review_id": review_id,
                "reviewer_id": reviewer_id,
                "decision": decision.as_str(),
                "notes": notes,
                "escalated_to": escalation.as_ref().map(|e| e.id),
            }),
            self.max_wait_ms,
        )
        .await;
        self.events.emit_lossy(EngineEvent::ReviewCompleted {
            review_id,
            job_id: item.job_id,
            reviewer_id: reviewer_id.to_string(),
            decision: decision.as_str().to_string(),
            timestamp: now,
        });

        Ok(CompletedReview { item, escalation })
    }

    /// Pending items grouped by priority, with wait-time statistics
    ///
    /// A reviewer on the roster only sees review types they handle; an
    /// unknown reviewer sees everything.
    pub async fn get_review_queue(
        &self,
        reviewer_id: Option<&str>,
        priority: Option<ReviewPriority>,
    ) -> Result<ReviewQueueView, ReviewError> {
        let roster_entry = reviewer_id.and_then(|id| self.config.reviewer(id));
        let items = self
            .queue
            .snapshot(priority, |item| roster_entry.map_or(true, |r| r.handles(item.review_type)))
            .await;
        let counts = self.queue.counts().await;
        let now = Utc::now();

        let total_items = items.len();
        let total_wait: i64 = items.iter().map(|i| wait_minutes(i, now)).sum();
        let estimated_review_minutes = items.iter().map(ReviewItem::estimated_review_minutes).sum();
        let average_wait_minutes = if total_items > 0 {
            total_wait as f64 / total_items as f64
        } else {
            0.0
        };

        Ok(ReviewQueueView {
            queue: group_by_priority(items, now),
            statistics: QueueStatistics {
                total_items,
                average_wait_minutes,
                estimated_review_minutes,
                queue_by_priority: counts.into(),
            },
            retrieved_at: now,
        })
    }

    pub async fn reviewer_dashboard(&self, reviewer_id: &str) -> Result<ReviewerDashboard, ReviewError> {
        let reviewer_id = validate_reviewer(reviewer_id)?;
        let assigned_reviews = reviews::list_in_review_for(&self.db, reviewer_id).await?;
        let available = self.get_review_queue(Some(reviewer_id), None).await?;

        let window_days = self.config.stats_window_days;
        let since = Utc::now() - Duration::days(window_days);
        let completed = reviews::completed_by_since(&self.db, reviewer_id, since).await?;

        let durations: Vec<f64> = completed
            .iter()
            .filter_map(|item| match (item.assigned_at, item.completed_at) {
                (Some(start), Some(end)) => Some((end - start).num_seconds() as f64 / 60.0),
                _ => None,
            })
            .collect();
        let average_review_minutes = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };
        let approved = completed.iter().filter(|i| i.status == ReviewStatus::Approved).count();
        let approval_rate = if completed.is_empty() {
            0.0
        } else {
            approved as f64 / completed.len() as f64
        };

        Ok(ReviewerDashboard {
            reviewer_id: reviewer_id.to_string(),
            statistics: ReviewerStatistics {
                window_days,
                total_completed: completed.len(),
                average_review_minutes,
                approval_rate,
                currently_assigned: assigned_reviews.len(),
            },
            assigned_reviews,
            available_queue: available.queue,
            dashboard_updated: Utc::now(),
        })
    }

    pub async fn metrics(&self) -> Result<ReviewMetrics, ReviewError> {
        let counts = reviews::decision_counts(&self.db).await?;
        let approval_rate = if counts.total > 0 {
            counts.approved as f64 / counts.total as f64
        } else {
            0.0
        };
        Ok(ReviewMetrics {
            total_reviews: counts.total,
            approved: counts.approved,
            approval_rate,
            pending: self.queue.counts().await.into(),
        })
    }

    pub async fn get_review(&self, review_id: Uuid) -> Result<ReviewItem, ReviewError> {
        self.load(review_id).await
    }

    pub async fn pending_count(&self) -> usize {
        self.queue.len().await
    }

    async fn insert_item(&self, item: ReviewItem) -> Result<ReviewItem, ReviewError> {
        reviews::insert_review_item(&self.db, &item, self.max_wait_ms).await?;
        self.queue_if_pending(&item).await;

        info!(
            review_id = %item.id,
            job_id = %item.job_id,
            priority = item.priority.as_str(),
            review_type = item.review_type.as_str(),
            "Review queued"
        );
        audit::record_lossy(
            &self.db,
            Some(item.job_id),
            audit::ACTION_REVIEW_QUEUED,
            None,
            json!({
                "review_id": item.id,
                "priority": item.priority.as_str(),
                "review_type": item.review_type.as_str(),
                "reasons": item.reasons,
                "escalated_from": item.escalated_from,
            }),
            self.max_wait_ms,
        )
        .await;
        self.events.emit_lossy(EngineEvent::ReviewQueued {
            review_id: item.id,
            job_id: item.job_id,
            review_type: item.review_type.as_str().to_string(),
            priority: item.priority.as_str().to_string(),
            reasons: item.reasons.clone(),
            timestamp: item.created_at,
        });
        Ok(item)
    }

    async fn apply_decision(
        &self,
        item: &ReviewItem,
        reviewer_id: &str,
        decision: ReviewDecision,
        notes: Option<&str>,
    ) -> Result<Option<ReviewItem>, ReviewError> {
        match decision {
            ReviewDecision::Approved => {
                let updated = matches::approve_pending_for_job(
                    &self.db,
                    item.job_id,
                    reviewer_id,
                    Some(notes.unwrap_or("Approved in manual review")),
                    self.max_wait_ms,
                )
                .await?;
                debug!(job_id = %item.job_id, updated, "Match results approved");
                Ok(None)
            }
            ReviewDecision::Rejected => {
                let message = format!("Rejected in manual review: {}", notes.unwrap_or_default());
                jobs::mark_needs_reprocessing(&self.db, item.job_id, &message, self.max_wait_ms).await?;
                Ok(None)
            }
            ReviewDecision::NeedsMoreInfo => {
                info!(job_id = %item.job_id, notes = notes.unwrap_or_default(), "Additional information requested");
                Ok(None)
            }
            ReviewDecision::Escalated => {
                let mut escalation = ReviewItem::new(
                    item.job_id,
                    item.review_type,
                    ReviewPriority::Critical,
                    vec![format!("Escalated from review {}: {}", item.id, notes.unwrap_or_default())],
                );
                escalation.escalated_from = Some(item.id);
                let escalation = self.insert_item(escalation).await?;
                Ok(Some(escalation))
            }
        }
    }

    /// Queue a pending copy, then confirm the store still has the item pending
    ///
    /// An assign that commits before the enqueue finds nothing to remove;
    /// the recheck takes the stale copy back out.
    async fn queue_if_pending(&self, item: &ReviewItem) {
        let mut queued = item.clone();
        queued.status = ReviewStatus::Pending;
        queued.assigned_to = None;
        queued.assigned_at = None;
        self.queue.enqueue(queued).await;

        match reviews::get_review_item(&self.db, item.id).await {
            Ok(Some(stored)) if stored.status == ReviewStatus::Pending => {}
            Ok(_) => {
                self.queue.remove(item.id).await;
                debug!(review_id = %item.id, "Item taken before it was queued");
            }
            // Store just wrote it pending; keep the copy
            Err(e) => warn!(review_id = %item.id, error = %e, "Could not recheck queued item"),
        }
    }

    async fn load(&self, review_id: Uuid) -> Result<ReviewItem, ReviewError> {
        reviews::get_review_item(&self.db, review_id)
            .await?
            .ok_or(ReviewError::NotFound(review_id))
    }

    /// Explain why a conditional update changed nothing
    async fn transition_refused(&self, review_id: Uuid, operation: &str) -> ReviewError {
        match reviews::get_review_item(&self.db, review_id).await {
            Ok(Some(item)) => {
                warn!(
                    review_id = %review_id,
                    operation,
                    status = item.status.as_str(),
                    assigned_to = ?item.assigned_to,
                    "Review transition refused"
                );
                ReviewError::Conflict(format!(
                    "cannot {} review {}: status is {}{}",
                    operation,
                    review_id,
                    item.status.as_str(),
                    item.assigned_to
                        .map(|r| format!(", assigned to {}", r))
                        .unwrap_or_default()
                ))
            }
            Ok(None) => ReviewError::NotFound(review_id),
            Err(e) => ReviewError::Storage(e),
        }
    }
}

fn validate_reviewer(reviewer_id: &str) -> Result<&str, ReviewError> {
    let trimmed = reviewer_id.trim();
    if trimmed.is_empty() {
        Err(ReviewError::InvalidInput("reviewer id is empty".to_string()))
    } else {
        Ok(trimmed)
    }
}

fn wait_minutes(item: &ReviewItem, now: DateTime<Utc>) -> i64 {
    (now - item.created_at).num_minutes().max(0)
}

fn group_by_priority(items: Vec<ReviewItem>, now: DateTime<Utc>) -> Vec<PriorityGroup> {
    let mut groups: Vec<PriorityGroup> = Vec::new();
    for item in items {
        let queued = QueuedReview {
            wait_minutes: wait_minutes(&item, now),
            estimated_review_minutes: item.estimated_review_minutes(),
            item,
        };
        match groups.last_mut() {
            Some(group) if group.priority == queued.item.priority => group.items.push(queued),
            _ => groups.push(PriorityGroup {
                priority: queued.item.priority,
                items: vec![queued],
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractionQuality;

    fn outcome(status: JobStatus) -> JobOutcome {
        JobOutcome {
            job_id: Uuid::new_v4(),
            status,
            match_confidence: None,
            match_status: None,
            quality: None,
        }
    }

    fn with_match(confidence: f64, status: MatchReviewStatus) -> JobOutcome {
        JobOutcome {
            match_confidence: Some(confidence),
            match_status: Some(status),
            ..outcome(JobStatus::Completed)
        }
    }

    #[test]
    fn failed_job_is_critical() {
        let requirement = review_requirement(&outcome(JobStatus::Failed), &ReviewConfig::default(), 1.0).unwrap();
        assert_eq!(requirement.priority, ReviewPriority::Critical);
        assert_eq!(requirement.reasons, vec!["Processing failed".to_string()]);
    }

    #[test]
    fn completed_with_errors_is_high() {
        let requirement =
            review_requirement(&outcome(JobStatus::CompletedWithErrors), &ReviewConfig::default(), 1.0).unwrap();
        assert_eq!(requirement.priority, ReviewPriority::High);
    }

    #[test]
    fn match_confidence_bands() {
        let config = ReviewConfig::default();
        let low = review_requirement(&with_match(0.65, MatchReviewStatus::NeedsManualReview), &config, 1.0).unwrap();
        assert_eq!(low.priority, ReviewPriority::High);
        assert_eq!(low.review_type, ReviewType::TrialMatching);

        let medium = review_requirement(&with_match(0.75, MatchReviewStatus::Pending), &config, 1.0).unwrap();
        assert_eq!(medium.priority, ReviewPriority::Medium);

        let confident = review_requirement(&with_match(0.87, MatchReviewStatus::Pending), &config, 1.0).unwrap();
        assert_eq!(confident.priority, ReviewPriority::Low);
    }

    #[test]
    fn approved_clean_job_needs_no_review() {
        let config = ReviewConfig::default();
        assert!(review_requirement(&with_match(0.95, MatchReviewStatus::Approved), &config, 0.0).is_none());
    }

    #[test]
    fn quality_floor_breach_raises_to_high() {
        let mut job = with_match(0.80, MatchReviewStatus::Pending);
        job.quality = Some(ExtractionQuality {
            field_coverage_percentage: 45.0,
            extraction_confidence: 0.9,
        });
        let requirement = review_requirement(&job, &ReviewConfig::default(), 1.0).unwrap();
        assert_eq!(requirement.priority, ReviewPriority::High);
        assert_eq!(requirement.reasons.len(), 2);
    }

    #[test]
    fn no_candidate_match_is_high() {
        let mut job = outcome(JobStatus::Completed);
        job.match_status = Some(MatchReviewStatus::NeedsManualReview);
        let requirement = review_requirement(&job, &ReviewConfig::default(), 1.0).unwrap();
        assert_eq!(requirement.priority, ReviewPriority::High);
        assert_eq!(requirement.reasons, vec!["No catalog match found".to_string()]);
    }

    #[test]
    fn spot_check_samples_clean_jobs_at_low() {
        let config = ReviewConfig {
            spot_check_rate: 0.1,
            ..ReviewConfig::default()
        };
        let job = with_match(0.95, MatchReviewStatus::Approved);
        assert_eq!(
            review_requirement(&job, &config, 0.05).map(|r| r.priority),
            Some(ReviewPriority::Low)
        );
        assert!(review_requirement(&job, &config, 0.5).is_none());
    }

    #[test]
    fn groups_follow_service_order() {
        let now = Utc::now();
        let items = vec![
            ReviewItem::new(Uuid::new_v4(), ReviewType::TrialMatching, ReviewPriority::Critical, vec![]),
            ReviewItem::new(Uuid::new_v4(), ReviewType::TrialMatching, ReviewPriority::Critical, vec![]),
            ReviewItem::new(Uuid::new_v4(), ReviewType::BatchCompletion, ReviewPriority::Low, vec![]),
        ];
        let groups = group_by_priority(items, now);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].items.len(), 2);
        assert_eq!(groups[1].priority, ReviewPriority::Low);
        assert_eq!(groups[1].items[0].estimated_review_minutes, 12);
    }
}

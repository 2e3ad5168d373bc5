//! Manual review work items
//!
//! Lifecycle: `pending → in_review → {approved | rejected | needs_more_info | escalated}`.
//! `in_review` may also be released back to `pending`. Escalation never
//! reopens an item: it creates a new `critical` one pointing at the original.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Queue priority, most urgent first
///
/// The derived ordering sorts `Critical` before `Low`, so `min()` over a set
/// of priorities yields the most urgent one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewPriority {
    /// Failed jobs and escalations
    Critical,
    /// Low confidence or quality floor breach
    High,
    /// Medium confidence
    Medium,
    /// Routine spot checks
    Low,
}

impl ReviewPriority {
    /// All priorities in service order
    pub const ALL: [ReviewPriority; 4] = [
        ReviewPriority::Critical,
        ReviewPriority::High,
        ReviewPriority::Medium,
        ReviewPriority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewPriority::Critical => "critical",
            ReviewPriority::High => "high",
            ReviewPriority::Medium => "medium",
            ReviewPriority::Low => "low",
        }
    }

    /// Bucket index (0 = critical)
    pub fn index(&self) -> usize {
        match self {
            ReviewPriority::Critical => 0,
            ReviewPriority::High => 1,
            ReviewPriority::Medium => 2,
            ReviewPriority::Low => 3,
        }
    }
}

impl FromStr for ReviewPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(ReviewPriority::Critical),
            "high" => Ok(ReviewPriority::High),
            "medium" => Ok(ReviewPriority::Medium),
            "low" => Ok(ReviewPriority::Low),
            other => Err(format!("Unknown review priority: {}", other)),
        }
    }
}

/// Kind of review work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    TrialMatching,
    CriteriaExtraction,
    MetadataValidation,
    ProtocolQuality,
    BatchCompletion,
}

impl ReviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewType::TrialMatching => "trial_matching",
            ReviewType::CriteriaExtraction => "criteria_extraction",
            ReviewType::MetadataValidation => "metadata_validation",
            ReviewType::ProtocolQuality => "protocol_quality",
            ReviewType::BatchCompletion => "batch_completion",
        }
    }

    /// Typical minutes a reviewer spends on this kind of item
    pub fn base_review_minutes(&self) -> u32 {
        match self {
            ReviewType::TrialMatching => 10,
            ReviewType::CriteriaExtraction => 15,
            ReviewType::MetadataValidation => 8,
            ReviewType::ProtocolQuality => 20,
            ReviewType::BatchCompletion => 25,
        }
    }
}

impl FromStr for ReviewType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial_matching" => Ok(ReviewType::TrialMatching),
            "criteria_extraction" => Ok(ReviewType::CriteriaExtraction),
            "metadata_validation" => Ok(ReviewType::MetadataValidation),
            "protocol_quality" => Ok(ReviewType::ProtocolQuality),
            "batch_completion" => Ok(ReviewType::BatchCompletion),
            other => Err(format!("Unknown review type: {}", other)),
        }
    }
}

/// Critical items get a thorough look, low ones a quick verification
pub fn estimated_review_minutes(review_type: ReviewType, priority: ReviewPriority) -> u32 {
    let base = review_type.base_review_minutes();
    match priority {
        ReviewPriority::Critical => base * 2,
        ReviewPriority::Low => base / 2,
        ReviewPriority::High | ReviewPriority::Medium => base,
    }
}

/// Review item lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    InReview,
    Approved,
    Rejected,
    NeedsMoreInfo,
    Escalated,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::InReview => "in_review",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
            ReviewStatus::NeedsMoreInfo => "needs_more_info",
            ReviewStatus::Escalated => "escalated",
        }
    }

    /// Decided items never change state again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReviewStatus::Pending | ReviewStatus::InReview)
    }
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "in_review" => Ok(ReviewStatus::InReview),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            "needs_more_info" => Ok(ReviewStatus::NeedsMoreInfo),
            "escalated" => Ok(ReviewStatus::Escalated),
            other => Err(format!("Unknown review status: {}", other)),
        }
    }
}

/// Outcome a reviewer can record on an `in_review` item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
    NeedsMoreInfo,
    Escalated,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        self.status().as_str()
    }

    /// Terminal status the item moves to
    pub fn status(&self) -> ReviewStatus {
        match self {
            ReviewDecision::Approved => ReviewStatus::Approved,
            ReviewDecision::Rejected => ReviewStatus::Rejected,
            ReviewDecision::NeedsMoreInfo => ReviewStatus::NeedsMoreInfo,
            ReviewDecision::Escalated => ReviewStatus::Escalated,
        }
    }
}

/// One unit of manual review work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub id: Uuid,
    /// Processing job under review
    pub job_id: Uuid,
    pub review_type: ReviewType,
    pub priority: ReviewPriority,
    pub reasons: Vec<String>,
    pub status: ReviewStatus,
    pub assigned_to: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub decision_notes: Option<String>,
    /// Item this one was escalated from
    pub escalated_from: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ReviewItem {
    /// Fresh pending item
    pub fn new(
        job_id: Uuid,
        review_type: ReviewType,
        priority: ReviewPriority,
        reasons: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            review_type,
            priority,
            reasons,
            status: ReviewStatus::Pending,
            assigned_to: None,
            assigned_at: None,
            completed_at: None,
            decision_notes: None,
            escalated_from: None,
            created_at: Utc::now(),
        }
    }

    pub fn estimated_review_minutes(&self) -> u32 {
        estimated_review_minutes(self.review_type, self.priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_puts_critical_first() {
        let mut priorities = vec![
            ReviewPriority::Low,
            ReviewPriority::Critical,
            ReviewPriority::Medium,
            ReviewPriority::High,
        ];
        priorities.sort();
        assert_eq!(priorities, ReviewPriority::ALL.to_vec());
        assert_eq!(
            [ReviewPriority::Medium, ReviewPriority::High].into_iter().min(),
            Some(ReviewPriority::High)
        );
    }

    #[test]
    fn estimated_minutes_scale_with_priority() {
        assert_eq!(
            estimated_review_minutes(ReviewType::ProtocolQuality, ReviewPriority::Critical),
            40
        );
        assert_eq!(
            estimated_review_minutes(ReviewType::ProtocolQuality, ReviewPriority::Medium),
            20
        );
        assert_eq!(
            estimated_review_minutes(ReviewType::MetadataValidation, ReviewPriority::Low),
            4
        );
    }

    #[test]
    fn decisions_map_to_terminal_statuses() {
        for decision in [
            ReviewDecision::Approved,
            ReviewDecision::Rejected,
            ReviewDecision::NeedsMoreInfo,
            ReviewDecision::Escalated,
        ] {
            assert!(decision.status().is_terminal());
        }
        assert!(!ReviewStatus::Pending.is_terminal());
        assert!(!ReviewStatus::InReview.is_terminal());
    }

    #[test]
    fn status_round_trips_through_str() {
        assert_eq!("in_review".parse::<ReviewStatus>(), Ok(ReviewStatus::InReview));
        assert!("reopened".parse::<ReviewStatus>().is_err());
        assert_eq!("HIGH".parse::<ReviewPriority>(), Ok(ReviewPriority::High));
    }
}

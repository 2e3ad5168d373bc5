//! Match candidates and resolver results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::identity::{CandidateRecord, ExtractedIdentity};

/// Strategy that produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Case-insensitive protocol number equality
    ExactIdentifier,
    /// Registry number equality
    RegistryNumber,
    /// Edit-distance identifier match within the same sponsor
    FuzzyIdentifierSponsor,
    /// Token-overlap title match within the same phase
    TitlePhase,
    /// Same sponsor and phase, nothing else compared
    SponsorPhase,
    /// Byte-identical document already resolved for another job
    DuplicateDocument,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::ExactIdentifier => "exact_identifier",
            MatchType::RegistryNumber => "registry_number",
            MatchType::FuzzyIdentifierSponsor => "fuzzy_identifier_sponsor",
            MatchType::TitlePhase => "title_phase",
            MatchType::SponsorPhase => "sponsor_phase",
            MatchType::DuplicateDocument => "duplicate_document",
        }
    }
}

impl FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact_identifier" => Ok(MatchType::ExactIdentifier),
            "registry_number" => Ok(MatchType::RegistryNumber),
            "fuzzy_identifier_sponsor" => Ok(MatchType::FuzzyIdentifierSponsor),
            "title_phase" => Ok(MatchType::TitlePhase),
            "sponsor_phase" => Ok(MatchType::SponsorPhase),
            "duplicate_document" => Ok(MatchType::DuplicateDocument),
            other => Err(format!("Unknown match type: {}", other)),
        }
    }
}

/// Human-readable reason a candidate was proposed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchJustification {
    pub primary: String,
    #[serde(default)]
    pub details: Vec<String>,
}

impl MatchJustification {
    pub fn new(primary: impl Into<String>, details: Vec<String>) -> Self {
        Self {
            primary: primary.into(),
            details,
        }
    }
}

/// One (identity, catalog record) pairing from a single strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub record: CandidateRecord,
    pub match_type: MatchType,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub justification: MatchJustification,
}

impl MatchCandidate {
    pub fn new(
        record: CandidateRecord,
        match_type: MatchType,
        confidence: f64,
        justification: MatchJustification,
    ) -> Self {
        Self {
            record,
            match_type,
            confidence: confidence.clamp(0.0, 1.0),
            justification,
        }
    }
}

/// Review status of a resolver result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReviewStatus {
    /// Auto-accepted or approved by a reviewer
    Approved,
    /// Medium confidence, waiting on review
    Pending,
    /// No candidate or low confidence
    NeedsManualReview,
    /// Rejected by a reviewer
    Rejected,
}

impl MatchReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchReviewStatus::Approved => "approved",
            MatchReviewStatus::Pending => "pending",
            MatchReviewStatus::NeedsManualReview => "needs_manual_review",
            MatchReviewStatus::Rejected => "rejected",
        }
    }

    /// Whether a job with this status must go through the review queue
    pub fn requires_review(&self) -> bool {
        matches!(
            self,
            MatchReviewStatus::Pending | MatchReviewStatus::NeedsManualReview
        )
    }
}

impl FromStr for MatchReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(MatchReviewStatus::Approved),
            "pending" => Ok(MatchReviewStatus::Pending),
            "needs_manual_review" => Ok(MatchReviewStatus::NeedsManualReview),
            "rejected" => Ok(MatchReviewStatus::Rejected),
            other => Err(format!("Unknown match review status: {}", other)),
        }
    }
}

/// Resolver output for one extracted identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: Uuid,
    pub processing_job_id: Uuid,
    pub source_file_path: String,
    /// SHA-256 of the source document; empty when it could not be read
    pub document_hash: String,
    pub extracted: ExtractedIdentity,
    pub best_match: Option<MatchCandidate>,
    /// Next-best candidates, highest confidence first
    pub alternatives: Vec<MatchCandidate>,
    /// Distinct records any strategy proposed
    pub total_candidates: usize,
    pub review_status: MatchReviewStatus,
    /// Job whose identical document supplied this result
    pub duplicate_of: Option<Uuid>,
    pub reviewed_by: Option<String>,
    pub review_notes: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub resolved_at: DateTime<Utc>,
}

impl MatchResult {
    /// Confidence of the best candidate, 0 when there is none
    pub fn confidence(&self) -> f64 {
        self.best_match.as_ref().map(|m| m.confidence).unwrap_or(0.0)
    }

    pub fn matched_record_id(&self) -> Option<Uuid> {
        self.best_match.as_ref().map(|m| m.record.id)
    }
}

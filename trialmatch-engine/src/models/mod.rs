//! Domain models for matching, similarity and review

pub mod identity;
pub mod job;
pub mod match_result;
pub mod review;
pub mod similarity;

pub use identity::{extract_registry_number, CandidateRecord, ExtractedIdentity};
pub use job::{ExtractionQuality, JobOutcome, JobStatus, ProcessingJob};
pub use match_result::{
    MatchCandidate, MatchJustification, MatchResult, MatchReviewStatus, MatchType,
};
pub use review::{
    estimated_review_minutes, ReviewDecision, ReviewItem, ReviewPriority, ReviewStatus,
    ReviewType,
};
pub use similarity::{CorrectionAction, CorrectionEvent, Criterion, CriterionPairScore, CriterionVector};

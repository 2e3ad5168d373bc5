//! Processing job view used by the review workflow
//!
//! Jobs are created by the document pipeline. This crate only reads their
//! outcome and flags them for reprocessing after a rejected review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::match_result::MatchReviewStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    CompletedWithErrors,
    Failed,
    NeedsReprocessing,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::CompletedWithErrors => "completed_with_errors",
            JobStatus::Failed => "failed",
            JobStatus::NeedsReprocessing => "needs_reprocessing",
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "completed_with_errors" => Ok(JobStatus::CompletedWithErrors),
            "failed" => Ok(JobStatus::Failed),
            "needs_reprocessing" => Ok(JobStatus::NeedsReprocessing),
            other => Err(format!("Unknown job status: {}", other)),
        }
    }
}

/// Extraction quality metrics reported by the document pipeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtractionQuality {
    /// Share of expected fields that were filled, 0-100
    pub field_coverage_percentage: f64,
    /// Extractor's own confidence, 0-1
    pub extraction_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub error_messages: Vec<String>,
    pub quality: Option<ExtractionQuality>,
    pub updated_at: DateTime<Utc>,
}

/// Everything the review policy needs to decide whether a job enters the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub status: JobStatus,
    /// Best-match confidence and status, if the resolver ran
    pub match_confidence: Option<f64>,
    pub match_status: Option<MatchReviewStatus>,
    pub quality: Option<ExtractionQuality>,
}

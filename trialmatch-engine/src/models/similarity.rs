//! Criterion embeddings and threshold corrections

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Free-text criterion to compare (eligibility line, dosage rule, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: String,
    pub text: String,
}

impl Criterion {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Stored embedding of one criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionVector {
    pub criterion_id: String,
    pub values: Vec<f32>,
    /// Embedding model that produced `values`
    pub model_version: String,
    pub generated_at: DateTime<Utc>,
}

/// Reviewer verdict on a criterion pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionAction {
    /// Pair should have matched but scored below the threshold
    Merge,
    /// Pair matched but should not have
    Separate,
}

impl CorrectionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectionAction::Merge => "merge",
            CorrectionAction::Separate => "separate",
        }
    }
}

impl FromStr for CorrectionAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(CorrectionAction::Merge),
            "separate" => Ok(CorrectionAction::Separate),
            other => Err(format!("Unknown correction action: {}", other)),
        }
    }
}

/// Auditable record of one threshold correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionEvent {
    pub id: Uuid,
    pub criterion_a: String,
    pub criterion_b: String,
    pub action: CorrectionAction,
    /// Similarity shown to the reviewer when they decided
    pub similarity: f64,
    pub concept_tag: String,
    /// Signed change applied to the concept threshold
    pub threshold_delta: f64,
    pub comparison_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// One pair that cleared the concept threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionPairScore {
    pub criterion_a: String,
    pub criterion_b: String,
    pub score: f64,
}

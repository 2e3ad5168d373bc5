//! Extracted document identity and catalog candidate records

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

/// Titles this short carry too little signal to compare
const MIN_TITLE_LEN: usize = 10;

/// Identifying fields pulled from one incoming document
///
/// Every field is optional. Strategies declare which fields they need and are
/// skipped when those are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedIdentity {
    pub protocol_number: Option<String>,
    pub title: Option<String>,
    pub sponsor: Option<String>,
    /// Formal trial-registry id (e.g. `NCT01234567`)
    pub registry_number: Option<String>,
    pub phase: Option<String>,
    /// SHA-256 of the source document when the extractor already computed it
    pub content_hash: Option<String>,
    pub source_file_path: String,
    pub processing_job_id: Uuid,
    /// Raw document text, only used to recover a registry number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
}

impl ExtractedIdentity {
    /// New identity for a job with no fields populated
    pub fn for_job(processing_job_id: Uuid, source_file_path: impl Into<String>) -> Self {
        Self {
            processing_job_id,
            source_file_path: source_file_path.into(),
            ..Default::default()
        }
    }

    /// Canonical form used by every matching strategy
    ///
    /// - blank strings become `None`
    /// - protocol and registry numbers are upper-cased
    /// - titles of 10 characters or fewer are dropped
    /// - phases are upper-cased and prefixed with `PHASE `
    /// - a missing registry number is recovered from `full_text`
    pub fn normalized(&self) -> Self {
        let registry_number = non_blank(&self.registry_number)
            .map(|r| r.to_uppercase())
            .or_else(|| self.full_text.as_deref().and_then(extract_registry_number));

        Self {
            protocol_number: non_blank(&self.protocol_number).map(|p| p.to_uppercase()),
            title: non_blank(&self.title).filter(|t| t.chars().count() > MIN_TITLE_LEN),
            sponsor: non_blank(&self.sponsor),
            registry_number,
            phase: non_blank(&self.phase).map(|p| normalize_phase(&p)),
            content_hash: non_blank(&self.content_hash),
            source_file_path: self.source_file_path.clone(),
            processing_job_id: self.processing_job_id,
            full_text: None,
        }
    }

    /// True if at least one field a strategy can use is present
    pub fn has_identity_fields(&self) -> bool {
        self.protocol_number.is_some()
            || self.title.is_some()
            || self.sponsor.is_some()
            || self.registry_number.is_some()
            || self.phase.is_some()
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `"2"` → `"PHASE 2"`, `"phase ii"` → `"PHASE II"`
pub fn normalize_phase(phase: &str) -> String {
    let upper = phase.trim().to_uppercase();
    if upper.starts_with("PHASE") {
        upper
    } else {
        format!("PHASE {}", upper)
    }
}

/// Find the first `NCT` + 8 digit registry id in free text
pub fn extract_registry_number(text: &str) -> Option<String> {
    static NCT_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = NCT_PATTERN.get_or_init(|| Regex::new(r"NCT\d{8}").expect("static NCT pattern"));

    pattern
        .find(&text.to_uppercase())
        .map(|m| m.as_str().to_string())
}

/// Existing catalog entry eligible to be matched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: Uuid,
    pub protocol_number: String,
    pub title: String,
    pub sponsor: Option<String>,
    pub phase: Option<String>,
    pub registry_number: Option<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
}

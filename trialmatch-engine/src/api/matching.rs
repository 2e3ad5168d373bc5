//! Match resolution API handlers
//!
//! POST /matching/resolve, GET /matching/status/{job_id},
//! POST /matching/{match_id}/approve, POST /matching/{match_id}/reject,
//! POST /matching/processor

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{ExtractedIdentity, MatchResult},
    services::{select_processor, ProcessorKind},
    AppState,
};

/// POST /matching/resolve request
#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    #[serde(flatten)]
    pub identity: ExtractedIdentity,
    /// Local document to hash when no `content_hash` is supplied
    #[serde(default)]
    pub document_path: Option<String>,
}

/// Approve/reject request body
#[derive(Debug, Deserialize)]
pub struct ReviewMatchRequest {
    pub reviewer_id: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessorRequest {
    pub file_path: String,
    #[serde(default)]
    pub extracted_text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessorResponse {
    pub processor: ProcessorKind,
}

/// POST /matching/resolve
pub async fn resolve(
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Json<MatchResult>> {
    if request.identity.processing_job_id.is_nil() {
        return Err(ApiError::BadRequest("processing_job_id is required".to_string()));
    }

    let document_path = request.document_path.as_deref().map(std::path::Path::new);
    let result = state.resolver.resolve(&request.identity, document_path).await?;
    Ok(Json(result))
}

/// GET /matching/status/{job_id}
pub async fn get_match_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<MatchResult>> {
    state
        .resolver
        .get_match_status(job_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No match result for job {}", job_id)))
}

/// POST /matching/{match_id}/approve
pub async fn approve_match(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Json(request): Json<ReviewMatchRequest>,
) -> ApiResult<Json<MatchResult>> {
    let reviewer_id = required_reviewer(&request.reviewer_id)?;
    let result = state
        .resolver
        .approve_match(match_id, reviewer_id, request.notes.as_deref())
        .await?;
    Ok(Json(result))
}

/// POST /matching/{match_id}/reject
pub async fn reject_match(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Json(request): Json<ReviewMatchRequest>,
) -> ApiResult<Json<MatchResult>> {
    let reviewer_id = required_reviewer(&request.reviewer_id)?;
    let result = state
        .resolver
        .reject_match(match_id, reviewer_id, request.notes.as_deref())
        .await?;
    Ok(Json(result))
}

/// POST /matching/processor
pub async fn choose_processor(Json(request): Json<ProcessorRequest>) -> Json<ProcessorResponse> {
    Json(ProcessorResponse {
        processor: select_processor(&request.file_path, request.extracted_text.as_deref()),
    })
}

fn required_reviewer(reviewer_id: &str) -> ApiResult<&str> {
    let trimmed = reviewer_id.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("reviewer_id is required".to_string()));
    }
    Ok(trimmed)
}

pub fn matching_routes() -> Router<AppState> {
    Router::new()
        .route("/matching/resolve", post(resolve))
        .route("/matching/status/:job_id", get(get_match_status))
        .route("/matching/:match_id/approve", post(approve_match))
        .route("/matching/:match_id/reject", post(reject_match))
        .route("/matching/processor", post(choose_processor))
}

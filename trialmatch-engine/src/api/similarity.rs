//! Criterion similarity API handlers

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    models::{CorrectionAction, Criterion},
    services::similarity_engine::{AppliedCorrection, SetComparison},
    AppState,
};

/// POST /similarity/compare request
#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub set_a: Vec<Criterion>,
    pub set_b: Vec<Criterion>,
    pub concept_tag: String,
}

/// POST /similarity/corrections request
#[derive(Debug, Deserialize)]
pub struct CorrectionRequest {
    pub criterion_a: String,
    pub criterion_b: String,
    pub action: CorrectionAction,
    pub similarity: f64,
    pub concept_tag: String,
    #[serde(default)]
    pub comparison_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ThresholdResponse {
    pub concept_tag: String,
    pub threshold: f64,
}

/// POST /similarity/compare
pub async fn compare(
    State(state): State<AppState>,
    Json(request): Json<CompareRequest>,
) -> ApiResult<Json<SetComparison>> {
    if request.concept_tag.trim().is_empty() {
        return Err(ApiError::BadRequest("concept_tag is required".to_string()));
    }
    let comparison = state
        .similarity
        .compare_sets(&request.set_a, &request.set_b, &request.concept_tag)
        .await?;
    Ok(Json(comparison))
}

/// POST /similarity/corrections
pub async fn record_correction(
    State(state): State<AppState>,
    Json(request): Json<CorrectionRequest>,
) -> ApiResult<Json<AppliedCorrection>> {
    let applied = state
        .similarity
        .record_correction(
            &request.criterion_a,
            &request.criterion_b,
            request.action,
            request.similarity,
            &request.concept_tag,
            request.comparison_id,
        )
        .await?;
    Ok(Json(applied))
}

/// GET /similarity/thresholds/{tag}
pub async fn threshold(
    State(state): State<AppState>,
    Path(concept_tag): Path<String>,
) -> ApiResult<Json<ThresholdResponse>> {
    let threshold = state.similarity.threshold_for(&concept_tag).await?;
    Ok(Json(ThresholdResponse { concept_tag, threshold }))
}

pub fn similarity_routes() -> Router<AppState> {
    Router::new()
        .route("/similarity/compare", post(compare))
        .route("/similarity/corrections", post(record_correction))
        .route("/similarity/thresholds/:tag", get(threshold))
}

//! Review workflow API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{JobOutcome, ReviewDecision, ReviewItem, ReviewPriority, ReviewType},
    services::review_coordinator::{CompletedReview, ReviewMetrics, ReviewQueueView, ReviewerDashboard},
    AppState,
};

/// GET /review/queue query
#[derive(Debug, Default, Deserialize)]
pub struct QueueQuery {
    pub reviewer_id: Option<String>,
    pub priority: Option<String>,
}

/// POST /review/items request
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub job_id: Uuid,
    pub review_type: ReviewType,
    pub priority: ReviewPriority,
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewerRequest {
    pub reviewer_id: String,
}

/// POST /review/items/{id}/complete request
#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub reviewer_id: String,
    pub decision: ReviewDecision,
    #[serde(default)]
    pub notes: Option<String>,
}

/// POST /review/jobs response
#[derive(Debug, Serialize)]
pub struct AssessJobResponse {
    pub queued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewItem>,
}

/// GET /review/queue
pub async fn get_review_queue(
    State(state): State<AppState>,
    Query(query): Query<QueueQuery>,
) -> ApiResult<Json<ReviewQueueView>> {
    let priority = query
        .priority
        .as_deref()
        .map(str::parse::<ReviewPriority>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let view = state
        .reviews
        .get_review_queue(query.reviewer_id.as_deref(), priority)
        .await?;
    Ok(Json(view))
}

/// POST /review/items
pub async fn enqueue(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> ApiResult<(StatusCode, Json<ReviewItem>)> {
    let item = state
        .reviews
        .enqueue(request.job_id, request.review_type, request.priority, request.reasons)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /review/items/{id}
pub async fn get_review(
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
) -> ApiResult<Json<ReviewItem>> {
    Ok(Json(state.reviews.get_review(review_id).await?))
}

/// POST /review/items/{id}/assign
pub async fn assign(
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
    Json(request): Json<ReviewerRequest>,
) -> ApiResult<Json<ReviewItem>> {
    Ok(Json(state.reviews.assign_review(review_id, &request.reviewer_id).await?))
}

/// POST /review/items/{id}/release
pub async fn release(
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
    Json(request): Json<ReviewerRequest>,
) -> ApiResult<Json<ReviewItem>> {
    Ok(Json(state.reviews.release_review(review_id, &request.reviewer_id).await?))
}

/// POST /review/items/{id}/complete
pub async fn complete(
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
    Json(request): Json<CompleteRequest>,
) -> ApiResult<Json<CompletedReview>> {
    let completed = state
        .reviews
        .complete_review(review_id, &request.reviewer_id, request.decision, request.notes.as_deref())
        .await?;
    Ok(Json(completed))
}

/// POST /review/jobs - apply the review policy to a finished job
pub async fn assess_job(
    State(state): State<AppState>,
    Json(outcome): Json<JobOutcome>,
) -> ApiResult<Json<AssessJobResponse>> {
    let review = state.reviews.submit_job_outcome(&outcome).await?;
    Ok(Json(AssessJobResponse {
        queued: review.is_some(),
        review,
    }))
}

/// GET /review/reviewers/{id}/dashboard
pub async fn reviewer_dashboard(
    State(state): State<AppState>,
    Path(reviewer_id): Path<String>,
) -> ApiResult<Json<ReviewerDashboard>> {
    Ok(Json(state.reviews.reviewer_dashboard(&reviewer_id).await?))
}

/// GET /review/metrics
pub async fn metrics(State(state): State<AppState>) -> ApiResult<Json<ReviewMetrics>> {
    Ok(Json(state.reviews.metrics().await?))
}

pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/review/queue", get(get_review_queue))
        .route("/review/items", post(enqueue))
        .route("/review/items/:id", get(get_review))
        .route("/review/items/:id/assign", post(assign))
        .route("/review/items/:id/release", post(release))
        .route("/review/items/:id/complete", post(complete))
        .route("/review/jobs", post(assess_job))
        .route("/review/reviewers/:id/dashboard", get(reviewer_dashboard))
        .route("/review/metrics", get(metrics))
}

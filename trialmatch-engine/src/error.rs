//! HTTP error mapping for the engine API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::{ResolveError, ReviewError, SimilarityError};

#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// State conflict (409), e.g. a review already taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Catalog or embedding provider unavailable (502)
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Common error: {0}")]
    Common(trialmatch_common::Error),
}

impl From<trialmatch_common::Error> for ApiError {
    fn from(err: trialmatch_common::Error) -> Self {
        use trialmatch_common::Error;
        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Common(other),
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::AllLookupsFailed { .. } => ApiError::Upstream(err.to_string()),
            ResolveError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ResolveError::Storage(e) => e.into(),
        }
    }
}

impl From<SimilarityError> for ApiError {
    fn from(err: SimilarityError) -> Self {
        match err {
            SimilarityError::Embedding { .. } => ApiError::Upstream(err.to_string()),
            SimilarityError::InvalidInput(msg) => ApiError::BadRequest(msg),
            SimilarityError::Storage(e) => e.into(),
        }
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ReviewError::Conflict(msg) => ApiError::Conflict(msg),
            ReviewError::InvalidInput(msg) => ApiError::BadRequest(msg),
            ReviewError::Storage(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(ref err) => {
                tracing::error!(error = %err, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR", err.to_string())
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn lookup_outage_maps_to_bad_gateway() {
        let err: ApiError = ResolveError::AllLookupsFailed {
            attempted: 3,
            last_error: "timeout".to_string(),
        }
        .into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn review_conflict_maps_to_409() {
        let err: ApiError = ReviewError::Conflict("taken".to_string()).into();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);

        let err: ApiError = ReviewError::NotFound(Uuid::new_v4()).into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn storage_not_found_keeps_its_status() {
        let err: ApiError = trialmatch_common::Error::NotFound("gone".to_string()).into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}

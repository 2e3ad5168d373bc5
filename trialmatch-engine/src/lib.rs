//! trialmatch-engine library interface
//!
//! Identity resolution, criterion similarity and the human-review workflow,
//! exposed over HTTP by the `trialmatch-engine` binary and directly to
//! integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use trialmatch_common::EventBus;

use crate::config::EngineConfig;
use crate::db::catalog::CatalogStore;
use crate::services::{EmbeddingProvider, IdentityResolver, ReviewCoordinator, SimilarityEngine};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub resolver: Arc<IdentityResolver>,
    pub similarity: Arc<SimilarityEngine>,
    pub reviews: Arc<ReviewCoordinator>,
    pub events: EventBus,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire the three services over one pool and event bus
    ///
    /// `low_confidence_threshold` is the already-resolved value (settings
    /// table override or config). The review queue starts empty; call
    /// `reviews.restore()` to reload pending items.
    pub fn new(
        db: SqlitePool,
        config: &EngineConfig,
        catalog: Arc<dyn CatalogStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        low_confidence_threshold: f64,
        events: EventBus,
    ) -> Self {
        let max_wait_ms = config.matching.db_max_lock_wait_ms;

        let resolver = IdentityResolver::new(
            db.clone(),
            catalog,
            config.matching.clone(),
            low_confidence_threshold,
            events.clone(),
        );
        let similarity = SimilarityEngine::new(
            db.clone(),
            embeddings,
            config.similarity.clone(),
            Duration::from_secs(config.embedding.timeout_secs),
            max_wait_ms,
            events.clone(),
        );
        let reviews = ReviewCoordinator::new(db.clone(), config.review.clone(), max_wait_ms, events.clone());

        Self {
            db,
            resolver: Arc::new(resolver),
            similarity: Arc::new(similarity),
            reviews: Arc::new(reviews),
            events,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::health_routes())
        .merge(api::matching_routes())
        .merge(api::review_routes())
        .merge(api::similarity_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

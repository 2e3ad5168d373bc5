//! Shared fixtures for engine integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use trialmatch_common::{Error, EventBus, Result};
use uuid::Uuid;

use trialmatch_engine::config::EngineConfig;
use trialmatch_engine::db::catalog::{self, CatalogStore, SqliteCatalog};
use trialmatch_engine::models::CandidateRecord;
use trialmatch_engine::services::{EmbeddingError, EmbeddingProvider};
use trialmatch_engine::AppState;

pub async fn test_pool() -> SqlitePool {
    trialmatch_common::db::init_in_memory_database()
        .await
        .expect("in-memory database")
}

pub fn record(protocol: &str, title: &str, sponsor: Option<&str>, phase: Option<&str>) -> CandidateRecord {
    CandidateRecord {
        id: Uuid::new_v4(),
        protocol_number: protocol.to_string(),
        title: title.to_string(),
        sponsor: sponsor.map(str::to_string),
        phase: phase.map(str::to_string),
        registry_number: None,
        conditions: Vec::new(),
    }
}

pub async fn seed(pool: &SqlitePool, records: &[CandidateRecord]) {
    for r in records {
        catalog::upsert_trial(pool, r).await.expect("seed catalog");
    }
}

/// Catalog wrapper counting every lookup
pub struct CountingCatalog {
    inner: SqliteCatalog,
    pub calls: AtomicUsize,
}

impl CountingCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            inner: SqliteCatalog::new(pool),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CatalogStore for CountingCatalog {
    async fn find_by_exact_identifier(&self, protocol_number: &str) -> Result<Vec<CandidateRecord>> {
        self.tick();
        self.inner.find_by_exact_identifier(protocol_number).await
    }

    async fn find_by_registry_number(&self, registry_number: &str) -> Result<Vec<CandidateRecord>> {
        self.tick();
        self.inner.find_by_registry_number(registry_number).await
    }

    async fn find_by_sponsor(&self, sponsor: &str, limit: u32) -> Result<Vec<CandidateRecord>> {
        self.tick();
        self.inner.find_by_sponsor(sponsor, limit).await
    }

    async fn find_by_phase(&self, phase: &str, limit: u32) -> Result<Vec<CandidateRecord>> {
        self.tick();
        self.inner.find_by_phase(phase, limit).await
    }

    async fn find_by_sponsor_and_phase(
        &self,
        sponsor: &str,
        phase: &str,
        limit: u32,
    ) -> Result<Vec<CandidateRecord>> {
        self.tick();
        self.inner.find_by_sponsor_and_phase(sponsor, phase, limit).await
    }
}

/// Catalog whose every lookup errors, or stalls past any timeout
pub struct BrokenCatalog {
    pub stall: Option<Duration>,
}

impl BrokenCatalog {
    pub fn failing() -> Self {
        Self { stall: None }
    }

    pub fn stalling(by: Duration) -> Self {
        Self { stall: Some(by) }
    }

    async fn answer(&self) -> Result<Vec<CandidateRecord>> {
        match self.stall {
            Some(by) => {
                tokio::time::sleep(by).await;
                Ok(Vec::new())
            }
            None => Err(Error::Internal("catalog unavailable".to_string())),
        }
    }
}

#[async_trait]
impl CatalogStore for BrokenCatalog {
    async fn find_by_exact_identifier(&self, _: &str) -> Result<Vec<CandidateRecord>> {
        self.answer().await
    }

    async fn find_by_registry_number(&self, _: &str) -> Result<Vec<CandidateRecord>> {
        self.answer().await
    }

    async fn find_by_sponsor(&self, _: &str, _: u32) -> Result<Vec<CandidateRecord>> {
        self.answer().await
    }

    async fn find_by_phase(&self, _: &str, _: u32) -> Result<Vec<CandidateRecord>> {
        self.answer().await
    }

    async fn find_by_sponsor_and_phase(&self, _: &str, _: &str, _: u32) -> Result<Vec<CandidateRecord>> {
        self.answer().await
    }
}

/// Catalog whose exact-identifier lookup errors; every other lookup works
pub struct ExactLookupDown {
    inner: SqliteCatalog,
}

impl ExactLookupDown {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            inner: SqliteCatalog::new(pool),
        }
    }
}

#[async_trait]
impl CatalogStore for ExactLookupDown {
    async fn find_by_exact_identifier(&self, _: &str) -> Result<Vec<CandidateRecord>> {
        Err(Error::Internal("identifier index offline".to_string()))
    }

    async fn find_by_registry_number(&self, registry_number: &str) -> Result<Vec<CandidateRecord>> {
        self.inner.find_by_registry_number(registry_number).await
    }

    async fn find_by_sponsor(&self, sponsor: &str, limit: u32) -> Result<Vec<CandidateRecord>> {
        self.inner.find_by_sponsor(sponsor, limit).await
    }

    async fn find_by_phase(&self, phase: &str, limit: u32) -> Result<Vec<CandidateRecord>> {
        self.inner.find_by_phase(phase, limit).await
    }

    async fn find_by_sponsor_and_phase(
        &self,
        sponsor: &str,
        phase: &str,
        limit: u32,
    ) -> Result<Vec<CandidateRecord>> {
        self.inner.find_by_sponsor_and_phase(sponsor, phase, limit).await
    }
}

/// Embedding provider serving fixed vectors by text
pub struct FakeEmbeddings {
    vectors: HashMap<String, Vec<f32>>,
    failing: HashSet<String>,
    model_version: String,
    dimension: usize,
    pub calls: AtomicUsize,
}

impl FakeEmbeddings {
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: HashMap::new(),
            failing: HashSet::new(),
            model_version: "fake-embed-1".to_string(),
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_model(mut self, model_version: &str) -> Self {
        self.model_version = model_version.to_string();
        self
    }

    pub fn vector(mut self, text: &str, values: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), values);
        self
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbeddings {
    async fn generate_embedding(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(text) {
            return Err(EmbeddingError::Api(503, "provider overloaded".to_string()));
        }
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| EmbeddingError::Parse(format!("no fixture vector for {:?}", text)))
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// App state over an in-memory pool, the SQLite catalog and `embeddings`
pub async fn test_state(embeddings: FakeEmbeddings) -> AppState {
    let pool = test_pool().await;
    let config = EngineConfig::default();
    AppState::new(
        pool.clone(),
        &config,
        Arc::new(SqliteCatalog::new(pool)),
        Arc::new(embeddings),
        config.matching.low_confidence_threshold,
        EventBus::new(64),
    )
}

/// Write `contents` to a fresh temp file
pub fn temp_document(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("write temp document");
    path
}

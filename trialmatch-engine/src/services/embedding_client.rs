//! Text embedding provider
//!
//! `EmbeddingProvider` is what the similarity engine depends on.
//! `HttpEmbeddingClient` talks to a Gemini-style `embedContent` endpoint,
//! spacing requests with a small rate limiter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::EmbeddingConfig;

const USER_AGENT: &str = concat!("trialmatch-engine/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding request timed out")]
    Timeout,

    #[error("Embedding provider not configured: {0}")]
    NotConfigured(String),
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Identifier stored next to every vector this provider produces
    fn model_version(&self) -> &str;

    fn dimension(&self) -> usize;
}

/// Enforces a minimum spacing between requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(wait_ms = wait.as_millis() as u64, "Embedding rate limit wait");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
}

#[derive(Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

pub struct HttpEmbeddingClient {
    http_client: reqwest::Client,
    rate_limiter: RateLimiter,
    endpoint: String,
    model_version: String,
    dimension: usize,
    api_key: Option<String>,
}

impl HttpEmbeddingClient {
    /// Without an API key every request fails with `NotConfigured`
    pub fn new(config: &EmbeddingConfig, api_key: Option<String>) -> Result<Self, EmbeddingError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::new(config.min_request_interval_ms),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model_version: config.model_version.clone(),
            dimension: config.dimension,
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            EmbeddingError::NotConfigured("no API key resolved".to_string())
        })?;

        self.rate_limiter.wait().await;

        let url = format!("{}/{}:embedContent", self.endpoint, self.model_version);
        let request = EmbedRequest {
            model: format!("models/{}", self.model_version),
            content: EmbedContent {
                parts: [EmbedPart { text }],
            },
        };

        tracing::debug!(url = %url, chars = text.len(), "Requesting embedding");

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout
                } else {
                    EmbeddingError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api(status.as_u16(), body));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Parse(e.to_string()))?;

        let values = parsed.embedding.values;
        if values.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: values.len(),
            });
        }
        Ok(values)
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_api_key_is_not_configured() {
        let client = HttpEmbeddingClient::new(&EmbeddingConfig::default(), None).unwrap();
        let err = client.generate_embedding("Age 18 or older").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::NotConfigured(_)));
        assert_eq!(client.dimension(), 768);
        assert_eq!(client.model_version(), "text-embedding-004");
    }

    #[test]
    fn request_body_matches_embed_content_shape() {
        let request = EmbedRequest {
            model: "models/text-embedding-004".to_string(),
            content: EmbedContent {
                parts: [EmbedPart { text: "HbA1c below 7%" }],
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["content"]["parts"][0]["text"], "HbA1c below 7%");
        assert_eq!(json["model"], "models/text-embedding-004");
    }

    #[tokio::test]
    async fn rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(30);
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}

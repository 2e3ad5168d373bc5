//! Duplicate document detection
//!
//! A document whose SHA-256 matches one already resolved to a catalog record
//! is answered from that earlier result without running any strategy.

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::io::Read;
use std::path::Path;
use trialmatch_common::{Error, Result};
use uuid::Uuid;

use crate::db::matches;
use crate::models::MatchResult;

const HASH_CHUNK_BYTES: usize = 1024 * 1024;

/// Outcome of a duplicate check
#[derive(Debug, Clone, PartialEq)]
pub enum HashResult {
    /// No usable prior result (or no hash to compare)
    Unique(String),
    /// Same bytes were already resolved
    Duplicate { hash: String, prior: Box<MatchResult> },
}

pub struct HashDeduplicator {
    db: SqlitePool,
}

impl HashDeduplicator {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// SHA-256 of the file, lower-case hex
    ///
    /// Hashing runs on the blocking pool in 1 MiB chunks.
    pub async fn calculate_hash(&self, path: &Path) -> Result<String> {
        let path_buf = path.to_path_buf();

        let hash = tokio::task::spawn_blocking(move || -> Result<String> {
            let mut file = std::fs::File::open(&path_buf)?;
            let mut hasher = Sha256::new();
            let mut buffer = vec![0u8; HASH_CHUNK_BYTES];
            loop {
                let read = file.read(&mut buffer)?;
                if read == 0 {
                    break;
                }
                hasher.update(&buffer[..read]);
            }
            Ok(format!("{:x}", hasher.finalize()))
        })
        .await
        .map_err(|e| Error::Internal(format!("Hash task failed: {}", e)))??;

        tracing::debug!(path = %path.display(), hash = %hash, "Hashed document");
        Ok(hash)
    }

    /// Hash to use for `path`: the supplied one, else computed
    ///
    /// An unreadable document yields an empty hash, which disables the
    /// duplicate check for this run.
    pub async fn document_hash(&self, supplied: Option<&str>, path: &Path) -> String {
        if let Some(hash) = supplied.filter(|h| !h.trim().is_empty()) {
            return hash.trim().to_lowercase();
        }
        match self.calculate_hash(path).await {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Document unreadable, skipping duplicate detection"
                );
                String::new()
            }
        }
    }

    /// Look for an earlier job that resolved the same bytes
    pub async fn check_duplicate(&self, hash: &str, job_id: Uuid) -> Result<HashResult> {
        if hash.is_empty() {
            return Ok(HashResult::Unique(String::new()));
        }

        match matches::find_prior_by_hash(&self.db, hash, job_id).await? {
            Some(prior) => {
                tracing::info!(
                    hash = %hash,
                    prior_job = %prior.processing_job_id,
                    "Duplicate document detected"
                );
                Ok(HashResult::Duplicate {
                    hash: hash.to_string(),
                    prior: Box::new(prior),
                })
            }
            None => Ok(HashResult::Unique(hash.to_string())),
        }
    }
}

//! Append-only audit trail

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use trialmatch_common::{Error, Result};
use uuid::Uuid;

use super::parse_timestamp;
use crate::utils::retry_on_lock;

pub const ACTION_MATCH_RESOLVED: &str = "match_resolved";
pub const ACTION_DUPLICATE_DETECTED: &str = "duplicate_detected";
pub const ACTION_MATCH_APPROVED: &str = "match_approved";
pub const ACTION_MATCH_REJECTED: &str = "match_rejected";
pub const ACTION_REVIEW_QUEUED: &str = "review_queued";
pub const ACTION_REVIEW_ASSIGNED: &str = "review_assigned";
pub const ACTION_REVIEW_RELEASED: &str = "review_released";
pub const ACTION_REVIEW_COMPLETED: &str = "review_completed";
pub const ACTION_THRESHOLD_CORRECTED: &str = "threshold_corrected";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub job_id: Option<Uuid>,
    pub action_type: String,
    pub confidence: Option<f64>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

pub async fn record(
    pool: &SqlitePool,
    job_id: Option<Uuid>,
    action_type: &str,
    confidence: Option<f64>,
    details: serde_json::Value,
    max_wait_ms: u64,
) -> Result<()> {
    let job_id = job_id.map(|id| id.to_string());
    let details = details.to_string();
    let created_at = Utc::now().to_rfc3339();

    retry_on_lock("audit_record", max_wait_ms, || async {
        sqlx::query(
            "INSERT INTO audit_log (job_id, action_type, confidence, details, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&job_id)
        .bind(action_type)
        .bind(confidence)
        .bind(&details)
        .bind(&created_at)
        .execute(pool)
        .await?;
        Ok::<_, Error>(())
    })
    .await
}

/// Audit failures never undo the action they describe
pub async fn record_lossy(
    pool: &SqlitePool,
    job_id: Option<Uuid>,
    action_type: &str,
    confidence: Option<f64>,
    details: serde_json::Value,
    max_wait_ms: u64,
) {
    if let Err(e) = record(pool, job_id, action_type, confidence, details, max_wait_ms).await {
        tracing::warn!(action = action_type, error = %e, "Failed to write audit entry");
    }
}

pub async fn list_for_job(pool: &SqlitePool, job_id: Uuid) -> Result<Vec<AuditEntry>> {
    let rows = sqlx::query(
        "SELECT id, job_id, action_type, confidence, details, created_at
         FROM audit_log WHERE job_id = ? ORDER BY id",
    )
    .bind(job_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<AuditEntry> {
            let details: String = row.get("details");
            let created_at: String = row.get("created_at");
            Ok(AuditEntry {
                id: row.get("id"),
                job_id: Some(job_id),
                action_type: row.get("action_type"),
                confidence: row.get("confidence"),
                details: serde_json::from_str(&details)?,
                created_at: parse_timestamp(&created_at, "audit_log.created_at")?,
            })
        })
        .collect()
}

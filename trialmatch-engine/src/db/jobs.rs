//! Processing job tracker rows

use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use trialmatch_common::{Error, Result};
use uuid::Uuid;

use super::{parse_enum, parse_timestamp, parse_uuid};
use crate::models::{ExtractionQuality, JobStatus, ProcessingJob};
use crate::utils::retry_on_lock;

pub async fn save_job(pool: &SqlitePool, job: &ProcessingJob, max_wait_ms: u64) -> Result<()> {
    let job_id = job.job_id.to_string();
    let errors = serde_json::to_string(&job.error_messages)?;
    let coverage = job.quality.map(|q| q.field_coverage_percentage);
    let confidence = job.quality.map(|q| q.extraction_confidence);
    let updated_at = job.updated_at.to_rfc3339();

    retry_on_lock("save_job", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO processing_jobs (job_id, status, error_messages, field_coverage, extraction_confidence, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(job_id) DO UPDATE SET
                status = excluded.status,
                error_messages = excluded.error_messages,
                field_coverage = excluded.field_coverage,
                extraction_confidence = excluded.extraction_confidence,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&job_id)
        .bind(job.status.as_str())
        .bind(&errors)
        .bind(coverage)
        .bind(confidence)
        .bind(&updated_at)
        .bind(&updated_at)
        .execute(pool)
        .await?;
        Ok::<_, Error>(())
    })
    .await
}

pub async fn get_job(pool: &SqlitePool, job_id: Uuid) -> Result<Option<ProcessingJob>> {
    let row = sqlx::query(
        "SELECT job_id, status, error_messages, field_coverage, extraction_confidence, updated_at
         FROM processing_jobs WHERE job_id = ?",
    )
    .bind(job_id.to_string())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(row_to_job).transpose()
}

/// Flag a job for another extraction pass, appending `message` to its errors
///
/// Jobs unknown to the tracker are created in that state.
pub async fn mark_needs_reprocessing(
    pool: &SqlitePool,
    job_id: Uuid,
    message: &str,
    max_wait_ms: u64,
) -> Result<()> {
    let job_id = job_id.to_string();
    let now = Utc::now().to_rfc3339();

    retry_on_lock("mark_needs_reprocessing", max_wait_ms, || async {
        let mut tx = pool.begin().await?;

        let existing: Option<String> =
            sqlx::query_scalar("SELECT error_messages FROM processing_jobs WHERE job_id = ?")
                .bind(&job_id)
                .fetch_optional(&mut *tx)
                .await?;
        let mut errors: Vec<String> = match existing {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };
        errors.push(message.to_string());
        let errors = serde_json::to_string(&errors)?;

        sqlx::query(
            r#"
            INSERT INTO processing_jobs (job_id, status, error_messages, created_at, updated_at)
            VALUES (?, 'needs_reprocessing', ?, ?, ?)
            ON CONFLICT(job_id) DO UPDATE SET
                status = 'needs_reprocessing',
                error_messages = excluded.error_messages,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&job_id)
        .bind(&errors)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok::<_, Error>(())
    })
    .await
}

fn row_to_job(row: &SqliteRow) -> Result<ProcessingJob> {
    let job_id: String = row.get("job_id");
    let status: String = row.get("status");
    let errors: String = row.get("error_messages");
    let coverage: Option<f64> = row.get("field_coverage");
    let confidence: Option<f64> = row.get("extraction_confidence");
    let updated_at: String = row.get("updated_at");

    let quality = match (coverage, confidence) {
        (Some(field_coverage_percentage), Some(extraction_confidence)) => Some(ExtractionQuality {
            field_coverage_percentage,
            extraction_confidence,
        }),
        _ => None,
    };

    Ok(ProcessingJob {
        job_id: parse_uuid(&job_id, "processing_jobs.job_id")?,
        status: parse_enum::<JobStatus>(&status, "processing_jobs.status")?,
        error_messages: serde_json::from_str(&errors)?,
        quality,
        updated_at: parse_timestamp(&updated_at, "processing_jobs.updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use trialmatch_common::db::init_in_memory_database;

    #[tokio::test]
    async fn reprocessing_appends_to_existing_errors() {
        let pool = init_in_memory_database().await.unwrap();
        let job = ProcessingJob {
            job_id: Uuid::new_v4(),
            status: JobStatus::Completed,
            error_messages: vec!["table on page 4 unreadable".to_string()],
            quality: Some(ExtractionQuality {
                field_coverage_percentage: 82.0,
                extraction_confidence: 0.9,
            }),
            updated_at: Utc::now(),
        };
        save_job(&pool, &job, 1000).await.unwrap();

        mark_needs_reprocessing(&pool, job.job_id, "Rejected in manual review: wrong sponsor", 1000)
            .await
            .unwrap();

        let loaded = get_job(&pool, job.job_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::NeedsReprocessing);
        assert_eq!(loaded.error_messages.len(), 2);
        assert_eq!(loaded.quality, job.quality);
    }

    #[tokio::test]
    async fn reprocessing_unknown_job_creates_row() {
        let pool = init_in_memory_database().await.unwrap();
        let job_id = Uuid::new_v4();
        mark_needs_reprocessing(&pool, job_id, "Rejected in manual review: none", 1000)
            .await
            .unwrap();

        let loaded = get_job(&pool, job_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::NeedsReprocessing);
        assert!(loaded.quality.is_none());
    }
}

//! Persisted resolver results

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use trialmatch_common::{Error, Result};
use uuid::Uuid;

use super::{parse_enum, parse_optional_timestamp, parse_timestamp, parse_uuid};
use crate::models::{MatchCandidate, MatchResult, MatchReviewStatus};
use crate::utils::retry_on_lock;

const SELECT_MATCH: &str = r#"
    SELECT id, processing_job_id, source_file_path, document_hash, extracted,
           best_candidate, alternatives, total_candidates, review_status,
           duplicate_of, reviewed_by, review_notes, reviewed_at, created_at
    FROM match_results
"#;

/// Insert or replace a match result
pub async fn save_match_result(
    pool: &SqlitePool,
    result: &MatchResult,
    max_wait_ms: u64,
) -> Result<()> {
    let id = result.id.to_string();
    let job_id = result.processing_job_id.to_string();
    let extracted = serde_json::to_string(&result.extracted)?;
    let best = result
        .best_match
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let alternatives = serde_json::to_string(&result.alternatives)?;
    let matched_record_id = result.matched_record_id().map(|id| id.to_string());
    let match_type = result.best_match.as_ref().map(|m| m.match_type.as_str());
    let confidence = result.confidence();
    let total_candidates = result.total_candidates as i64;
    let duplicate_of = result.duplicate_of.map(|id| id.to_string());
    let reviewed_at = result.reviewed_at.map(|dt| dt.to_rfc3339());
    let created_at = result.resolved_at.to_rfc3339();

    retry_on_lock("save_match_result", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO match_results (
                id, processing_job_id, source_file_path, document_hash, extracted,
                matched_record_id, match_type, confidence, best_candidate, alternatives,
                total_candidates, review_status, duplicate_of, reviewed_by, review_notes,
                reviewed_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                review_status = excluded.review_status,
                reviewed_by = excluded.reviewed_by,
                review_notes = excluded.review_notes,
                reviewed_at = excluded.reviewed_at
            "#,
        )
        .bind(&id)
        .bind(&job_id)
        .bind(&result.source_file_path)
        .bind(&result.document_hash)
        .bind(&extracted)
        .bind(&matched_record_id)
        .bind(match_type)
        .bind(confidence)
        .bind(&best)
        .bind(&alternatives)
        .bind(total_candidates)
        .bind(result.review_status.as_str())
        .bind(&duplicate_of)
        .bind(&result.reviewed_by)
        .bind(&result.review_notes)
        .bind(&reviewed_at)
        .bind(&created_at)
        .execute(pool)
        .await?;
        Ok::<_, Error>(())
    })
    .await
}

pub async fn get_match_result(pool: &SqlitePool, id: Uuid) -> Result<Option<MatchResult>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_MATCH))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_match).transpose()
}

/// Most recent result for a processing job
pub async fn get_latest_for_job(pool: &SqlitePool, job_id: Uuid) -> Result<Option<MatchResult>> {
    let row = sqlx::query(&format!(
        "{} WHERE processing_job_id = ? ORDER BY created_at DESC, rowid DESC LIMIT 1",
        SELECT_MATCH
    ))
    .bind(job_id.to_string())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(row_to_match).transpose()
}

/// Most recent approved result another job produced from a document with this hash
pub async fn find_prior_by_hash(
    pool: &SqlitePool,
    document_hash: &str,
    exclude_job_id: Uuid,
) -> Result<Option<MatchResult>> {
    if document_hash.is_empty() {
        return Ok(None);
    }
    let row = sqlx::query(&format!(
        r#"{} WHERE document_hash = ?
              AND processing_job_id != ?
              AND matched_record_id IS NOT NULL
              AND review_status = 'approved'
            ORDER BY created_at DESC, rowid DESC LIMIT 1"#,
        SELECT_MATCH
    ))
    .bind(document_hash)
    .bind(exclude_job_id.to_string())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(row_to_match).transpose()
}

/// Record a reviewer verdict on one result
pub async fn set_review_status(
    pool: &SqlitePool,
    id: Uuid,
    status: MatchReviewStatus,
    reviewer: &str,
    notes: Option<&str>,
    reviewed_at: DateTime<Utc>,
    max_wait_ms: u64,
) -> Result<()> {
    let id_str = id.to_string();
    let reviewed_at = reviewed_at.to_rfc3339();

    let affected = retry_on_lock("set_match_review_status", max_wait_ms, || async {
        let result = sqlx::query(
            r#"
            UPDATE match_results
            SET review_status = ?, reviewed_by = ?, review_notes = ?, reviewed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(reviewer)
        .bind(notes)
        .bind(&reviewed_at)
        .bind(&id_str)
        .execute(pool)
        .await?;
        Ok::<_, Error>(result.rows_affected())
    })
    .await?;

    if affected == 0 {
        return Err(Error::NotFound(format!("Match result {}", id)));
    }
    Ok(())
}

/// Approve every result of a job still waiting on review; returns how many changed
pub async fn approve_pending_for_job(
    pool: &SqlitePool,
    job_id: Uuid,
    reviewer: &str,
    notes: Option<&str>,
    max_wait_ms: u64,
) -> Result<u64> {
    let job_id = job_id.to_string();
    let reviewed_at = Utc::now().to_rfc3339();

    retry_on_lock("approve_pending_matches", max_wait_ms, || async {
        let result = sqlx::query(
            r#"
            UPDATE match_results
            SET review_status = 'approved', reviewed_by = ?, review_notes = ?, reviewed_at = ?
            WHERE processing_job_id = ?
              AND review_status IN ('pending', 'needs_manual_review')
            "#,
        )
        .bind(reviewer)
        .bind(notes)
        .bind(&reviewed_at)
        .bind(&job_id)
        .execute(pool)
        .await?;
        Ok::<_, Error>(result.rows_affected())
    })
    .await
}

fn row_to_match(row: &SqliteRow) -> Result<MatchResult> {
    let id: String = row.get("id");
    let job_id: String = row.get("processing_job_id");
    let extracted: String = row.get("extracted");
    let best: Option<String> = row.get("best_candidate");
    let alternatives: String = row.get("alternatives");
    let status: String = row.get("review_status");
    let duplicate_of: Option<String> = row.get("duplicate_of");
    let created_at: String = row.get("created_at");

    let best_match: Option<MatchCandidate> =
        best.map(|b| serde_json::from_str(&b)).transpose()?;

    Ok(MatchResult {
        id: parse_uuid(&id, "match_results.id")?,
        processing_job_id: parse_uuid(&job_id, "match_results.processing_job_id")?,
        source_file_path: row.get("source_file_path"),
        document_hash: row.get("document_hash"),
        extracted: serde_json::from_str(&extracted)?,
        best_match,
        alternatives: serde_json::from_str(&alternatives)?,
        total_candidates: row.get::<i64, _>("total_candidates") as usize,
        review_status: parse_enum(&status, "match_results.review_status")?,
        duplicate_of: duplicate_of
            .map(|d| parse_uuid(&d, "match_results.duplicate_of"))
            .transpose()?,
        reviewed_by: row.get("reviewed_by"),
        review_notes: row.get("review_notes"),
        reviewed_at: parse_optional_timestamp(row.get("reviewed_at"), "match_results.reviewed_at")?,
        resolved_at: parse_timestamp(&created_at, "match_results.created_at")?,
    })
}

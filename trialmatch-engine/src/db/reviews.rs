//! Review item rows
//!
//! State transitions are conditional updates: the `WHERE` clause names the
//! state the caller expects, so of two concurrent writers exactly one sees a
//! changed row. Callers treat `false` as a conflict.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use trialmatch_common::{Error, Result};
use uuid::Uuid;

use super::{parse_enum, parse_optional_timestamp, parse_timestamp, parse_uuid};
use crate::models::{ReviewItem, ReviewStatus};
use crate::utils::retry_on_lock;

const SELECT_REVIEW: &str = r#"
    SELECT id, job_id, review_type, priority, reasons, status, assigned_to,
           assigned_at, completed_at, decision_notes, escalated_from, created_at
    FROM review_items
"#;

pub async fn insert_review_item(pool: &SqlitePool, item: &ReviewItem, max_wait_ms: u64) -> Result<()> {
    let id = item.id.to_string();
    let job_id = item.job_id.to_string();
    let reasons = serde_json::to_string(&item.reasons)?;
    let assigned_at = item.assigned_at.map(|dt| dt.to_rfc3339());
    let completed_at = item.completed_at.map(|dt| dt.to_rfc3339());
    let escalated_from = item.escalated_from.map(|id| id.to_string());
    let created_at = item.created_at.to_rfc3339();

    retry_on_lock("insert_review_item", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO review_items (
                id, job_id, review_type, priority, reasons, status, assigned_to,
                assigned_at, completed_at, decision_notes, escalated_from, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&job_id)
        .bind(item.review_type.as_str())
        .bind(item.priority.as_str())
        .bind(&reasons)
        .bind(item.status.as_str())
        .bind(&item.assigned_to)
        .bind(&assigned_at)
        .bind(&completed_at)
        .bind(&item.decision_notes)
        .bind(&escalated_from)
        .bind(&created_at)
        .execute(pool)
        .await?;
        Ok::<_, Error>(())
    })
    .await
}

pub async fn get_review_item(pool: &SqlitePool, id: Uuid) -> Result<Option<ReviewItem>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_REVIEW))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_review).transpose()
}

/// Pending items in creation order, for rebuilding the in-memory queue
pub async fn list_pending(pool: &SqlitePool) -> Result<Vec<ReviewItem>> {
    let rows = sqlx::query(&format!(
        "{} WHERE status = 'pending' ORDER BY created_at, rowid",
        SELECT_REVIEW
    ))
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_review).collect()
}

pub async fn list_in_review_for(pool: &SqlitePool, reviewer_id: &str) -> Result<Vec<ReviewItem>> {
    let rows = sqlx::query(&format!(
        "{} WHERE status = 'in_review' AND assigned_to = ? ORDER BY assigned_at",
        SELECT_REVIEW
    ))
    .bind(reviewer_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_review).collect()
}

/// `pending` and unassigned → `in_review` for `reviewer_id`
pub async fn try_assign(
    pool: &SqlitePool,
    id: Uuid,
    reviewer_id: &str,
    assigned_at: DateTime<Utc>,
    max_wait_ms: u64,
) -> Result<bool> {
    let id = id.to_string();
    let assigned_at = assigned_at.to_rfc3339();

    retry_on_lock("assign_review", max_wait_ms, || async {
        let result = sqlx::query(
            r#"
            UPDATE review_items
            SET status = 'in_review', assigned_to = ?, assigned_at = ?
            WHERE id = ? AND status = 'pending' AND assigned_to IS NULL
            "#,
        )
        .bind(reviewer_id)
        .bind(&assigned_at)
        .bind(&id)
        .execute(pool)
        .await?;
        Ok::<_, Error>(result.rows_affected() == 1)
    })
    .await
}

/// `in_review` by `reviewer_id` → `pending`, unassigned
pub async fn try_release(
    pool: &SqlitePool,
    id: Uuid,
    reviewer_id: &str,
    max_wait_ms: u64,
) -> Result<bool> {
    let id = id.to_string();

    retry_on_lock("release_review", max_wait_ms, || async {
        let result = sqlx::query(
            r#"
            UPDATE review_items
            SET status = 'pending', assigned_to = NULL, assigned_at = NULL
            WHERE id = ? AND status = 'in_review' AND assigned_to = ?
            "#,
        )
        .bind(&id)
        .bind(reviewer_id)
        .execute(pool)
        .await?;
        Ok::<_, Error>(result.rows_affected() == 1)
    })
    .await
}

/// `in_review` by `reviewer_id` → terminal `status`
pub async fn try_complete(
    pool: &SqlitePool,
    id: Uuid,
    reviewer_id: &str,
    status: ReviewStatus,
    notes: Option<&str>,
    completed_at: DateTime<Utc>,
    max_wait_ms: u64,
) -> Result<bool> {
    let id = id.to_string();
    let completed_at = completed_at.to_rfc3339();

    retry_on_lock("complete_review", max_wait_ms, || async {
        let result = sqlx::query(
            r#"
            UPDATE review_items
            SET status = ?, decision_notes = ?, completed_at = ?
            WHERE id = ? AND status = 'in_review' AND assigned_to = ?
            "#,
        )
        .bind(status.as_str())
        .bind(notes)
        .bind(&completed_at)
        .bind(&id)
        .bind(reviewer_id)
        .execute(pool)
        .await?;
        Ok::<_, Error>(result.rows_affected() == 1)
    })
    .await
}

/// Decision counts across all reviewers
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecisionCounts {
    pub total: i64,
    pub approved: i64,
}

pub async fn decision_counts(pool: &SqlitePool) -> Result<DecisionCounts> {
    let (total, approved): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COALESCE(SUM(CASE WHEN status = 'approved' THEN 1 ELSE 0 END), 0)
        FROM review_items
        WHERE status NOT IN ('pending', 'in_review')
        "#,
    )
    .fetch_one(pool)
    .await?;
    Ok(DecisionCounts { total, approved })
}

/// Items `reviewer_id` decided since `since`
pub async fn completed_by_since(
    pool: &SqlitePool,
    reviewer_id: &str,
    since: DateTime<Utc>,
) -> Result<Vec<ReviewItem>> {
    let rows = sqlx::query(&format!(
        r#"{} WHERE assigned_to = ?
              AND status NOT IN ('pending', 'in_review')
              AND completed_at >= ?
            ORDER BY completed_at"#,
        SELECT_REVIEW
    ))
    .bind(reviewer_id)
    .bind(since.to_rfc3339())
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_review).collect()
}

fn row_to_review(row: &SqliteRow) -> Result<ReviewItem> {
    let id: String = row.get("id");
    let job_id: String = row.get("job_id");
    let review_type: String = row.get("review_type");
    let priority: String = row.get("priority");
    let reasons: String = row.get("reasons");
    let status: String = row.get("status");
    let escalated_from: Option<String> = row.get("escalated_from");
    let created_at: String = row.get("created_at");

    Ok(ReviewItem {
        id: parse_uuid(&id, "review_items.id")?,
        job_id: parse_uuid(&job_id, "review_items.job_id")?,
        review_type: parse_enum(&review_type, "review_items.review_type")?,
        priority: parse_enum(&priority, "review_items.priority")?,
        reasons: serde_json::from_str(&reasons)?,
        status: parse_enum(&status, "review_items.status")?,
        assigned_to: row.get("assigned_to"),
        assigned_at: parse_optional_timestamp(row.get("assigned_at"), "review_items.assigned_at")?,
        completed_at: parse_optional_timestamp(row.get("completed_at"), "review_items.completed_at")?,
        decision_notes: row.get("decision_notes"),
        escalated_from: escalated_from
            .map(|e| parse_uuid(&e, "review_items.escalated_from"))
            .transpose()?,
        created_at: parse_timestamp(&created_at, "review_items.created_at")?,
    })
}

//! Threshold correction history

use sqlx::{Row, SqlitePool};
use trialmatch_common::{Error, Result};

use super::{parse_enum, parse_timestamp, parse_uuid};
use crate::models::CorrectionEvent;
use crate::utils::retry_on_lock;

pub async fn insert_correction(pool: &SqlitePool, event: &CorrectionEvent, max_wait_ms: u64) -> Result<()> {
    let id = event.id.to_string();
    let recorded_at = event.recorded_at.to_rfc3339();

    retry_on_lock("insert_correction", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO similarity_corrections (
                id, criterion_a, criterion_b, user_action, similarity,
                concept_tag, threshold_delta, comparison_id, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&event.criterion_a)
        .bind(&event.criterion_b)
        .bind(event.action.as_str())
        .bind(event.similarity)
        .bind(&event.concept_tag)
        .bind(event.threshold_delta)
        .bind(&event.comparison_id)
        .bind(&recorded_at)
        .execute(pool)
        .await?;
        Ok::<_, Error>(())
    })
    .await
}

/// Sum and count of recorded deltas for a concept tag
pub async fn delta_totals(pool: &SqlitePool, concept_tag: &str) -> Result<(f64, i64)> {
    let totals: (f64, i64) = sqlx::query_as(
        "SELECT COALESCE(SUM(threshold_delta), 0.0), COUNT(*) FROM similarity_corrections WHERE concept_tag = ?",
    )
    .bind(concept_tag)
    .fetch_one(pool)
    .await?;
    Ok(totals)
}

/// Most recent corrections for a tag, newest first
pub async fn list_for_tag(pool: &SqlitePool, concept_tag: &str, limit: u32) -> Result<Vec<CorrectionEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT id, criterion_a, criterion_b, user_action, similarity, concept_tag,
               threshold_delta, comparison_id, recorded_at
        FROM similarity_corrections
        WHERE concept_tag = ?
        ORDER BY recorded_at DESC
        LIMIT ?
        "#,
    )
    .bind(concept_tag)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<CorrectionEvent> {
            let id: String = row.get("id");
            let action: String = row.get("user_action");
            let recorded_at: String = row.get("recorded_at");
            Ok(CorrectionEvent {
                id: parse_uuid(&id, "similarity_corrections.id")?,
                criterion_a: row.get("criterion_a"),
                criterion_b: row.get("criterion_b"),
                action: parse_enum(&action, "similarity_corrections.user_action")?,
                similarity: row.get("similarity"),
                concept_tag: row.get("concept_tag"),
                threshold_delta: row.get("threshold_delta"),
                comparison_id: row.get("comparison_id"),
                recorded_at: parse_timestamp(&recorded_at, "similarity_corrections.recorded_at")?,
            })
        })
        .collect()
}

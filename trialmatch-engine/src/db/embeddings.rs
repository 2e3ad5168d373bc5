//! Stored criterion vectors
//!
//! Vectors are little-endian `f32` BLOBs tagged with the model version that
//! produced them.

use sqlx::{Row, SqlitePool};
use trialmatch_common::{Error, Result};

use super::parse_timestamp;
use crate::models::CriterionVector;
use crate::utils::retry_on_lock;

pub async fn get_vector(pool: &SqlitePool, criterion_id: &str) -> Result<Option<CriterionVector>> {
    let row = sqlx::query(
        "SELECT criterion_id, embedding, dimension, model_version, generated_at
         FROM criterion_embeddings WHERE criterion_id = ?",
    )
    .bind(criterion_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let blob: Vec<u8> = row.get("embedding");
    let dimension: i64 = row.get("dimension");
    let values = decode_vector(&blob)?;
    if values.len() as i64 != dimension {
        return Err(Error::Internal(format!(
            "Stored embedding for {} has {} values, expected {}",
            criterion_id,
            values.len(),
            dimension
        )));
    }

    let generated_at: String = row.get("generated_at");
    Ok(Some(CriterionVector {
        criterion_id: row.get("criterion_id"),
        values,
        model_version: row.get("model_version"),
        generated_at: parse_timestamp(&generated_at, "criterion_embeddings.generated_at")?,
    }))
}

/// Insert or replace the vector for a criterion
pub async fn upsert_vector(
    pool: &SqlitePool,
    vector: &CriterionVector,
    criterion_text: &str,
    max_wait_ms: u64,
) -> Result<()> {
    let blob = encode_vector(&vector.values);
    let dimension = vector.values.len() as i64;
    let generated_at = vector.generated_at.to_rfc3339();

    retry_on_lock("upsert_embedding", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO criterion_embeddings (criterion_id, criterion_text, embedding, dimension, model_version, generated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(criterion_id) DO UPDATE SET
                criterion_text = excluded.criterion_text,
                embedding = excluded.embedding,
                dimension = excluded.dimension,
                model_version = excluded.model_version,
                generated_at = excluded.generated_at
            "#,
        )
        .bind(&vector.criterion_id)
        .bind(criterion_text)
        .bind(&blob)
        .bind(dimension)
        .bind(&vector.model_version)
        .bind(&generated_at)
        .execute(pool)
        .await?;
        Ok::<_, Error>(())
    })
    .await
}

pub fn encode_vector(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn decode_vector(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(Error::Internal(format!(
            "Embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use trialmatch_common::db::init_in_memory_database;

    #[test]
    fn truncated_blob_is_rejected() {
        assert!(decode_vector(&[0, 0, 128]).is_err());
        assert_eq!(decode_vector(&encode_vector(&[1.5, -2.0])).unwrap(), vec![1.5, -2.0]);
    }

    #[tokio::test]
    async fn upsert_replaces_model_version() {
        let pool = init_in_memory_database().await.unwrap();
        let mut vector = CriterionVector {
            criterion_id: "inc-1".to_string(),
            values: vec![0.1, 0.2, 0.3],
            model_version: "m1".to_string(),
            generated_at: Utc::now(),
        };
        upsert_vector(&pool, &vector, "Age 18 or older", 1000).await.unwrap();

        vector.model_version = "m2".to_string();
        vector.values = vec![0.3, 0.2, 0.1];
        upsert_vector(&pool, &vector, "Age 18 or older", 1000).await.unwrap();

        let stored = get_vector(&pool, "inc-1").await.unwrap().unwrap();
        assert_eq!(stored.model_version, "m2");
        assert_eq!(stored.values, vec![0.3, 0.2, 0.1]);
    }
}

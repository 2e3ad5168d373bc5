//! Trial catalog lookups
//!
//! The resolver only reads the catalog. `CatalogStore` is the seam between
//! the resolver and wherever the catalog lives; `SqliteCatalog` serves it from
//! the local `catalog_trials` mirror.

use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use trialmatch_common::Result;
use uuid::Uuid;

use super::parse_uuid;
use crate::models::CandidateRecord;

/// Catalog queries used by the matching strategies
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Case-insensitive protocol number equality
    async fn find_by_exact_identifier(&self, protocol_number: &str) -> Result<Vec<CandidateRecord>>;

    async fn find_by_registry_number(&self, registry_number: &str) -> Result<Vec<CandidateRecord>>;

    /// Records whose sponsor contains `sponsor`, case-insensitive
    async fn find_by_sponsor(&self, sponsor: &str, limit: u32) -> Result<Vec<CandidateRecord>>;

    async fn find_by_phase(&self, phase: &str, limit: u32) -> Result<Vec<CandidateRecord>>;

    async fn find_by_sponsor_and_phase(
        &self,
        sponsor: &str,
        phase: &str,
        limit: u32,
    ) -> Result<Vec<CandidateRecord>>;
}

const SELECT_TRIAL: &str =
    "SELECT id, protocol_number, title, sponsor, phase, registry_number, conditions FROM catalog_trials";

/// Catalog served from the `catalog_trials` table
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn find_by_exact_identifier(&self, protocol_number: &str) -> Result<Vec<CandidateRecord>> {
        let rows = sqlx::query(&format!(
            "{} WHERE UPPER(protocol_number) = UPPER(?) ORDER BY id",
            SELECT_TRIAL
        ))
        .bind(protocol_number)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn find_by_registry_number(&self, registry_number: &str) -> Result<Vec<CandidateRecord>> {
        let rows = sqlx::query(&format!(
            "{} WHERE UPPER(registry_number) = UPPER(?) ORDER BY id",
            SELECT_TRIAL
        ))
        .bind(registry_number)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn find_by_sponsor(&self, sponsor: &str, limit: u32) -> Result<Vec<CandidateRecord>> {
        let rows = sqlx::query(&format!(
            "{} WHERE UPPER(sponsor) LIKE UPPER(?) ORDER BY id LIMIT ?",
            SELECT_TRIAL
        ))
        .bind(format!("%{}%", sponsor))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn find_by_phase(&self, phase: &str, limit: u32) -> Result<Vec<CandidateRecord>> {
        let rows = sqlx::query(&format!(
            "{} WHERE UPPER(phase) = UPPER(?) ORDER BY id LIMIT ?",
            SELECT_TRIAL
        ))
        .bind(phase)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn find_by_sponsor_and_phase(
        &self,
        sponsor: &str,
        phase: &str,
        limit: u32,
    ) -> Result<Vec<CandidateRecord>> {
        let rows = sqlx::query(&format!(
            "{} WHERE UPPER(sponsor) LIKE UPPER(?) AND UPPER(phase) = UPPER(?) ORDER BY id LIMIT ?",
            SELECT_TRIAL
        ))
        .bind(format!("%{}%", sponsor))
        .bind(phase)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }
}

/// Insert or refresh one catalog record (mirror sync and fixtures)
pub async fn upsert_trial(pool: &SqlitePool, record: &CandidateRecord) -> Result<()> {
    let conditions = serde_json::to_string(&record.conditions)?;
    sqlx::query(
        r#"
        INSERT INTO catalog_trials (id, protocol_number, title, sponsor, phase, registry_number, conditions, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            protocol_number = excluded.protocol_number,
            title = excluded.title,
            sponsor = excluded.sponsor,
            phase = excluded.phase,
            registry_number = excluded.registry_number,
            conditions = excluded.conditions,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(record.id.to_string())
    .bind(&record.protocol_number)
    .bind(&record.title)
    .bind(&record.sponsor)
    .bind(&record.phase)
    .bind(&record.registry_number)
    .bind(conditions)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_trial(pool: &SqlitePool, id: Uuid) -> Result<Option<CandidateRecord>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_TRIAL))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_record).transpose()
}

fn row_to_record(row: &SqliteRow) -> Result<CandidateRecord> {
    let id: String = row.get("id");
    let conditions: String = row.get("conditions");
    Ok(CandidateRecord {
        id: parse_uuid(&id, "catalog_trials.id")?,
        protocol_number: row.get("protocol_number"),
        title: row.get("title"),
        sponsor: row.get("sponsor"),
        phase: row.get("phase"),
        registry_number: row.get("registry_number"),
        conditions: serde_json::from_str(&conditions)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use trialmatch_common::db::init_in_memory_database;

    fn trial(protocol: &str, sponsor: &str, phase: &str) -> CandidateRecord {
        CandidateRecord {
            id: Uuid::new_v4(),
            protocol_number: protocol.to_string(),
            title: format!("Study {}", protocol),
            sponsor: Some(sponsor.to_string()),
            phase: Some(phase.to_string()),
            registry_number: None,
            conditions: vec!["oncology".to_string()],
        }
    }

    #[tokio::test]
    async fn exact_identifier_ignores_case() {
        let pool = init_in_memory_database().await.unwrap();
        let record = trial("abc-101", "Acme Pharma", "Phase 2");
        upsert_trial(&pool, &record).await.unwrap();

        let catalog = SqliteCatalog::new(pool);
        let found = catalog.find_by_exact_identifier("ABC-101").await.unwrap();
        assert_eq!(found, vec![record]);
    }

    #[tokio::test]
    async fn sponsor_matches_substring_and_respects_limit() {
        let pool = init_in_memory_database().await.unwrap();
        for i in 0..5 {
            upsert_trial(&pool, &trial(&format!("P-{}", i), "Acme Pharma Inc", "PHASE 2"))
                .await
                .unwrap();
        }
        upsert_trial(&pool, &trial("Q-1", "Other Co", "PHASE 2")).await.unwrap();

        let catalog = SqliteCatalog::new(pool);
        assert_eq!(catalog.find_by_sponsor("acme pharma", 50).await.unwrap().len(), 5);
        assert_eq!(catalog.find_by_sponsor("acme", 3).await.unwrap().len(), 3);
        assert_eq!(
            catalog
                .find_by_sponsor_and_phase("other", "phase 2", 20)
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(catalog.find_by_phase("PHASE 2", 50).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_row() {
        let pool = init_in_memory_database().await.unwrap();
        let mut record = trial("ABC-1", "Acme", "PHASE 1");
        upsert_trial(&pool, &record).await.unwrap();
        record.registry_number = Some("NCT01234567".to_string());
        upsert_trial(&pool, &record).await.unwrap();

        let loaded = get_trial(&pool, record.id).await.unwrap().unwrap();
        assert_eq!(loaded.registry_number.as_deref(), Some("NCT01234567"));
    }
}

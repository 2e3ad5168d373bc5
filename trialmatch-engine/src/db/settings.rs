//! Key/value settings table
//!
//! Runtime overrides that take priority over the TOML file.

use sqlx::SqlitePool;
use trialmatch_common::{Error, Result};

pub const EMBEDDING_API_KEY: &str = "embedding_api_key";
pub const LOW_CONFIDENCE_THRESHOLD: &str = "low_confidence_threshold";

pub async fn get_embedding_api_key(db: &SqlitePool) -> Result<Option<String>> {
    get_setting::<String>(db, EMBEDDING_API_KEY).await
}

pub async fn set_embedding_api_key(db: &SqlitePool, key: &str) -> Result<()> {
    set_setting(db, EMBEDDING_API_KEY, key).await
}

/// Classification cut below which a match needs manual review
pub async fn get_low_confidence_threshold(db: &SqlitePool) -> Result<Option<f64>> {
    get_setting::<f64>(db, LOW_CONFIDENCE_THRESHOLD).await
}

pub async fn set_low_confidence_threshold(db: &SqlitePool, value: f64) -> Result<()> {
    set_setting(db, LOW_CONFIDENCE_THRESHOLD, value).await
}

pub async fn get_setting<T>(db: &SqlitePool, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    value
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| Error::Config(format!("Setting {} is malformed: {}", key, e)))
        })
        .transpose()
}

pub async fn set_setting<T: ToString>(db: &SqlitePool, key: &str, value: T) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trialmatch_common::db::init_in_memory_database;

    #[tokio::test]
    async fn missing_setting_is_none() {
        let pool = init_in_memory_database().await.unwrap();
        assert_eq!(get_low_confidence_threshold(&pool).await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_overwrites_previous_value() {
        let pool = init_in_memory_database().await.unwrap();
        set_low_confidence_threshold(&pool, 0.65).await.unwrap();
        set_low_confidence_threshold(&pool, 0.6).await.unwrap();
        assert_eq!(get_low_confidence_threshold(&pool).await.unwrap(), Some(0.6));
    }

    #[tokio::test]
    async fn malformed_value_is_config_error() {
        let pool = init_in_memory_database().await.unwrap();
        set_setting(&pool, LOW_CONFIDENCE_THRESHOLD, "seventy").await.unwrap();
        let err = get_low_confidence_threshold(&pool).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

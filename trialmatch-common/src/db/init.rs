//! Database initialization
//!
//! Opens (or creates) the SQLite database, applies connection pragmas and
//! creates every table idempotently. Safe to call on each start-up.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Default busy timeout applied to every connection (ms)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Open or create the database file and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    // WAL lets concurrent resolutions read while one writer commits
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query(&format!("PRAGMA busy_timeout = {}", DEFAULT_BUSY_TIMEOUT_MS))
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema
///
/// Limited to a single connection that never expires: every SQLite
/// `:memory:` connection is its own database.
pub async fn init_in_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes if they don't exist
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_catalog_table(pool).await?;
    create_processing_jobs_table(pool).await?;
    create_match_results_table(pool).await?;
    create_criterion_embeddings_table(pool).await?;
    create_similarity_corrections_table(pool).await?;
    create_review_items_table(pool).await?;
    create_audit_log_table(pool).await?;

    info!("Database schema verified");
    Ok(())
}

/// Key/value settings (runtime overrides for thresholds, API keys)
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Read-only mirror of the trial catalog
pub async fn create_catalog_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_trials (
            id TEXT PRIMARY KEY,
            protocol_number TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            sponsor TEXT,
            phase TEXT,
            registry_number TEXT,
            conditions TEXT NOT NULL DEFAULT '[]',
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_catalog_protocol ON catalog_trials(UPPER(protocol_number))",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_catalog_registry ON catalog_trials(UPPER(registry_number))",
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Processing jobs as seen by the review workflow
pub async fn create_processing_jobs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processing_jobs (
            job_id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            error_messages TEXT NOT NULL DEFAULT '[]',
            field_coverage REAL,
            extraction_confidence REAL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// One row per resolver run
pub async fn create_match_results_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS match_results (
            id TEXT PRIMARY KEY,
            processing_job_id TEXT NOT NULL,
            source_file_path TEXT NOT NULL,
            document_hash TEXT NOT NULL DEFAULT '',
            extracted TEXT NOT NULL,
            matched_record_id TEXT,
            match_type TEXT,
            confidence REAL NOT NULL DEFAULT 0.0,
            best_candidate TEXT,
            alternatives TEXT NOT NULL DEFAULT '[]',
            total_candidates INTEGER NOT NULL DEFAULT 0,
            review_status TEXT NOT NULL,
            duplicate_of TEXT,
            reviewed_by TEXT,
            review_notes TEXT,
            reviewed_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_match_results_job ON match_results(processing_job_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_match_results_hash ON match_results(document_hash)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Criterion vectors, keyed by criterion id and tagged with the model version
pub async fn create_criterion_embeddings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS criterion_embeddings (
            criterion_id TEXT PRIMARY KEY,
            criterion_text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            dimension INTEGER NOT NULL,
            model_version TEXT NOT NULL,
            generated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Human merge/separate corrections driving threshold drift
pub async fn create_similarity_corrections_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS similarity_corrections (
            id TEXT PRIMARY KEY,
            criterion_a TEXT NOT NULL,
            criterion_b TEXT NOT NULL,
            user_action TEXT NOT NULL,
            similarity REAL NOT NULL,
            concept_tag TEXT NOT NULL,
            threshold_delta REAL NOT NULL,
            comparison_id TEXT,
            recorded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_corrections_tag ON similarity_corrections(concept_tag)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Manual review work items
pub async fn create_review_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS review_items (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL,
            review_type TEXT NOT NULL,
            priority TEXT NOT NULL,
            reasons TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL,
            assigned_to TEXT,
            assigned_at TEXT,
            completed_at TEXT,
            decision_notes TEXT,
            escalated_from TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_review_items_status ON review_items(status)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_review_items_assignee ON review_items(assigned_to)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Append-only record of automated and human decisions
pub async fn create_audit_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT,
            action_type TEXT NOT NULL,
            confidence REAL,
            details TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_log_job ON audit_log(job_id)")
        .execute(pool)
        .await?;
    Ok(())
}

//! Database initialization
//!
//! Creates the database on first run and brings the schema up idempotently:
//! every statement is `IF NOT EXISTS`, so opening an existing database is
//! safe.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// SQLite busy timeout; contention beyond this is handled by `retry_on_lock`
pub const BUSY_TIMEOUT_MS: u64 = 250;

/// Open (creating if needed) the database and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables, indexes and guards
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_entities_table(pool).await?;
    create_tags_table(pool).await?;
    create_votes_table(pool).await?;
    create_reputation_records_table(pool).await?;
    create_reputation_events_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Canonical entities promoted from agreeing approved tags
async fn create_entities_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            id TEXT PRIMARY KEY,
            canonical_name TEXT NOT NULL,
            normalized_name TEXT NOT NULL UNIQUE,
            supporting_submitters INTEGER NOT NULL,
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_tags_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id TEXT PRIMARY KEY,
            content_id TEXT NOT NULL,
            entity_name TEXT NOT NULL,
            normalized_name TEXT NOT NULL,
            attrs TEXT,
            submitter_id TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'approved', 'rejected')),
            upvotes INTEGER NOT NULL DEFAULT 0,
            downvotes INTEGER NOT NULL DEFAULT 0,
            confidence REAL NOT NULL DEFAULT 0.5,
            entity_id TEXT REFERENCES entities(id),
            decided_by TEXT,
            decided_at TIMESTAMP,
            rejection_reason TEXT,
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one open (pending or approved) tag per triple
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_tags_open_triple
        ON tags (content_id, normalized_name, submitter_id)
        WHERE status IN ('pending', 'approved')
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tags_content ON tags (content_id, created_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tags_queue ON tags (status, confidence, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tags_normalized ON tags (normalized_name, status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_votes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS votes (
            tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
            voter_id TEXT NOT NULL,
            direction TEXT NOT NULL CHECK (direction IN ('up', 'down')),
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            PRIMARY KEY (tag_id, voter_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_reputation_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reputation_records (
            user_id TEXT PRIMARY KEY,
            approved_tags INTEGER NOT NULL DEFAULT 0,
            rejected_tags INTEGER NOT NULL DEFAULT 0,
            pending_tags INTEGER NOT NULL DEFAULT 0,
            upvotes_received INTEGER NOT NULL DEFAULT 0,
            downvotes_received INTEGER NOT NULL DEFAULT 0,
            reputation_score REAL NOT NULL,
            trust_level TEXT NOT NULL,
            auto_approve INTEGER NOT NULL,
            trust_override TEXT,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Append-only history; UPDATE and DELETE are refused by the database
async fn create_reputation_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reputation_events (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES reputation_records(user_id),
            event_type TEXT NOT NULL,
            score_before REAL NOT NULL,
            score_after REAL NOT NULL,
            trust_before TEXT NOT NULL,
            trust_after TEXT NOT NULL,
            metadata TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_reputation_events_user ON reputation_events (user_id, seq)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS reputation_events_no_update
        BEFORE UPDATE ON reputation_events
        BEGIN
            SELECT RAISE(ABORT, 'reputation_events is append-only');
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS reputation_events_no_delete
        BEFORE DELETE ON reputation_events
        BEGIN
            SELECT RAISE(ABORT, 'reputation_events is append-only');
        END
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

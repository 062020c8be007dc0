//! Database migrations
//!
//! Versioned SQLite schema migrations, applied automatically on connection.

use sqlx::SqlitePool;

use crate::error::Result;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: records table and keyword index
const MIGRATION_V1: &str = r#"
    -- Content records: the source of truth for everything ingested
    CREATE TABLE IF NOT EXISTS records (
        id TEXT PRIMARY KEY NOT NULL,
        kind TEXT NOT NULL CHECK (kind IN ('post', 'comment', 'chat_turn')),
        author TEXT NOT NULL DEFAULT '',
        title TEXT,
        content TEXT NOT NULL DEFAULT '',
        collection TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        score INTEGER NOT NULL DEFAULT 0,
        parent_id TEXT,
        thread_id TEXT,
        url TEXT NOT NULL DEFAULT '',
        comment_count INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection);
    CREATE INDEX IF NOT EXISTS idx_records_thread_id ON records(thread_id);
    CREATE INDEX IF NOT EXISTS idx_records_created_at ON records(created_at);

    -- Keyword index over the records. Kept in sync explicitly, inside the
    -- same transaction as the records write (no triggers: the entities
    -- column is computed at write time, not stored on the base row as text).
    CREATE VIRTUAL TABLE IF NOT EXISTS records_fts USING fts5(
        id UNINDEXED,
        title,
        content,
        author,
        collection
    );
"#;

/// Migration 2: inference annotations and co-occurrence edges
const MIGRATION_V2: &str = r#"
    -- Annotations produced during ingestion
    ALTER TABLE records ADD COLUMN entities TEXT NOT NULL DEFAULT '[]';
    ALTER TABLE records ADD COLUMN embedding BLOB;
    ALTER TABLE records ADD COLUMN sentiment REAL NOT NULL DEFAULT 0.0;

    -- Rebuild the keyword index with an entities column so extracted
    -- entity names are searchable alongside the text
    DROP TABLE IF EXISTS records_fts;
    CREATE VIRTUAL TABLE records_fts USING fts5(
        id UNINDEXED,
        title,
        content,
        author,
        collection,
        entities
    );

    -- Entity co-occurrence pairs, one row per (pair, originating record)
    CREATE TABLE IF NOT EXISTS co_occurrences (
        entity_a TEXT NOT NULL,
        entity_b TEXT NOT NULL,
        confidence REAL NOT NULL,
        record_id TEXT NOT NULL,
        PRIMARY KEY (entity_a, entity_b, record_id)
    );

    CREATE INDEX IF NOT EXISTS idx_co_occurrences_record_id ON co_occurrences(record_id);
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> Result<i32> {
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let row: Option<(i32,)> = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|(v,)| v).unwrap_or(0))
}

/// Record that a migration has been applied
async fn record_migration(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: records and keyword index");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: annotations and co-occurrences");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool")
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await;

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, 0);
        assert!(status.needs_migration);

        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
        assert!(!status.needs_migration);
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let pool = create_test_pool().await;

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_tables_created() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        for table in ["records", "records_fts", "co_occurrences"] {
            let result: (i32,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&pool)
                .await
                .unwrap_or_else(|_| panic!("Table {} should exist", table));
            assert_eq!(result.0, 0, "Table {} should be empty", table);
        }
    }

    #[tokio::test]
    async fn test_fts_has_entities_column() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO records_fts (id, title, content, author, collection, entities) \
             VALUES ('p1', 't', 'c', 'a', 'col', 'Franklin Barbecue')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let (id,): (String,) =
            sqlx::query_as("SELECT id FROM records_fts WHERE records_fts MATCH 'franklin'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(id, "p1");
    }
}

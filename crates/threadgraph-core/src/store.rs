//! Document store
//!
//! SQLite-backed source of truth for content records. Every write keeps the
//! `records_fts` keyword index in sync inside the same transaction, so the
//! store and the index can never disagree.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::record::{ContentRecord, ExtractedEntity, RecordKind};

/// SQLite document store keyed by record id
#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

/// Summary of one conversation thread
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConversationSummary {
    pub thread_id: String,
    pub title: String,
    pub turn_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or fully replace a record, mirroring it into the keyword index
    pub async fn upsert(&self, record: &ContentRecord) -> Result<()> {
        record.validate()?;

        let entities_json = serde_json::to_string(&record.entities)
            .map_err(|e| Error::Other(format!("Failed to serialize entities: {}", e)))?;
        let embedding_bytes: Vec<u8> = record
            .embedding
            .iter()
            .flat_map(|f| f.to_le_bytes())
            .collect();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO records (
                id, kind, author, title, content, collection, created_at,
                score, parent_id, thread_id, url, comment_count,
                entities, embedding, sentiment
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                author = excluded.author,
                title = excluded.title,
                content = excluded.content,
                collection = excluded.collection,
                created_at = excluded.created_at,
                score = excluded.score,
                parent_id = excluded.parent_id,
                thread_id = excluded.thread_id,
                url = excluded.url,
                comment_count = excluded.comment_count,
                entities = excluded.entities,
                embedding = excluded.embedding,
                sentiment = excluded.sentiment
            "#,
        )
        .bind(&record.id)
        .bind(record.kind.as_str())
        .bind(&record.author)
        .bind(&record.title)
        .bind(&record.content)
        .bind(&record.collection)
        .bind(record.created_at.to_rfc3339())
        .bind(record.score)
        .bind(&record.parent_id)
        .bind(&record.thread_id)
        .bind(&record.url)
        .bind(record.comment_count)
        .bind(&entities_json)
        .bind(&embedding_bytes)
        .bind(record.sentiment)
        .execute(&mut *tx)
        .await?;

        // FTS5 has no upsert; delete then insert
        sqlx::query("DELETE FROM records_fts WHERE id = ?")
            .bind(&record.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO records_fts (id, title, content, author, collection, entities) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(record.title.as_deref().unwrap_or(""))
        .bind(&record.content)
        .bind(&record.author)
        .bind(&record.collection)
        .bind(record.entity_names())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(record_id = %record.id, collection = %record.collection, "Record saved");
        Ok(())
    }

    /// Fetch one record, erroring if it does not exist
    pub async fn get(&self, id: &str) -> Result<ContentRecord> {
        let row: Option<RecordRow> = sqlx::query_as("SELECT * FROM records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => r.into_record(),
            None => Err(Error::RecordNotFound(id.to_string())),
        }
    }

    /// Fetch one record if present
    pub async fn try_get(&self, id: &str) -> Result<Option<ContentRecord>> {
        let row: Option<RecordRow> = sqlx::query_as("SELECT * FROM records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_record()).transpose()
    }

    /// List all records, newest first
    pub async fn list(&self) -> Result<Vec<ContentRecord>> {
        let rows: Vec<RecordRow> =
            sqlx::query_as("SELECT * FROM records ORDER BY created_at DESC, id")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(|r| r.into_record()).collect()
    }

    /// Delete a record and its keyword-index entry. No-op if absent.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM records_fts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM co_occurrences WHERE record_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(record_id = %id, "Record deleted");
        }
        Ok(deleted)
    }

    /// Ids of every record in a collection
    pub async fn collection_ids(&self, collection: &str) -> Result<Vec<String>> {
        let ids: Vec<(String,)> = sqlx::query_as("SELECT id FROM records WHERE collection = ?")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    /// Delete every record in a collection, returning their ids
    pub async fn delete_collection(&self, collection: &str) -> Result<Vec<String>> {
        let ids = self.collection_ids(collection).await?;

        if ids.is_empty() {
            return Ok(ids);
        }

        let mut tx = self.pool.begin().await?;
        for id in &ids {
            sqlx::query("DELETE FROM records WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM records_fts WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM co_occurrences WHERE record_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(collection = %collection, count = ids.len(), "Collection purged");
        Ok(ids)
    }

    /// Keyword search via FTS5, best matches first
    ///
    /// A blank query returns no results, and an FTS syntax error (query text
    /// that happens to look like a match operator) is treated as no matches
    /// rather than surfaced.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        self.search_scoped(query, None, limit).await
    }

    /// Keyword search restricted to one collection
    pub async fn search_in_collection(
        &self,
        query: &str,
        collection: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        self.search_scoped(query, Some(collection), limit).await
    }

    async fn search_scoped(
        &self,
        query: &str,
        collection: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        // Quote the user text so FTS operators in it are matched literally
        let fts_query = format!("\"{}\"", query.replace('"', "\"\""));

        let rows: std::result::Result<Vec<(String,)>, sqlx::Error> = match collection {
            Some(collection) => {
                sqlx::query_as(
                    r#"
                    SELECT f.id FROM records_fts f
                    JOIN records r ON r.id = f.id
                    WHERE records_fts MATCH ? AND r.collection = ?
                    ORDER BY rank LIMIT ?
                    "#,
                )
                .bind(&fts_query)
                .bind(collection)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(
                    "SELECT id FROM records_fts WHERE records_fts MATCH ? ORDER BY rank LIMIT ?",
                )
                .bind(&fts_query)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
        };

        match rows {
            Ok(rows) => Ok(rows.into_iter().map(|(id,)| id).collect()),
            Err(e) => {
                debug!(query = %query, error = %e, "Keyword search returned no matches");
                Ok(Vec::new())
            }
        }
    }

    /// Total number of stored records
    pub async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Replace the co-occurrence pairs originating from one record
    ///
    /// Drops every prior row for the record before inserting the new pairs,
    /// so a re-ingested record never leaves stale pairs behind. Pairs are
    /// expected in canonical (lexicographic) order.
    pub async fn replace_co_occurrences(
        &self,
        record_id: &str,
        pairs: &[(String, String, f32)],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM co_occurrences WHERE record_id = ?")
            .bind(record_id)
            .execute(&mut *tx)
            .await?;
        for (entity_a, entity_b, confidence) in pairs {
            sqlx::query(
                r#"
                INSERT INTO co_occurrences (entity_a, entity_b, confidence, record_id)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(entity_a, entity_b, record_id) DO UPDATE SET
                    confidence = excluded.confidence
                "#,
            )
            .bind(entity_a)
            .bind(entity_b)
            .bind(confidence)
            .bind(record_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Thread-level summaries for chat records, newest first
    pub async fn list_conversations(&self, collection: &str) -> Result<Vec<ConversationSummary>> {
        let rows: Vec<(String, Option<String>, i64, String, String)> = sqlx::query_as(
            r#"
            SELECT thread_id, MIN(title), COUNT(*), MIN(created_at), MAX(created_at)
            FROM records
            WHERE collection = ? AND thread_id IS NOT NULL
            GROUP BY thread_id
            ORDER BY MAX(created_at) DESC
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(thread_id, title, count, created, updated)| {
                Ok(ConversationSummary {
                    thread_id,
                    title: title.unwrap_or_default(),
                    turn_count: count as u64,
                    created_at: parse_timestamp(&created)?,
                    updated_at: parse_timestamp(&updated)?,
                })
            })
            .collect()
    }

    /// All stored embeddings as (id, vector) pairs, for rebuilding the
    /// in-memory index at open
    pub async fn load_embeddings(&self) -> Result<Vec<(String, Vec<f32>)>> {
        let rows: Vec<(String, Option<Vec<u8>>)> =
            sqlx::query_as("SELECT id, embedding FROM records")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, blob)| {
                let blob = blob?;
                if blob.is_empty() {
                    return None;
                }
                Some((id, decode_embedding(&blob)))
            })
            .collect())
    }
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("Invalid timestamp '{}': {}", s, e)))
}

/// Database row for a content record
#[derive(Debug, FromRow)]
struct RecordRow {
    id: String,
    kind: String,
    author: String,
    title: Option<String>,
    content: String,
    collection: String,
    created_at: String,
    score: i64,
    parent_id: Option<String>,
    thread_id: Option<String>,
    url: String,
    comment_count: i64,
    entities: String,
    embedding: Option<Vec<u8>>,
    sentiment: f32,
}

impl RecordRow {
    fn into_record(self) -> Result<ContentRecord> {
        let kind = RecordKind::parse(&self.kind)
            .ok_or_else(|| Error::Other(format!("Invalid record kind: {}", self.kind)))?;
        let entities: Vec<ExtractedEntity> = serde_json::from_str(&self.entities)
            .map_err(|e| Error::Other(format!("Failed to parse entities: {}", e)))?;
        let embedding = self
            .embedding
            .map(|blob| decode_embedding(&blob))
            .unwrap_or_default();

        Ok(ContentRecord {
            id: self.id,
            kind,
            author: self.author,
            title: self.title,
            content: self.content,
            collection: self.collection,
            created_at: parse_timestamp(&self.created_at)?,
            score: self.score,
            parent_id: self.parent_id,
            thread_id: self.thread_id,
            url: self.url,
            comment_count: self.comment_count,
            entities,
            embedding,
            sentiment: self.sentiment,
        })
    }
}

//! Ingestion pipeline
//!
//! Turns raw record batches into annotated store rows, keyword-index
//! entries, embedding vectors, and graph structure. The external inference
//! calls run concurrently per record and every one of them has a local
//! fallback, so a dead inference service degrades the annotations without
//! failing the batch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::KnowledgeGraph;
use crate::index::EmbeddingIndex;
use crate::inference::{fallback, InferenceProvider};
use crate::record::{normalize_entity_name, ContentRecord, ExtractedEntity, RecordKind};
use crate::store::RecordStore;

/// One record in an ingestion batch
#[derive(Debug, Clone, Deserialize)]
pub struct RecordInput {
    pub id: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub collection: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub comment_count: i64,
}

fn default_kind() -> String {
    "post".to_string()
}

/// One chat session in a chat-history batch
#[derive(Debug, Clone, Deserialize)]
pub struct ChatSession {
    pub session_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// One turn of a chat session
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// Outcome of an ingestion batch
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub processed: usize,
    pub failed: usize,
}

/// Record batch processor
pub struct IngestionPipeline {
    store: RecordStore,
    index: Arc<RwLock<EmbeddingIndex>>,
    graph: Arc<RwLock<KnowledgeGraph>>,
    provider: Arc<dyn InferenceProvider>,
    config: Config,
}

impl IngestionPipeline {
    pub fn new(
        store: RecordStore,
        index: Arc<RwLock<EmbeddingIndex>>,
        graph: Arc<RwLock<KnowledgeGraph>>,
        provider: Arc<dyn InferenceProvider>,
        config: Config,
    ) -> Self {
        Self {
            store,
            index,
            graph,
            provider,
            config,
        }
    }

    /// Ingest a batch of records, skipping (and counting) failures
    pub async fn ingest_records(&self, inputs: Vec<RecordInput>) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for input in inputs {
            let id = input.id.clone();
            match self.ingest_one(input).await {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    warn!(record_id = %id, error = %e, "Failed to ingest record, skipping");
                    report.failed += 1;
                }
            }
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            "Ingestion batch complete"
        );
        Ok(report)
    }

    /// Replace the chat partition with the given sessions
    ///
    /// All previously ingested chat records are purged first (store rows,
    /// keyword index, embeddings, graph nodes, and the co-occurrence edges
    /// those records produced), then every non-empty turn is ingested as
    /// one record.
    pub async fn ingest_chat_sessions(&self, sessions: Vec<ChatSession>) -> Result<IngestReport> {
        let chat_collection = self.config.ingest.chat_collection.clone();

        let purged = self.store.delete_collection(&chat_collection).await?;
        {
            let mut index = self.index.write().await;
            let mut graph = self.graph.write().await;
            for id in &purged {
                index.remove(id);
                graph.remove_record(id);
            }
        }

        let mut inputs = Vec::new();
        for session in sessions {
            for (i, message) in session.messages.iter().enumerate() {
                if message.content.trim().is_empty() {
                    continue;
                }
                let role = capitalize(&message.role);
                inputs.push(RecordInput {
                    id: format!("chat_{}_{}", session.session_id, i),
                    kind: RecordKind::ChatTurn.as_str().to_string(),
                    author: message.role.clone(),
                    title: Some(format!("Chat: {} - {}", session.title, role)),
                    content: format!("{}: {}", role, message.content),
                    collection: chat_collection.clone(),
                    created_at: None,
                    score: 0,
                    parent_id: None,
                    thread_id: Some(session.session_id.clone()),
                    url: String::new(),
                    comment_count: 0,
                });
            }
        }

        self.ingest_records(inputs).await
    }

    async fn ingest_one(&self, input: RecordInput) -> Result<()> {
        let kind = RecordKind::parse(&input.kind)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown record kind: {}", input.kind)))?;

        let mut record = ContentRecord {
            id: input.id,
            kind,
            author: input.author,
            title: input.title,
            content: input.content,
            collection: input.collection,
            created_at: input.created_at.unwrap_or_else(Utc::now),
            score: input.score,
            parent_id: input.parent_id,
            thread_id: input.thread_id,
            url: input.url,
            comment_count: input.comment_count,
            entities: Vec::new(),
            embedding: Vec::new(),
            sentiment: 0.0,
        };
        record.validate()?;

        let text = record.full_text();
        let (entities, embedding, sentiment) = self.annotate(&record.id, &text).await;
        record.entities = entities;
        record.embedding = embedding;
        record.sentiment = sentiment;

        self.store.upsert(&record).await?;

        {
            let mut index = self.index.write().await;
            index.put(record.id.clone(), record.embedding.clone());
        }

        let pairs = co_occurrence_pairs(&record.entities);
        {
            let mut graph = self.graph.write().await;
            graph.upsert_record_node(&record, &record.entities);
            for (a, b, confidence) in &pairs {
                graph.add_co_occurrence(a, b, *confidence, &record.id);
            }
        }
        // Delete-then-insert so a re-ingested record never leaves stale pairs
        self.store.replace_co_occurrences(&record.id, &pairs).await?;

        debug!(record_id = %record.id, entities = record.entities.len(), "Record ingested");
        Ok(())
    }

    /// Run the three inference calls concurrently, substituting fallbacks
    /// for any that fail or time out
    async fn annotate(&self, record_id: &str, text: &str) -> (Vec<ExtractedEntity>, Vec<f32>, f32) {
        let timeout = Duration::from_secs(self.config.inference.timeout_secs);

        let (entities, embedding, sentiment) = tokio::join!(
            tokio::time::timeout(timeout, self.provider.extract_entities(text)),
            tokio::time::timeout(timeout, self.provider.embed(text)),
            tokio::time::timeout(timeout, self.provider.sentiment(text)),
        );

        let entities = match entities {
            Ok(Ok(entities)) => normalize_entities(entities),
            Ok(Err(e)) => {
                warn!(record_id = %record_id, error = %e, "Entity extraction failed, using rules");
                fallback::extract_entities(text)
            }
            Err(_) => {
                warn!(record_id = %record_id, "Entity extraction timed out, using rules");
                fallback::extract_entities(text)
            }
        };

        let embedding = match embedding {
            Ok(Ok(vector)) => vector,
            Ok(Err(e)) => {
                warn!(record_id = %record_id, error = %e, "Embedding failed, storing zero vector");
                vec![0.0; self.config.inference.embedding_dimensions]
            }
            Err(_) => {
                warn!(record_id = %record_id, "Embedding timed out, storing zero vector");
                vec![0.0; self.config.inference.embedding_dimensions]
            }
        };

        let sentiment = match sentiment {
            Ok(Ok(score)) => score.clamp(-1.0, 1.0),
            Ok(Err(e)) => {
                warn!(record_id = %record_id, error = %e, "Sentiment failed, assuming neutral");
                0.0
            }
            Err(_) => {
                warn!(record_id = %record_id, "Sentiment timed out, assuming neutral");
                0.0
            }
        };

        (entities, embedding, sentiment)
    }
}

/// Unordered entity pairs in canonical (lexicographic) order, each at the
/// weaker of the two confidences
fn co_occurrence_pairs(entities: &[ExtractedEntity]) -> Vec<(String, String, f32)> {
    let mut pairs = Vec::new();
    for (i, a) in entities.iter().enumerate() {
        for b in entities.iter().skip(i + 1) {
            if a.name == b.name {
                continue;
            }
            let (first, second) = if a.name <= b.name {
                (&a.name, &b.name)
            } else {
                (&b.name, &a.name)
            };
            pairs.push((first.clone(), second.clone(), a.confidence.min(b.confidence)));
        }
    }
    pairs
}

fn normalize_entities(entities: Vec<ExtractedEntity>) -> Vec<ExtractedEntity> {
    let mut seen: Vec<String> = Vec::new();
    entities
        .into_iter()
        .filter_map(|e| {
            let name = normalize_entity_name(&e.name);
            if name.is_empty() {
                return None;
            }
            let key = name.to_lowercase();
            if seen.contains(&key) {
                return None;
            }
            seen.push(key);
            Some(ExtractedEntity::new(name, e.kind, e.confidence))
        })
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EntityKind;
    use crate::storage::Database;
    use async_trait::async_trait;

    /// Provider with canned answers, or failures when `healthy` is false
    struct StaticProvider {
        healthy: bool,
        entities: Vec<ExtractedEntity>,
        embedding: Vec<f32>,
        sentiment: f32,
    }

    impl StaticProvider {
        fn down() -> Self {
            Self {
                healthy: false,
                entities: Vec::new(),
                embedding: Vec::new(),
                sentiment: 0.0,
            }
        }

        fn with(entities: Vec<ExtractedEntity>, embedding: Vec<f32>, sentiment: f32) -> Self {
            Self {
                healthy: true,
                entities,
                embedding,
                sentiment,
            }
        }
    }

    #[async_trait]
    impl InferenceProvider for StaticProvider {
        async fn extract_entities(&self, _text: &str) -> Result<Vec<ExtractedEntity>> {
            if self.healthy {
                Ok(self.entities.clone())
            } else {
                Err(Error::Inference("down".into()))
            }
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            if self.healthy {
                Ok(self.embedding.clone())
            } else {
                Err(Error::Inference("down".into()))
            }
        }

        async fn sentiment(&self, _text: &str) -> Result<f32> {
            if self.healthy {
                Ok(self.sentiment)
            } else {
                Err(Error::Inference("down".into()))
            }
        }

        async fn health_check(&self) -> Result<()> {
            if self.healthy {
                Ok(())
            } else {
                Err(Error::Inference("down".into()))
            }
        }
    }

    async fn pipeline(provider: StaticProvider) -> IngestionPipeline {
        let db = Database::in_memory().await.expect("in-memory db");
        let mut config = Config::default();
        config.inference.embedding_dimensions = 4;
        IngestionPipeline::new(
            RecordStore::new(db.pool().clone()),
            Arc::new(RwLock::new(EmbeddingIndex::new())),
            Arc::new(RwLock::new(KnowledgeGraph::new())),
            Arc::new(provider),
            config,
        )
    }

    fn input(id: &str, content: &str) -> RecordInput {
        RecordInput {
            id: id.to_string(),
            kind: "post".into(),
            author: "alice".into(),
            title: None,
            content: content.to_string(),
            collection: "Austin".into(),
            created_at: None,
            score: 0,
            parent_id: None,
            thread_id: None,
            url: String::new(),
            comment_count: 0,
        }
    }

    #[tokio::test]
    async fn test_ingest_with_healthy_provider() {
        let provider = StaticProvider::with(
            vec![
                ExtractedEntity::new("Franklin Barbecue", EntityKind::Organization, 0.9),
                ExtractedEntity::new("Austin", EntityKind::Place, 0.7),
            ],
            vec![0.1, 0.2, 0.3, 0.4],
            0.8,
        );
        let pipeline = pipeline(provider).await;

        let report = pipeline
            .ingest_records(vec![input("p1", "Franklin Barbecue in Austin")])
            .await
            .unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 0);

        let record = pipeline.store.get("p1").await.unwrap();
        assert_eq!(record.entities.len(), 2);
        assert_eq!(record.embedding, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(record.sentiment, 0.8);

        let graph = pipeline.graph.read().await;
        assert!(graph.node("p1").is_some());
        // Co-occurrence at the weaker of the two confidences
        let edge = graph
            .edges()
            .find(|e| e.kind == crate::graph::EdgeKind::CoOccursWith)
            .expect("co-occurrence edge");
        assert_eq!(edge.confidence, 0.7);
    }

    #[tokio::test]
    async fn test_ingest_degrades_when_provider_down() {
        let pipeline = pipeline(StaticProvider::down()).await;

        let report = pipeline
            .ingest_records(vec![input("p1", "great brisket at BBQ spot #austin")])
            .await
            .unwrap();
        assert_eq!(report.processed, 1);

        let record = pipeline.store.get("p1").await.unwrap();
        // Rule-based entities, zero vector, neutral sentiment
        assert!(record.entities.iter().any(|e| e.name == "austin"));
        assert_eq!(record.embedding, vec![0.0; 4]);
        assert_eq!(record.sentiment, 0.0);

        let index = pipeline.index.read().await;
        assert!(index.get("p1").is_some());
    }

    #[tokio::test]
    async fn test_bad_record_skipped_batch_continues() {
        let pipeline = pipeline(StaticProvider::down()).await;

        let report = pipeline
            .ingest_records(vec![input("", "no id"), input("p2", "fine")])
            .await
            .unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);
        assert!(pipeline.store.get("p2").await.is_ok());
    }

    #[tokio::test]
    async fn test_reingest_replaces_co_occurrence_rows() {
        let db = Database::in_memory().await.expect("in-memory db");
        let store = RecordStore::new(db.pool().clone());
        let index = Arc::new(RwLock::new(EmbeddingIndex::new()));
        let graph = Arc::new(RwLock::new(KnowledgeGraph::new()));
        let mut config = Config::default();
        config.inference.embedding_dimensions = 4;

        let first = IngestionPipeline::new(
            store.clone(),
            index.clone(),
            graph.clone(),
            Arc::new(StaticProvider::with(
                vec![
                    ExtractedEntity::new("Alpha", EntityKind::Concept, 0.9),
                    ExtractedEntity::new("Beta", EntityKind::Concept, 0.8),
                ],
                vec![0.0; 4],
                0.0,
            )),
            config.clone(),
        );
        first
            .ingest_records(vec![input("p1", "alpha and beta")])
            .await
            .unwrap();

        let second = IngestionPipeline::new(
            store.clone(),
            index.clone(),
            graph.clone(),
            Arc::new(StaticProvider::with(
                vec![
                    ExtractedEntity::new("Gamma", EntityKind::Concept, 0.7),
                    ExtractedEntity::new("Delta", EntityKind::Concept, 0.6),
                ],
                vec![0.0; 4],
                0.0,
            )),
            config,
        );
        second
            .ingest_records(vec![input("p1", "gamma and delta")])
            .await
            .unwrap();

        // Persisted pairs match the graph: only the latest entity set remains
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT entity_a, entity_b FROM co_occurrences WHERE record_id = 'p1'",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();
        assert_eq!(rows, vec![("Delta".to_string(), "Gamma".to_string())]);

        let graph = graph.read().await;
        let pairs: Vec<_> = graph
            .edges()
            .filter(|e| e.kind == crate::graph::EdgeKind::CoOccursWith)
            .collect();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].source, "Delta");
        assert_eq!(pairs[0].target, "Gamma");
    }

    #[tokio::test]
    async fn test_chat_ingest_replaces_partition() {
        let pipeline = pipeline(StaticProvider::down()).await;

        let session = |id: &str, text: &str| ChatSession {
            session_id: id.to_string(),
            title: "Trip planning".into(),
            messages: vec![
                ChatMessage {
                    role: "user".into(),
                    content: text.to_string(),
                },
                ChatMessage {
                    role: "assistant".into(),
                    content: String::new(), // empty turns are skipped
                },
            ],
        };

        let report = pipeline
            .ingest_chat_sessions(vec![session("s1", "where should we eat?")])
            .await
            .unwrap();
        assert_eq!(report.processed, 1);

        let record = pipeline.store.get("chat_s1_0").await.unwrap();
        assert_eq!(record.kind, RecordKind::ChatTurn);
        assert_eq!(record.content, "User: where should we eat?");
        assert_eq!(record.title.as_deref(), Some("Chat: Trip planning - User"));
        assert_eq!(record.thread_id.as_deref(), Some("s1"));

        // Second batch replaces the first wholesale
        pipeline
            .ingest_chat_sessions(vec![session("s2", "new question")])
            .await
            .unwrap();
        assert!(pipeline.store.try_get("chat_s1_0").await.unwrap().is_none());
        assert!(pipeline.store.get("chat_s2_0").await.is_ok());

        let graph = pipeline.graph.read().await;
        assert!(graph.node("chat_s1_0").is_none());
        let index = pipeline.index.read().await;
        assert!(index.get("chat_s1_0").is_none());
    }

    #[tokio::test]
    async fn test_normalize_entities_dedupes_case_insensitively() {
        let entities = normalize_entities(vec![
            ExtractedEntity::new("  Franklin   Barbecue ", EntityKind::Organization, 0.9),
            ExtractedEntity::new("franklin barbecue", EntityKind::Organization, 0.5),
            ExtractedEntity::new("   ", EntityKind::Concept, 0.5),
        ]);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "Franklin Barbecue");
    }
}

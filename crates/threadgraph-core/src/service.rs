//! Top-level service facade
//!
//! [`ThreadGraph`] owns the database, the in-memory embedding index, the
//! knowledge graph, and the inference provider, and exposes the operations
//! the CLI calls. Opening a service loads the graph snapshot (when one
//! exists) and rebuilds the embedding index from the stored records.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::{snapshot, GraphStats, KnowledgeGraph};
use crate::index::EmbeddingIndex;
use crate::inference::{InferenceProvider, OllamaClient};
use crate::ingest::{ChatSession, IngestReport, IngestionPipeline, RecordInput};
use crate::retrieval::{RetrievalEngine, RetrievedRecord};
use crate::storage::{Database, DatabaseConfig};
use crate::store::{ConversationSummary, RecordStore};

/// Combined store/graph/index statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServiceStats {
    pub record_count: u64,
    pub indexed_embeddings: u64,
    pub graph: GraphStats,
}

/// The assembled retrieval service
pub struct ThreadGraph {
    store: RecordStore,
    index: Arc<RwLock<EmbeddingIndex>>,
    graph: Arc<RwLock<KnowledgeGraph>>,
    provider: Arc<dyn InferenceProvider>,
    config: Config,
    snapshot_path: PathBuf,
    database: Database,
}

impl ThreadGraph {
    /// Open the service at the default data directory
    pub async fn open(config: Config) -> Result<Self> {
        let db_path = Config::database_path().map_err(|e| Error::Other(e.to_string()))?;
        let snapshot_path =
            Config::graph_snapshot_path().map_err(|e| Error::Other(e.to_string()))?;
        let provider = Arc::new(OllamaClient::new(config.inference.clone())?);
        Self::open_at(config, DatabaseConfig::with_path(db_path), snapshot_path, provider).await
    }

    /// Open the service against explicit storage locations and provider
    pub async fn open_at(
        config: Config,
        db_config: DatabaseConfig,
        snapshot_path: PathBuf,
        provider: Arc<dyn InferenceProvider>,
    ) -> Result<Self> {
        let database = Database::new(db_config).await?;
        let store = RecordStore::new(database.pool().clone());

        let graph = if snapshot_path.exists() {
            snapshot::load(&snapshot_path)?
        } else {
            KnowledgeGraph::new()
        };

        let mut index = EmbeddingIndex::new();
        for (id, vector) in store.load_embeddings().await? {
            index.put(id, vector);
        }
        let record_count = store.count().await?;
        info!(
            records = record_count,
            embeddings = index.len(),
            graph_nodes = graph.node_count(),
            "Service opened"
        );

        Ok(Self {
            store,
            index: Arc::new(RwLock::new(index)),
            graph: Arc::new(RwLock::new(graph)),
            provider,
            config,
            snapshot_path,
            database,
        })
    }

    /// Whether anything has ever been ingested
    pub async fn has_graph(&self) -> Result<bool> {
        Ok(self.snapshot_path.exists() || self.store.count().await? > 0)
    }

    /// Probe the inference service
    pub async fn inference_available(&self) -> bool {
        self.provider.health_check().await.is_ok()
    }

    fn pipeline(&self) -> IngestionPipeline {
        IngestionPipeline::new(
            self.store.clone(),
            self.index.clone(),
            self.graph.clone(),
            self.provider.clone(),
            self.config.clone(),
        )
    }

    fn engine(&self) -> RetrievalEngine {
        RetrievalEngine::new(
            self.store.clone(),
            self.index.clone(),
            self.graph.clone(),
            self.provider.clone(),
            self.config.clone(),
        )
    }

    /// Ingest a record batch and persist the updated graph
    pub async fn ingest_records(&self, inputs: Vec<RecordInput>) -> Result<IngestReport> {
        let report = self.pipeline().ingest_records(inputs).await?;
        self.save_graph().await?;
        Ok(report)
    }

    /// Replace the chat partition with these sessions and persist the graph
    pub async fn ingest_chat_sessions(&self, sessions: Vec<ChatSession>) -> Result<IngestReport> {
        let report = self.pipeline().ingest_chat_sessions(sessions).await?;
        self.save_graph().await?;
        Ok(report)
    }

    /// Hybrid retrieval over everything ingested
    pub async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<RetrievedRecord>> {
        self.engine().retrieve(query, limit).await
    }

    /// Cross-conversation chat search
    pub async fn search_conversations(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedRecord>> {
        self.engine().search_conversations(query, limit).await
    }

    /// Chat conversation summaries, newest first
    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>> {
        self.store
            .list_conversations(&self.config.ingest.chat_collection)
            .await
    }

    /// Delete one record everywhere it appears
    pub async fn delete_record(&self, id: &str) -> Result<bool> {
        let deleted = self.store.delete(id).await?;
        if deleted {
            self.index.write().await.remove(id);
            self.graph.write().await.remove_record(id);
            self.save_graph().await?;
        }
        Ok(deleted)
    }

    /// Store, index, and graph counts
    pub async fn stats(&self) -> Result<ServiceStats> {
        Ok(ServiceStats {
            record_count: self.store.count().await?,
            indexed_embeddings: self.index.read().await.len() as u64,
            graph: self.graph.read().await.stats(),
        })
    }

    /// Write the graph snapshot to disk
    pub async fn save_graph(&self) -> Result<()> {
        let graph = self.graph.read().await;
        snapshot::save(&graph, &self.snapshot_path)
    }

    /// Close the underlying database pool
    pub async fn close(&self) {
        self.database.close().await;
    }
}

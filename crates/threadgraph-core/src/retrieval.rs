//! Retrieval engine
//!
//! Fuses three candidate sources into one ranked result list:
//! vector similarity over the embedding index, keyword matches from the
//! FTS index, and graph-neighborhood expansion from the best hits so far.
//! Candidates merge in that order, first occurrence of an id wins, and the
//! final list is stable-sorted by relevance.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;
use crate::graph::KnowledgeGraph;
use crate::index::EmbeddingIndex;
use crate::inference::InferenceProvider;
use crate::record::ExtractedEntity;
use crate::store::RecordStore;

/// Fixed relevance for keyword and graph candidates, which carry no
/// similarity score of their own
const STRUCTURAL_RELEVANCE: f32 = 0.8;

/// How many top fused hits seed graph expansion
const GRAPH_SEED_COUNT: usize = 2;

/// One ranked retrieval result
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedRecord {
    pub id: String,
    pub title: Option<String>,
    pub author: String,
    pub collection: String,
    pub score: i64,
    pub content: String,
    pub entities: Vec<ExtractedEntity>,
    pub sentiment: f32,
    pub relevance_score: f32,
    pub retrieval_method: String,
}

#[derive(Debug, Clone)]
struct Candidate {
    id: String,
    relevance: f32,
    method: &'static str,
}

/// Hybrid semantic/keyword/graph retrieval
pub struct RetrievalEngine {
    store: RecordStore,
    index: Arc<RwLock<EmbeddingIndex>>,
    graph: Arc<RwLock<KnowledgeGraph>>,
    provider: Arc<dyn InferenceProvider>,
    config: Config,
}

impl RetrievalEngine {
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

    /// Retrieve the most relevant records for a query
    pub async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<RetrievedRecord>> {
        self.retrieve_with_cutoff(query, limit, None, None).await
    }

    /// Search chat history across all conversations
    ///
    /// Same fusion as [`retrieve`](Self::retrieve), with every candidate
    /// pass restricted to the chat partition and the low-relevance floor
    /// applied. Restricting the passes themselves means chat matches cannot
    /// be crowded out by a large forum corpus.
    pub async fn search_conversations(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedRecord>> {
        let cutoff = Some(self.config.retrieval.chat_score_cutoff);
        let chat_collection = self.config.ingest.chat_collection.as_str();
        self.retrieve_with_cutoff(query, limit, cutoff, Some(chat_collection))
            .await
    }

    async fn retrieve_with_cutoff(
        &self,
        query: &str,
        limit: usize,
        score_cutoff: Option<f32>,
        collection: Option<&str>,
    ) -> Result<Vec<RetrievedRecord>> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        // When scoped to one collection, every pass draws from its ids only
        let allowed: Option<HashSet<String>> = match collection {
            Some(c) => Some(self.store.collection_ids(c).await?.into_iter().collect()),
            None => None,
        };
        let in_scope = |id: &str| allowed.as_ref().map_or(true, |ids| ids.contains(id));

        let mut candidates: Vec<Candidate> = Vec::new();

        // Pass 1: vector similarity. A failed or timed-out query embedding
        // degrades to keyword+graph rather than aborting.
        match self.embed_query(query).await {
            Some(query_vec) => {
                let index = self.index.read().await;
                let pool_size = limit.saturating_mul(2).min(index.len());
                let hits = index.top_k_filtered(&query_vec, pool_size, &in_scope);
                for hit in hits.into_iter().take(limit) {
                    candidates.push(Candidate {
                        id: hit.id,
                        relevance: hit.score,
                        method: "semantic",
                    });
                }
            }
            None => {
                warn!(query = %query, "Query embedding unavailable, keyword+graph only");
            }
        }

        // Pass 2: keyword matches at a fixed relevance
        let keyword_hits = match collection {
            Some(c) => self.store.search_in_collection(query, c, limit / 2).await?,
            None => self.store.search(query, limit / 2).await?,
        };
        for id in keyword_hits {
            candidates.push(Candidate {
                id,
                relevance: STRUCTURAL_RELEVANCE,
                method: "keyword",
            });
        }

        // Pass 3: graph neighborhood of the best hits so far
        let seeds: Vec<String> = candidates
            .iter()
            .take(GRAPH_SEED_COUNT)
            .map(|c| c.id.clone())
            .collect();
        {
            let graph = self.graph.read().await;
            let depth = self.config.retrieval.graph_depth;
            for seed in seeds {
                for id in graph.connected_records(&seed, depth) {
                    if !in_scope(&id) {
                        continue;
                    }
                    candidates.push(Candidate {
                        id,
                        relevance: STRUCTURAL_RELEVANCE,
                        method: "graph",
                    });
                }
            }
        }

        // Fusion: dedup by id keeping the first occurrence, drop anything
        // at or below the cutoff, stop at the limit
        let mut seen: Vec<&str> = Vec::new();
        let mut fused: Vec<&Candidate> = Vec::new();
        for candidate in &candidates {
            if fused.len() >= limit {
                break;
            }
            if seen.contains(&candidate.id.as_str()) {
                continue;
            }
            seen.push(&candidate.id);
            if let Some(cutoff) = score_cutoff {
                if candidate.relevance <= cutoff {
                    continue;
                }
            }
            fused.push(candidate);
        }

        // Stable sort keeps fusion order among equal scores
        let mut fused: Vec<Candidate> = fused.into_iter().cloned().collect();
        fused.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut results = Vec::with_capacity(fused.len());
        for candidate in fused {
            let Some(record) = self.store.try_get(&candidate.id).await? else {
                debug!(record_id = %candidate.id, "Candidate no longer in store, dropping");
                continue;
            };
            results.push(RetrievedRecord {
                id: record.id,
                title: record.title,
                author: record.author,
                collection: record.collection,
                score: record.score,
                content: record.content,
                entities: record.entities,
                sentiment: record.sentiment,
                relevance_score: candidate.relevance,
                retrieval_method: candidate.method.to_string(),
            });
        }

        debug!(query = %query, results = results.len(), "Retrieval complete");
        Ok(results)
    }

    async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        let timeout = Duration::from_secs(self.config.inference.timeout_secs);
        match tokio::time::timeout(timeout, self.provider.embed(query)).await {
            Ok(Ok(vector)) => Some(vector),
            Ok(Err(e)) => {
                debug!(error = %e, "Query embedding failed");
                None
            }
            Err(_) => {
                debug!("Query embedding timed out");
                None
            }
        }
    }
}

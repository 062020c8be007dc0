//! In-memory embedding index
//!
//! Holds one vector per record id and answers top-k cosine-similarity
//! queries. Vectors are persisted on the record rows as BLOBs, so the index
//! is rebuilt from the store on open.

use std::collections::BTreeMap;

/// Compute cosine similarity between two vectors
///
/// Returns 0.0 for mismatched lengths, empty vectors, or zero magnitude,
/// never NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

/// A scored match from the embedding index
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    pub id: String,
    pub score: f32,
}

/// Map of record id to embedding vector
///
/// BTreeMap keeps iteration order deterministic, which makes score ties
/// resolve the same way on every run.
#[derive(Debug, Default, Clone)]
pub struct EmbeddingIndex {
    vectors: BTreeMap<String, Vec<f32>>,
}

impl EmbeddingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the vector for a record
    pub fn put(&mut self, id: impl Into<String>, vector: Vec<f32>) {
        self.vectors.insert(id.into(), vector);
    }

    pub fn get(&self, id: &str) -> Option<&Vec<f32>> {
        self.vectors.get(id)
    }

    pub fn remove(&mut self, id: &str) {
        self.vectors.remove(id);
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Top-k ids by cosine similarity to the query, highest first
    ///
    /// Ties break by id ascending so results are stable across runs.
    pub fn top_k(&self, query: &[f32], k: usize) -> Vec<ScoredId> {
        self.top_k_filtered(query, k, |_| true)
    }

    /// Top-k among the ids accepted by the filter
    pub fn top_k_filtered(
        &self,
        query: &[f32],
        k: usize,
        mut keep: impl FnMut(&str) -> bool,
    ) -> Vec<ScoredId> {
        if k == 0 || query.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<ScoredId> = self
            .vectors
            .iter()
            .filter(|(id, _)| keep(id))
            .map(|(id, vector)| ScoredId {
                id: id.clone(),
                score: cosine_similarity(query, vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        scored
    }
}

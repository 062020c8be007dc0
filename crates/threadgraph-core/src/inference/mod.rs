//! External inference capability
//!
//! Entity extraction, embeddings, and sentiment come from an HTTP inference
//! service behind the [`InferenceProvider`] trait. Every caller is expected
//! to survive this service being down: the ingestion pipeline substitutes
//! the [`fallback`] extractor, a zero vector, and neutral sentiment.

pub mod client;
pub mod fallback;

use async_trait::async_trait;

use crate::error::Result;
use crate::record::ExtractedEntity;

pub use client::OllamaClient;

/// Seam for the external inference service
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Extract named entities from free text
    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>>;

    /// Embed text into a fixed-dimension vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Score sentiment in [-1, 1]
    async fn sentiment(&self, text: &str) -> Result<f32>;

    /// Cheap availability probe
    async fn health_check(&self) -> Result<()>;
}

/// Extract the JSON payload from a model response that may wrap it in
/// markdown fences or surrounding prose
pub(crate) fn extract_json_from_response(response: &str) -> String {
    // Try to find JSON in code blocks first
    if let Some(start) = response.find("```json") {
        let json_start = start + 7;
        if let Some(end) = response[json_start..].find("```") {
            return response[json_start..json_start + end].trim().to_string();
        }
    }

    // Try to find JSON in generic code blocks
    if let Some(start) = response.find("```") {
        let potential_start = start + 3;
        if let Some(newline) = response[potential_start..].find('\n') {
            let json_start = potential_start + newline + 1;
            if let Some(end) = response[json_start..].find("```") {
                return response[json_start..json_start + end].trim().to_string();
            }
        }
    }

    // Entity payloads are arrays; prefer a raw array over a raw object
    if let (Some(start), Some(end)) = (response.find('['), response.rfind(']')) {
        if start < end {
            return response[start..=end].to_string();
        }
    }

    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        if start < end {
            return response[start..=end].to_string();
        }
    }

    // Return as-is if no JSON found
    response.to_string()
}

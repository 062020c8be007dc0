//! Ollama-style HTTP inference client

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::InferenceConfig;
use crate::error::{Error, Result};
use crate::inference::{extract_json_from_response, InferenceProvider};
use crate::record::{EntityKind, ExtractedEntity};

/// Client for an Ollama-compatible inference service
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    config: InferenceConfig,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// One entity in the model's extraction payload
///
/// Every field the contract requires must be present and in range; a bad
/// element is skipped rather than failing the whole payload.
#[derive(Deserialize)]
struct RawEntity {
    entity: Option<String>,
    #[serde(rename = "type")]
    entity_type: Option<String>,
    confidence: Option<f32>,
}

impl OllamaClient {
    pub fn new(config: InferenceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
            },
        };

        let response: GenerateResponse = self
            .http
            .post(format!("{}/api/generate", self.config.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.response)
    }

    fn entity_prompt(text: &str) -> String {
        format!(
            r#"Extract named entities from the following text.

Return ONLY a JSON array, no other text. Each element must have:
- "entity": the entity name
- "type": one of "person", "place", "organization", "concept", "other"
- "confidence": a number between 0.0 and 1.0

Text:
{}"#,
            text
        )
    }

    fn sentiment_prompt(text: &str) -> String {
        format!(
            r#"Rate the sentiment of the following text as a single number
between -1.0 (very negative) and 1.0 (very positive).

Return ONLY the number, no other text.

Text:
{}"#,
            text
        )
    }

    fn parse_entities(response: &str) -> Result<Vec<ExtractedEntity>> {
        let json_str = extract_json_from_response(response);
        let raw: Vec<RawEntity> = serde_json::from_str(&json_str)
            .map_err(|e| Error::Inference(format!("Invalid entity payload: {}", e)))?;

        Ok(raw
            .into_iter()
            .filter_map(|r| {
                let name = r.entity?.trim().to_string();
                if name.is_empty() {
                    return None;
                }
                let confidence = r.confidence?;
                if !(0.0..=1.0).contains(&confidence) {
                    debug!(entity = %name, confidence, "Skipping out-of-range confidence");
                    return None;
                }
                let kind = r
                    .entity_type
                    .as_deref()
                    .and_then(EntityKind::parse)
                    .unwrap_or(EntityKind::Concept);
                Some(ExtractedEntity::new(name, kind, confidence))
            })
            .collect())
    }
}

#[async_trait]
impl InferenceProvider for OllamaClient {
    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>> {
        let response = self.generate(&Self::entity_prompt(text)).await?;
        let entities = Self::parse_entities(&response)?;
        debug!(count = entities.len(), "Entities extracted");
        Ok(entities)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            prompt: text,
        };

        let response: EmbeddingResponse = self
            .http
            .post(format!("{}/api/embeddings", self.config.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.embedding.len() != self.config.embedding_dimensions {
            warn!(
                got = response.embedding.len(),
                expected = self.config.embedding_dimensions,
                "Embedding has wrong dimensionality"
            );
            return Err(Error::Inference(format!(
                "Expected {}-dimensional embedding, got {}",
                self.config.embedding_dimensions,
                response.embedding.len()
            )));
        }

        Ok(response.embedding)
    }

    async fn sentiment(&self, text: &str) -> Result<f32> {
        let response = self.generate(&Self::sentiment_prompt(text)).await?;
        let score: f32 = response
            .trim()
            .parse()
            .map_err(|_| Error::Inference(format!("Invalid sentiment response: {}", response)))?;
        Ok(score.clamp(-1.0, 1.0))
    }

    async fn health_check(&self) -> Result<()> {
        self.http
            .get(format!("{}/api/tags", self.config.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entities_validates_fields() {
        let response = r#"[
            {"entity": "Franklin Barbecue", "type": "organization", "confidence": 0.9},
            {"entity": "", "type": "concept", "confidence": 0.5},
            {"entity": "bad range", "type": "concept", "confidence": 1.5},
            {"entity": "no confidence", "type": "concept"},
            {"entity": "weird type", "type": "widget", "confidence": 0.4}
        ]"#;

        let entities = OllamaClient::parse_entities(response).unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].name, "Franklin Barbecue");
        assert_eq!(entities[0].kind, EntityKind::Organization);
        // Unknown type falls back to concept; missing/out-of-range fields drop
        assert_eq!(entities[1].name, "weird type");
        assert_eq!(entities[1].kind, EntityKind::Concept);
    }

    #[test]
    fn test_parse_entities_accepts_fenced_payload() {
        let response = "Sure!\n```json\n[{\"entity\": \"Austin\", \"type\": \"place\", \"confidence\": 0.8}]\n```";
        let entities = OllamaClient::parse_entities(response).unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].kind, EntityKind::Place);
    }

    #[test]
    fn test_parse_entities_rejects_garbage() {
        assert!(OllamaClient::parse_entities("I could not find any entities.").is_err());
    }
}

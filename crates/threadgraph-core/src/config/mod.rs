//! Configuration management with file persistence

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Threadgraph configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub inference: InferenceConfig,
    pub retrieval: RetrievalConfig,
    pub ingest: IngestConfig,
}

/// Settings for the external inference service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Base URL of the inference HTTP service
    pub base_url: String,
    /// Model used for entity extraction and sentiment
    pub model: String,
    /// Model used for embeddings
    pub embedding_model: String,
    /// Dimensionality every stored embedding must share
    pub embedding_dimensions: usize,
    /// Per-call timeout
    pub timeout_secs: u64,
    pub temperature: f32,
}

/// Settings for query-time fusion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Minimum relevance for cross-conversation chat search results
    pub chat_score_cutoff: f32,
    /// BFS depth for graph-neighborhood expansion
    pub graph_depth: usize,
}

/// Settings for ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Collection tag that partitions chat-history records
    pub chat_collection: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inference: InferenceConfig {
                base_url: "http://localhost:11434".to_string(),
                model: "llama3.2".to_string(),
                embedding_model: "nomic-embed-text".to_string(),
                embedding_dimensions: 768,
                timeout_secs: 30,
                temperature: 0.1,
            },
            retrieval: RetrievalConfig {
                chat_score_cutoff: 0.1,
                graph_depth: 2,
            },
            ingest: IngestConfig {
                chat_collection: "chat_history".to_string(),
            },
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("THREADGRAPH_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("threadgraph")
        };
        Ok(dir)
    }

    /// Get the data directory path (database, graph snapshot)
    pub fn data_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("THREADGRAPH_DATA_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::data_dir()
                .ok_or_else(|| anyhow!("Could not determine data directory"))?
                .join("threadgraph")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Path of the persisted knowledge graph snapshot
    pub fn graph_snapshot_path() -> anyhow::Result<PathBuf> {
        Ok(Self::data_dir()?.join("knowledge_graph.json"))
    }

    /// Path of the SQLite database
    pub fn database_path() -> anyhow::Result<PathBuf> {
        Ok(Self::data_dir()?.join("threadgraph.db"))
    }

    /// Load configuration from file, or create default if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            // Return default config without creating file
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.inference.embedding_dimensions == 0 {
            return Err(anyhow!("embedding_dimensions must be positive"));
        }
        if self.inference.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be positive"));
        }
        if !(0.0..=1.0).contains(&self.retrieval.chat_score_cutoff) {
            return Err(anyhow!("chat_score_cutoff must be between 0.0 and 1.0"));
        }
        if self.ingest.chat_collection.trim().is_empty() {
            return Err(anyhow!("chat_collection must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.inference.embedding_dimensions, 768);
        assert_eq!(config.retrieval.chat_score_cutoff, 0.1);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.inference.embedding_dimensions = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retrieval.chat_score_cutoff = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ingest.chat_collection = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.inference.model, config.inference.model);
        assert_eq!(parsed.ingest.chat_collection, config.ingest.chat_collection);
    }
}

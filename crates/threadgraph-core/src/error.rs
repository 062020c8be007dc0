//! Error types for threadgraph

use thiserror::Error;

/// Result type alias using threadgraph's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Threadgraph error types with helpful messages and remediation hints
#[derive(Error, Debug)]
pub enum Error {
    // Input errors (E100-E199): surfaced to the caller, nothing mutated
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Lookup errors (E200-E299): structured, non-fatal
    #[error("Record '{0}' not found")]
    RecordNotFound(String),

    #[error("Knowledge graph not found. Ingest data before querying.")]
    GraphNotBuilt,

    // Inference errors (E300-E399): recovered locally via fallbacks
    #[error("Inference service error: {0}")]
    Inference(String),

    // Persistence errors (E400-E499)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    // Network errors (E500-E599)
    #[error("Network error: {0}. Check that the inference service is running.")]
    Network(#[from] reqwest::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "E100",
            Self::RecordNotFound(_) => "E200",
            Self::GraphNotBuilt => "E201",
            Self::Inference(_) => "E300",
            Self::Database(_) => "E400",
            Self::Snapshot(_) => "E401",
            Self::Network(_) => "E500",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Remediation guidance for errors worth surfacing to users
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::GraphNotBuilt => {
                Some("Run `threadgraph ingest < records.json` to build the knowledge graph first.")
            }
            Self::Network(_) => Some("Start the inference service (e.g. `ollama serve`)."),
            Self::RecordNotFound(_) => Some("Run `threadgraph stats` to inspect what is indexed."),
            _ => None,
        }
    }
}

//! Threadgraph Core Library
//!
//! This crate provides the core functionality for threadgraph, including:
//! - Document store (SQLite + FTS5 keyword index)
//! - In-memory embedding index with cosine top-k
//! - Knowledge graph (typed nodes/edges, BFS expansion, JSON snapshots)
//! - Inference integration (Ollama HTTP API with rule-based fallbacks)
//! - Ingestion pipeline and hybrid retrieval engine

pub mod config;
pub mod error;
pub mod graph;
pub mod index;
pub mod inference;
pub mod ingest;
pub mod record;
pub mod retrieval;
pub mod service;
pub mod storage;
pub mod store;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::ingest::{ChatSession, RecordInput};
    pub use crate::record::{ContentRecord, EntityKind, ExtractedEntity, RecordKind};
    pub use crate::retrieval::RetrievedRecord;
    pub use crate::service::ThreadGraph;
}

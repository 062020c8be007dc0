//! Content record types
//!
//! A [`ContentRecord`] is one unit of ingested text: a forum post, a comment,
//! or a single chat turn. Records are owned by the document store and carry
//! the annotations produced during ingestion (entities, embedding, sentiment).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One unit of ingested text with its metadata and annotations
///
/// The `id` is the sole identity: upserting a record with an existing id
/// fully replaces the stored row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Unique identifier (from the source system)
    pub id: String,
    /// What kind of record this is
    pub kind: RecordKind,
    /// Author (username, or chat role for chat turns)
    pub author: String,
    /// Optional title (submissions have one, comments usually do not)
    #[serde(default)]
    pub title: Option<String>,
    /// Body text
    pub content: String,
    /// Collection tag (subreddit, workspace, or chat partition label)
    pub collection: String,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// Numeric score from the source system
    #[serde(default)]
    pub score: i64,
    /// Parent record id, if this is a reply
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Thread/session id this record belongs to
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Source URL
    #[serde(default)]
    pub url: String,
    /// Number of comments on the source record
    #[serde(default)]
    pub comment_count: i64,
    /// Entities extracted during ingestion
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    /// Embedding vector (fixed dimension; all-zero if embedding failed)
    #[serde(default)]
    pub embedding: Vec<f32>,
    /// Sentiment score in [-1, 1] (0.0 if analysis failed)
    #[serde(default)]
    pub sentiment: f32,
}

impl ContentRecord {
    /// Validate the record before it touches storage
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidInput("record id must not be empty".into()));
        }
        Ok(())
    }

    /// The text fed to entity extraction, embedding, and sentiment analysis
    pub fn full_text(&self) -> String {
        match &self.title {
            Some(title) if !title.is_empty() => format!("{} {}", title, self.content),
            _ => self.content.clone(),
        }
    }

    /// Entity names joined for the full-text index
    pub fn entity_names(&self) -> String {
        self.entities
            .iter()
            .map(|e| e.name.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Kinds of content records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Forum submission
    Post,
    /// Forum comment
    Comment,
    /// One turn of a chat conversation
    ChatTurn,
}

impl RecordKind {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
            Self::ChatTurn => "chat_turn",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "post" | "submission" => Some(Self::Post),
            "comment" => Some(Self::Comment),
            "chat_turn" | "chat_message" => Some(Self::ChatTurn),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named entity mentioned in a record, as produced by extraction
///
/// This is a per-mention annotation attached to its record, not a standalone
/// persisted object. Graph-level entity statistics live on the entity node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    /// Normalized entity name
    #[serde(rename = "entity")]
    pub name: String,
    /// Semantic type of the entity
    #[serde(rename = "type")]
    pub kind: EntityKind,
    /// Extraction confidence in [0, 1]
    pub confidence: f32,
}

impl ExtractedEntity {
    /// Create a new entity annotation with a clamped confidence
    pub fn new(name: impl Into<String>, kind: EntityKind, confidence: f32) -> Self {
        Self {
            name: name.into(),
            kind,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Semantic types of extracted entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Place,
    Organization,
    Concept,
    Other,
}

impl EntityKind {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Place => "place",
            Self::Organization => "organization",
            Self::Concept => "concept",
            Self::Other => "other",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "person" => Some(Self::Person),
            "place" | "location" => Some(Self::Place),
            "organization" | "org" => Some(Self::Organization),
            "concept" => Some(Self::Concept),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalize an entity name for node deduplication
///
/// Trims and collapses internal whitespace. Case is preserved so entity
/// names remain readable in query output.
pub fn normalize_entity_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

//! In-memory knowledge graph
//!
//! Typed nodes (records, entities, authors, collections) in an id-keyed
//! arena with an undirected adjacency view for traversal. The graph is
//! persisted as a versioned JSON snapshot (see [`snapshot`]) and is the only
//! place entity occurrence statistics live.

pub mod snapshot;

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::record::{ContentRecord, EntityKind, ExtractedEntity};

/// Kinds of graph nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Record,
    Entity,
    Author,
    Collection,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Entity => "entity",
            Self::Author => "author",
            Self::Collection => "collection",
        }
    }
}

/// Kinds of graph edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Record mentions an entity
    Mentions,
    /// Author wrote a record
    Authored,
    /// Collection contains a record
    BelongsTo,
    /// Two entities appeared in the same record
    CoOccursWith,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mentions => "mentions",
            Self::Authored => "authored",
            Self::BelongsTo => "belongs_to",
            Self::CoOccursWith => "co_occurs_with",
        }
    }
}

/// A node in the knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    /// Display name (entity name, author name, collection tag, record title)
    pub name: String,
    /// Entity type, for entity nodes only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_kind: Option<EntityKind>,
    /// How many mentions this entity has accumulated across all ingestions
    #[serde(default)]
    pub occurrences: u64,
    /// Running mean extraction confidence across those mentions
    #[serde(default)]
    pub avg_confidence: f32,
}

/// An edge in the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub confidence: f32,
    /// Record that produced this edge, for per-record edge identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// Edge identity: same (source, target, kind, origin) replaces
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EdgeKey {
    source: String,
    target: String,
    kind: EdgeKind,
    origin: Option<String>,
}

impl GraphEdge {
    fn key(&self) -> EdgeKey {
        EdgeKey {
            source: self.source.clone(),
            target: self.target.clone(),
            kind: self.kind,
            origin: self.origin.clone(),
        }
    }
}

/// Node and edge counts, by kind
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphStats {
    pub node_count: u64,
    pub edge_count: u64,
    pub nodes_by_kind: HashMap<String, u64>,
    pub edges_by_kind: HashMap<String, u64>,
}

/// Id-keyed graph arena with an undirected adjacency view
#[derive(Debug, Default, Clone)]
pub struct KnowledgeGraph {
    nodes: HashMap<String, GraphNode>,
    edges: HashMap<EdgeKey, GraphEdge>,
    adjacency: HashMap<String, BTreeSet<String>>,
}

/// Node id for an author
pub fn author_node_id(author: &str) -> String {
    format!("author_{}", author)
}

/// Node id for a collection
pub fn collection_node_id(collection: &str) -> String {
    format!("collection_{}", collection)
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn neighbors(&self, id: &str) -> impl Iterator<Item = &str> {
        self.adjacency
            .get(id)
            .into_iter()
            .flat_map(|set| set.iter().map(|s| s.as_str()))
    }

    fn insert_edge(&mut self, edge: GraphEdge) {
        self.adjacency
            .entry(edge.source.clone())
            .or_default()
            .insert(edge.target.clone());
        self.adjacency
            .entry(edge.target.clone())
            .or_default()
            .insert(edge.source.clone());
        self.edges.insert(edge.key(), edge);
    }

    /// Insert or replace the node for a record, wiring up its direct edges
    ///
    /// Replacing a record drops its previous direct edges first, so stale
    /// mentions do not survive a re-ingest. Entity occurrence statistics are
    /// cumulative and are not rewound.
    pub fn upsert_record_node(&mut self, record: &ContentRecord, entities: &[ExtractedEntity]) {
        if self.nodes.contains_key(&record.id) {
            self.remove_record(&record.id);
        }

        self.nodes.insert(
            record.id.clone(),
            GraphNode {
                id: record.id.clone(),
                kind: NodeKind::Record,
                name: record.title.clone().unwrap_or_else(|| record.id.clone()),
                entity_kind: None,
                occurrences: 0,
                avg_confidence: 0.0,
            },
        );

        for entity in entities {
            let node = self
                .nodes
                .entry(entity.name.clone())
                .or_insert_with(|| GraphNode {
                    id: entity.name.clone(),
                    kind: NodeKind::Entity,
                    name: entity.name.clone(),
                    entity_kind: Some(entity.kind),
                    occurrences: 0,
                    avg_confidence: 0.0,
                });
            let old = node.occurrences;
            node.occurrences = old + 1;
            node.avg_confidence =
                (node.avg_confidence * old as f32 + entity.confidence) / (old + 1) as f32;

            self.insert_edge(GraphEdge {
                source: record.id.clone(),
                target: entity.name.clone(),
                kind: EdgeKind::Mentions,
                confidence: entity.confidence,
                origin: Some(record.id.clone()),
            });
        }

        if !record.author.is_empty() {
            let author_id = author_node_id(&record.author);
            self.nodes.entry(author_id.clone()).or_insert_with(|| GraphNode {
                id: author_id.clone(),
                kind: NodeKind::Author,
                name: record.author.clone(),
                entity_kind: None,
                occurrences: 0,
                avg_confidence: 0.0,
            });
            self.insert_edge(GraphEdge {
                source: author_id,
                target: record.id.clone(),
                kind: EdgeKind::Authored,
                confidence: 1.0,
                origin: None,
            });
        }

        if !record.collection.is_empty() {
            let collection_id = collection_node_id(&record.collection);
            self.nodes
                .entry(collection_id.clone())
                .or_insert_with(|| GraphNode {
                    id: collection_id.clone(),
                    kind: NodeKind::Collection,
                    name: record.collection.clone(),
                    entity_kind: None,
                    occurrences: 0,
                    avg_confidence: 0.0,
                });
            self.insert_edge(GraphEdge {
                source: collection_id,
                target: record.id.clone(),
                kind: EdgeKind::BelongsTo,
                confidence: 1.0,
                origin: None,
            });
        }
    }

    /// Record that two entities appeared in the same record
    ///
    /// The pair is unordered; both entity nodes must already exist (they do
    /// after `upsert_record_node`). Confidence is the weaker of the two
    /// mentions. Re-adding the same pair for the same record replaces.
    pub fn add_co_occurrence(
        &mut self,
        entity_a: &str,
        entity_b: &str,
        confidence: f32,
        record_id: &str,
    ) {
        if entity_a == entity_b {
            return;
        }
        if !self.nodes.contains_key(entity_a) || !self.nodes.contains_key(entity_b) {
            return;
        }

        // Canonical order so (a, b) and (b, a) are one edge
        let (first, second) = if entity_a <= entity_b {
            (entity_a, entity_b)
        } else {
            (entity_b, entity_a)
        };

        self.insert_edge(GraphEdge {
            source: first.to_string(),
            target: second.to_string(),
            kind: EdgeKind::CoOccursWith,
            confidence,
            origin: Some(record_id.to_string()),
        });
    }

    /// Record ids reachable from `start` within `max_depth` hops
    ///
    /// Breadth-first over the undirected adjacency view; only record-kind
    /// nodes are returned, and the start node never is. Safe on cycles.
    pub fn connected_records(&self, start: &str, max_depth: usize) -> Vec<String> {
        let mut results = Vec::new();
        if max_depth == 0 || !self.nodes.contains_key(start) {
            return results;
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut frontier: VecDeque<(&str, usize)> = VecDeque::new();
        visited.insert(start);
        frontier.push_back((start, 0));

        while let Some((current, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }
            if let Some(neighbors) = self.adjacency.get(current) {
                for neighbor in neighbors {
                    if !visited.insert(neighbor.as_str()) {
                        continue;
                    }
                    if let Some(node) = self.nodes.get(neighbor) {
                        if node.kind == NodeKind::Record {
                            results.push(neighbor.clone());
                        }
                    }
                    frontier.push_back((neighbor, depth + 1));
                }
            }
        }

        results
    }

    /// Remove a record node, its incident edges, and the co-occurrence
    /// edges it produced. Entity counters keep their accumulated values.
    pub fn remove_record(&mut self, record_id: &str) {
        let Some(node) = self.nodes.get(record_id) else {
            return;
        };
        if node.kind != NodeKind::Record {
            return;
        }

        self.nodes.remove(record_id);
        self.edges.retain(|key, _| {
            key.source != record_id
                && key.target != record_id
                && key.origin.as_deref() != Some(record_id)
        });
        self.rebuild_adjacency();
    }

    fn rebuild_adjacency(&mut self) {
        self.adjacency.clear();
        let keys: Vec<(String, String)> = self
            .edges
            .keys()
            .map(|k| (k.source.clone(), k.target.clone()))
            .collect();
        for (source, target) in keys {
            self.adjacency
                .entry(source.clone())
                .or_default()
                .insert(target.clone());
            self.adjacency.entry(target).or_default().insert(source);
        }
    }

    /// Node and edge counts by kind
    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            node_count: self.nodes.len() as u64,
            edge_count: self.edges.len() as u64,
            ..Default::default()
        };
        for node in self.nodes.values() {
            *stats
                .nodes_by_kind
                .entry(node.kind.as_str().to_string())
                .or_default() += 1;
        }
        for edge in self.edges.values() {
            *stats
                .edges_by_kind
                .entry(edge.kind.as_str().to_string())
                .or_default() += 1;
        }
        stats
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub(crate) fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.values()
    }

    pub(crate) fn from_parts(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Self {
        let mut graph = Self {
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            ..Default::default()
        };
        for edge in edges {
            graph.insert_edge(edge);
        }
        graph
    }
}

//! Graph snapshot persistence
//!
//! The graph is saved as a schema-versioned JSON document so older builds
//! never misread a newer layout.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::graph::{GraphEdge, GraphNode, KnowledgeGraph};

/// Snapshot format version this build writes and the newest it can read
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct GraphSnapshot {
    schema_version: u32,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

/// Write the graph to `path` as versioned JSON
pub fn save(graph: &KnowledgeGraph, path: &Path) -> Result<()> {
    let mut nodes: Vec<GraphNode> = graph.nodes().cloned().collect();
    let mut edges: Vec<GraphEdge> = graph.edges().cloned().collect();
    // Deterministic file contents for identical graphs
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    edges.sort_by(|a, b| {
        (&a.source, &a.target, a.kind.as_str(), &a.origin)
            .cmp(&(&b.source, &b.target, b.kind.as_str(), &b.origin))
    });

    let snapshot = GraphSnapshot {
        schema_version: SCHEMA_VERSION,
        nodes,
        edges,
    };

    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let contents = serde_json::to_string(&snapshot)
        .map_err(|e| Error::Snapshot(format!("Failed to serialize graph: {}", e)))?;
    std::fs::write(path, contents)?;

    info!(
        path = %path.display(),
        nodes = snapshot.nodes.len(),
        edges = snapshot.edges.len(),
        "Graph snapshot saved"
    );
    Ok(())
}

/// Load a graph from `path`, refusing snapshots newer than this build
pub fn load(path: &Path) -> Result<KnowledgeGraph> {
    let contents = std::fs::read_to_string(path)?;
    let snapshot: GraphSnapshot = serde_json::from_str(&contents)
        .map_err(|e| Error::Snapshot(format!("Failed to parse graph snapshot: {}", e)))?;

    if snapshot.schema_version > SCHEMA_VERSION {
        return Err(Error::Snapshot(format!(
            "Snapshot version {} is newer than supported version {}",
            snapshot.schema_version, SCHEMA_VERSION
        )));
    }

    info!(
        path = %path.display(),
        nodes = snapshot.nodes.len(),
        edges = snapshot.edges.len(),
        "Graph snapshot loaded"
    );
    Ok(KnowledgeGraph::from_parts(snapshot.nodes, snapshot.edges))
}

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::{GraphError, GraphStore};
use crate::models::graph::{
    GraphPayload, GraphQuery, Properties, PushSummary, QueryResult, RelationshipRow,
};

#[derive(Debug, Clone)]
struct StoredNode {
    label: String,
    id: String,
    /// Includes `id`, always equal to the merge key.
    properties: Properties,
}

#[derive(Debug, Clone)]
struct StoredEdge {
    from: usize,
    to: usize,
    rel_type: String,
    properties: Properties,
}

#[derive(Debug, Default)]
struct MemoryGraph {
    nodes: Vec<StoredNode>,
    edges: Vec<StoredEdge>,
}

impl MemoryGraph {
    fn merge_node(&mut self, label: &str, id: &str, properties: &Properties) {
        let existing = self
            .nodes
            .iter_mut()
            .find(|n| n.label == label && n.id == id);

        match existing {
            Some(node) => {
                node.properties.extend(properties.clone());
                node.properties
                    .insert("id".to_string(), Value::String(id.to_string()));
            }
            None => {
                let mut stored = properties.clone();
                stored.insert("id".to_string(), Value::String(id.to_string()));
                self.nodes.push(StoredNode {
                    label: label.to_string(),
                    id: id.to_string(),
                    properties: stored,
                });
            }
        }
    }

    fn indices_with_id(&self, id: &str) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.id == id)
            .map(|(i, _)| i)
            .collect()
    }

    fn merge_edge(&mut self, from: usize, to: usize, rel_type: &str, properties: &Properties) {
        let existing = self
            .edges
            .iter_mut()
            .find(|e| e.from == from && e.to == to && e.rel_type == rel_type);

        match existing {
            Some(edge) => edge.properties.extend(properties.clone()),
            None => self.edges.push(StoredEdge {
                from,
                to,
                rel_type: rel_type.to_string(),
                properties: properties.clone(),
            }),
        }
    }
}

/// In-process graph store. Raw Cypher is not interpreted.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    graph: RwLock<MemoryGraph>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn health(&self) -> Result<Properties, GraphError> {
        let mut row = Properties::new();
        row.insert("status".to_string(), json!("connected"));
        Ok(row)
    }

    async fn push(&self, payload: &GraphPayload) -> Result<PushSummary, GraphError> {
        let mut graph = self.graph.write().await;

        // Check every endpoint before touching the graph.
        let mut known: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        known.extend(payload.nodes.iter().map(|n| n.id.as_str()));
        if let Some(rel) = payload
            .relationships
            .iter()
            .find(|r| !known.contains(r.from.as_str()) || !known.contains(r.to.as_str()))
        {
            return Err(GraphError::UnknownNode {
                from: rel.from.clone(),
                to: rel.to.clone(),
                rel_type: rel.rel_type.clone(),
            });
        }

        for node in &payload.nodes {
            graph.merge_node(&node.label, &node.id, &node.properties);
        }

        for rel in &payload.relationships {
            let sources = graph.indices_with_id(&rel.from);
            let targets = graph.indices_with_id(&rel.to);
            for &a in &sources {
                for &b in &targets {
                    graph.merge_edge(a, b, &rel.rel_type, &rel.properties);
                }
            }
        }

        Ok(PushSummary::success(payload))
    }

    async fn query(&self, query: &GraphQuery) -> Result<QueryResult, GraphError> {
        match query {
            GraphQuery::Raw { .. } => Err(GraphError::Unsupported(
                "Raw Cypher".to_string(),
                "memory",
            )),
            GraphQuery::Lookup {
                label,
                property,
                value,
            } => {
                let graph = self.graph.read().await;
                let rows = graph
                    .nodes
                    .iter()
                    .filter(|n| &n.label == label)
                    .filter(|n| match (n.properties.get(property), value) {
                        (Some(actual), Some(expected)) => actual == expected,
                        (Some(actual), None) => !actual.is_null(),
                        (None, _) => false,
                    })
                    .map(|n| {
                        let mut row = Properties::new();
                        row.insert("n".to_string(), Value::Object(n.properties.clone()));
                        row
                    })
                    .collect();
                Ok(QueryResult::new(rows))
            }
        }
    }

    async fn clear(&self) -> Result<(), GraphError> {
        let mut graph = self.graph.write().await;
        graph.nodes.clear();
        graph.edges.clear();
        Ok(())
    }

    async fn relationships(&self, limit: usize) -> Result<Vec<RelationshipRow>, GraphError> {
        let graph = self.graph.read().await;
        Ok(graph
            .edges
            .iter()
            .take(limit)
            .map(|e| {
                let (from, to) = (&graph.nodes[e.from], &graph.nodes[e.to]);
                RelationshipRow {
                    from: from.properties.clone(),
                    from_labels: vec![from.label.clone()],
                    rel_type: e.rel_type.clone(),
                    properties: e.properties.clone(),
                    to: to.properties.clone(),
                    to_labels: vec![to.label.clone()],
                }
            })
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

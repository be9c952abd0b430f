//! Graph storage for the gateway.
//!
//! `GraphStore` is the seam between HTTP handlers and the database. Two
//! implementations exist:
//! - **Neo4j** via the HTTP transactional Cypher endpoint
//! - **memory**, an in-process store with the same push/lookup/clear semantics
//!
//! Labels, relationship types and property names are interpolated into Cypher
//! text. Callers must pass values that went through `GraphPayload::validate`
//! or `QueryRequest::into_query`.

pub mod memory;
pub mod neo4j;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::GraphConfig;
use crate::error::AgentverseError;
use crate::models::graph::{
    GraphPayload, GraphQuery, Properties, PushSummary, QueryResult, RelationshipRow,
};

pub use memory::MemoryGraphStore;
pub use neo4j::Neo4jHttpStore;

/// Default and maximum row counts for relationship listings.
pub const DEFAULT_RELATIONSHIP_LIMIT: usize = 200;
pub const MAX_RELATIONSHIP_LIMIT: usize = 1000;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("{0}")]
    Validation(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Neo4j error ({code}): {message}")]
    Database { code: String, message: String },

    #[error("Neo4j returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Relationship {from} -[{rel_type}]-> {to} references an unknown node")]
    UnknownNode {
        from: String,
        to: String,
        rel_type: String,
    },

    #[error("{0} is not supported by the {1} graph store")]
    Unsupported(String, &'static str),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Run a trivial read. Returns the single row it produced.
    async fn health(&self) -> Result<Properties, GraphError>;

    /// Upsert nodes by `id` + `label`, then merge relationships between
    /// existing ids. Fails without applying anything if a relationship
    /// endpoint is unknown.
    async fn push(&self, payload: &GraphPayload) -> Result<PushSummary, GraphError>;

    async fn query(&self, query: &GraphQuery) -> Result<QueryResult, GraphError>;

    /// Delete every node and relationship.
    async fn clear(&self) -> Result<(), GraphError>;

    /// List up to `limit` relationships with their endpoints.
    async fn relationships(&self, limit: usize) -> Result<Vec<RelationshipRow>, GraphError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Build the store selected by `graph.backend`.
pub fn create_store(config: &GraphConfig) -> Result<Arc<dyn GraphStore>, AgentverseError> {
    match config.backend.as_str() {
        "neo4j" => {
            config.require_credentials()?;
            let store = Neo4jHttpStore::new(config)?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(MemoryGraphStore::new())),
        other => Err(AgentverseError::Config(format!(
            "Unknown graph backend '{}' (expected 'neo4j' or 'memory')",
            other
        ))),
    }
}

// ============================================================================
// Cypher text
// ============================================================================

pub const HEALTH_CYPHER: &str = "RETURN 'connected' AS status";

pub const CLEAR_CYPHER: &str = "MATCH (n) DETACH DELETE n";

pub const RELATIONSHIPS_CYPHER: &str = "MATCH (n)-[r]->(m) \
     RETURN properties(n) AS `from`, labels(n) AS from_labels, type(r) AS type, \
     properties(r) AS properties, properties(m) AS `to`, labels(m) AS to_labels \
     LIMIT $limit";

/// `id` is the merge key; it is re-set after the property map so a stray
/// `properties.id` cannot move the node away from it.
pub fn node_merge_cypher(label: &str) -> String {
    format!("MERGE (n:{} {{id: $id}}) SET n += $properties, n.id = $id", label)
}

/// Returns the number of merged edges as `linked`; zero means one of the
/// endpoints did not match.
pub fn relationship_merge_cypher(rel_type: &str) -> String {
    format!(
        "MATCH (a {{id: $from_id}}), (b {{id: $to_id}}) \
         MERGE (a)-[r:{}]->(b) SET r += $properties \
         RETURN count(r) AS linked",
        rel_type
    )
}

pub fn lookup_cypher(label: &str, property: &str, has_value: bool) -> String {
    if has_value {
        format!("MATCH (n:{}) WHERE n.{} = $value RETURN n", label, property)
    } else {
        format!("MATCH (n:{}) WHERE n.{} IS NOT NULL RETURN n", label, property)
    }
}

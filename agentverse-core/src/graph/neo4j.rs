//! Neo4j over the HTTP transactional Cypher endpoint.
//!
//! Single reads go to `POST /db/{db}/tx/commit`. A push opens an explicit
//! transaction with `POST /db/{db}/tx`, inspects the relationship merge counts
//! and then commits or rolls back, so a bad relationship leaves nothing behind.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    lookup_cypher, node_merge_cypher, relationship_merge_cypher, GraphError, GraphStore,
    CLEAR_CYPHER, HEALTH_CYPHER, RELATIONSHIPS_CYPHER,
};
use crate::config::GraphConfig;
use crate::models::graph::{
    GraphPayload, GraphQuery, Properties, PushSummary, QueryResult, RelationshipRow,
};

// ============================================================================
// Wire structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct TxRequest<'a> {
    statements: &'a [Statement],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Statement {
    statement: String,
    parameters: Properties,
    result_data_contents: [&'static str; 1],
}

impl Statement {
    fn new(statement: impl Into<String>, parameters: Properties) -> Self {
        Self {
            statement: statement.into(),
            parameters,
            result_data_contents: ["row"],
        }
    }
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<Neo4jErrorDetail>,
    commit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    data: Vec<RowData>,
}

#[derive(Debug, Deserialize)]
struct RowData {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Neo4jErrorDetail {
    code: String,
    message: String,
}

impl StatementResult {
    fn into_rows(self) -> Vec<Properties> {
        let columns = self.columns;
        self.data
            .into_iter()
            .map(|d| columns.iter().cloned().zip(d.row).collect())
            .collect()
    }
}

fn params(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => Properties::new(),
    }
}

// ============================================================================
// Neo4jHttpStore
// ============================================================================

#[derive(Debug, Clone)]
pub struct Neo4jHttpStore {
    client: Client,
    base_url: String,
    database: String,
    user: String,
    password: String,
}

impl Neo4jHttpStore {
    pub fn new(config: &GraphConfig) -> Result<Self, GraphError> {
        let base_url = http_base_url(&config.uri)?;
        Self::with_base_url(config, base_url)
    }

    /// Create a store against an explicit HTTP base URL (for testing)
    pub fn with_base_url(config: &GraphConfig, base_url: String) -> Result<Self, GraphError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    fn commit_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.base_url, self.database)
    }

    fn begin_url(&self) -> String {
        format!("{}/db/{}/tx", self.base_url, self.database)
    }

    async fn post(&self, url: &str, statements: &[Statement]) -> Result<TxResponse, GraphError> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&TxRequest { statements })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "Neo4j HTTP error");
            return Err(GraphError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let tx: TxResponse = response.json().await?;
        if let Some(err) = tx.errors.first() {
            tracing::warn!(code = %err.code, message = %err.message, "Cypher statement failed");
            return Err(GraphError::Database {
                code: err.code.clone(),
                message: err.message.clone(),
            });
        }

        Ok(tx)
    }

    /// Run one statement in an auto-commit transaction and return its rows.
    async fn run(&self, cypher: &str, parameters: Properties) -> Result<Vec<Properties>, GraphError> {
        let tx = self
            .post(&self.commit_url(), &[Statement::new(cypher, parameters)])
            .await?;

        Ok(tx
            .results
            .into_iter()
            .next()
            .map(StatementResult::into_rows)
            .unwrap_or_default())
    }

    async fn rollback(&self, commit_url: &str) {
        let tx_url = commit_url.trim_end_matches("/commit");
        let result = self
            .client
            .delete(tx_url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, tx = %tx_url, "Failed to roll back Neo4j transaction");
        }
    }
}

#[async_trait]
impl GraphStore for Neo4jHttpStore {
    async fn health(&self) -> Result<Properties, GraphError> {
        self.run(HEALTH_CYPHER, Properties::new())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GraphError::InvalidResponse("health query returned no rows".to_string()))
    }

    async fn push(&self, payload: &GraphPayload) -> Result<PushSummary, GraphError> {
        let mut statements: Vec<Statement> = payload
            .nodes
            .iter()
            .map(|node| {
                Statement::new(
                    node_merge_cypher(&node.label),
                    params(json!({ "id": node.id, "properties": node.properties })),
                )
            })
            .collect();

        let rel_offset = statements.len();
        statements.extend(payload.relationships.iter().map(|rel| {
            Statement::new(
                relationship_merge_cypher(&rel.rel_type),
                params(json!({
                    "from_id": rel.from,
                    "to_id": rel.to,
                    "properties": rel.properties,
                })),
            )
        }));

        if statements.is_empty() {
            return Ok(PushSummary::success(payload));
        }

        // Statement errors make Neo4j roll the open transaction back itself.
        let opened = self.post(&self.begin_url(), &statements).await?;
        let commit_url = opened.commit.clone().ok_or_else(|| {
            GraphError::InvalidResponse("transaction response has no commit URL".to_string())
        })?;

        for (i, rel) in payload.relationships.iter().enumerate() {
            let linked = opened
                .results
                .get(rel_offset + i)
                .and_then(|r| r.data.first())
                .and_then(|d| d.row.first())
                .and_then(Value::as_i64)
                .unwrap_or(0);

            if linked == 0 {
                self.rollback(&commit_url).await;
                return Err(GraphError::UnknownNode {
                    from: rel.from.clone(),
                    to: rel.to.clone(),
                    rel_type: rel.rel_type.clone(),
                });
            }
        }

        self.post(&commit_url, &[]).await?;

        tracing::info!(
            nodes = payload.nodes.len(),
            relationships = payload.relationships.len(),
            "Pushed graph to Neo4j"
        );

        Ok(PushSummary::success(payload))
    }

    async fn query(&self, query: &GraphQuery) -> Result<QueryResult, GraphError> {
        let rows = match query {
            GraphQuery::Raw { cypher, parameters } => self.run(cypher, parameters.clone()).await?,
            GraphQuery::Lookup {
                label,
                property,
                value,
            } => {
                let cypher = lookup_cypher(label, property, value.is_some());
                let parameters = match value {
                    Some(v) => params(json!({ "value": v })),
                    None => Properties::new(),
                };
                self.run(&cypher, parameters).await?
            }
        };

        Ok(QueryResult::new(rows))
    }

    async fn clear(&self) -> Result<(), GraphError> {
        self.run(CLEAR_CYPHER, Properties::new()).await?;
        tracing::info!("Cleared Neo4j database");
        Ok(())
    }

    async fn relationships(&self, limit: usize) -> Result<Vec<RelationshipRow>, GraphError> {
        let rows = self
            .run(RELATIONSHIPS_CYPHER, params(json!({ "limit": limit })))
            .await?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_value(Value::Object(row))
                    .map_err(|e| GraphError::InvalidResponse(e.to_string()))
            })
            .collect()
    }

    fn name(&self) -> &str {
        "neo4j"
    }
}

/// Map a configured Neo4j URI onto the HTTP endpoint. Plain bolt-style schemes
/// go to HTTP on 7474; secure ones (`+s`, `+ssc`) to HTTPS on the default port,
/// which is where hosted instances such as Aura serve the HTTP API.
pub fn http_base_url(uri: &str) -> Result<String, GraphError> {
    let url = Url::parse(uri)
        .map_err(|e| GraphError::Validation(format!("Invalid Neo4j URI '{}': {}", uri, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(uri.trim_end_matches('/').to_string()),
        scheme => {
            let host = url
                .host_str()
                .ok_or_else(|| GraphError::Validation(format!("Neo4j URI '{}' has no host", uri)))?;
            let secure = scheme.ends_with("+s") || scheme.ends_with("+ssc");
            let base = if secure {
                format!("https://{}", host)
            } else {
                format!("http://{}:7474", host)
            };
            tracing::warn!(uri = %uri, http = %base, "Translating Neo4j URI to the HTTP endpoint");
            Ok(base)
        }
    }
}

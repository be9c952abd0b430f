//! Agentverse Graph API
//!
//! Axum-based HTTP gateway translating JSON request bodies into graph store
//! calls. Each endpoint has a thin axum handler that delegates to an inner
//! function returning `(StatusCode, Value)`; the inner functions are tested
//! directly without the router.
//!
//! Endpoints:
//! - GET    /        banner with the endpoint list
//! - GET    /health  trivial read against the database
//! - POST   /push    upsert nodes and merge relationships
//! - POST   /query   raw Cypher or label/property/value lookup
//! - DELETE /clear   delete every node and relationship
//! - GET    /graph   relationship triples for graph viewers
//!
//! Status codes: 400 validation, 501 unsupported by the backend, 502 database
//! failure, 503 unhealthy.

use std::sync::Arc;

use agentverse_core::graph::{
    GraphError, GraphStore, DEFAULT_RELATIONSHIP_LIMIT, MAX_RELATIONSHIP_LIMIT,
};
use agentverse_core::{AgentverseConfig, GraphPayload, QueryRequest};
use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<dyn GraphStore>,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/push", post(push_handler))
        .route("/query", post(query_handler))
        .route("/clear", delete(clear_handler))
        .route("/graph", get(graph_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    store: Arc<dyn GraphStore>,
    config: AgentverseConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let backend = store.name().to_string();
    let state = Arc::new(HttpState { store });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(backend = %backend, "Agentverse graph API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct GraphParams {
    pub limit: Option<usize>,
}

// ============================================================================
// Error mapping
// ============================================================================

pub fn error_body(msg: impl Into<String>) -> Value {
    json!({
        "error": msg.into(),
        "status": "error",
    })
}

/// Map a graph failure onto a status code and error body.
pub fn graph_error_response(e: GraphError) -> (StatusCode, Value) {
    let status = match &e {
        GraphError::Validation(_) => StatusCode::BAD_REQUEST,
        GraphError::Unsupported(..) => StatusCode::NOT_IMPLEMENTED,
        _ => StatusCode::BAD_GATEWAY,
    };
    if status == StatusCode::BAD_REQUEST {
        tracing::debug!(error = %e, "Rejected graph request");
    } else {
        tracing::warn!(error = %e, "Graph request failed");
    }
    (status, error_body(e.to_string()))
}

fn rejection_response(rejection: JsonRejection) -> (StatusCode, Value) {
    let msg = match rejection {
        JsonRejection::MissingJsonContentType(_) => "No JSON data provided".to_string(),
        other => other.body_text(),
    };
    (StatusCode::BAD_REQUEST, error_body(msg))
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Endpoint listing (pure, no IO).
pub fn root_inner() -> Value {
    json!({
        "message": "Agentverse graph API is running!",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/health", "/push", "/query", "/clear", "/graph"],
    })
}

/// Health check. Never fails: an unreachable database is reported as
/// `unhealthy` with 503.
pub async fn health_inner(store: &dyn GraphStore) -> (StatusCode, Value) {
    match store.health().await {
        Ok(row) => (
            StatusCode::OK,
            json!({
                "status": "healthy",
                "backend": store.name(),
                "neo4j": row,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, backend = store.name(), "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "status": "unhealthy",
                    "backend": store.name(),
                    "error": e.to_string(),
                }),
            )
        }
    }
}

/// Validate the raw body and upsert it.
pub async fn push_inner(store: &dyn GraphStore, body: Value) -> (StatusCode, Value) {
    let payload = match GraphPayload::parse(body) {
        Ok(p) => p,
        Err(e) => return graph_error_response(e),
    };

    match store.push(&payload).await {
        Ok(summary) => {
            tracing::info!(
                nodes = summary.nodes_created,
                relationships = summary.relationships_created,
                "Graph pushed"
            );
            (StatusCode::OK, json!(summary))
        }
        Err(e) => graph_error_response(e),
    }
}

/// Resolve the request form and run it.
pub async fn query_inner(store: &dyn GraphStore, body: Value) -> (StatusCode, Value) {
    if body.as_object().map_or(true, |o| o.is_empty()) {
        return (StatusCode::BAD_REQUEST, error_body("No JSON data provided"));
    }

    let request: QueryRequest = match serde_json::from_value(body) {
        Ok(r) => r,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                error_body(format!("Invalid query request: {}", e)),
            )
        }
    };

    let query = match request.into_query() {
        Ok(q) => q,
        Err(e) => return graph_error_response(e),
    };

    match store.query(&query).await {
        Ok(result) => (StatusCode::OK, json!(result)),
        Err(e) => graph_error_response(e),
    }
}

/// Unconditional delete of everything.
pub async fn clear_inner(store: &dyn GraphStore) -> (StatusCode, Value) {
    match store.clear().await {
        Ok(()) => {
            tracing::info!(backend = store.name(), "Graph cleared");
            (
                StatusCode::OK,
                json!({
                    "status": "success",
                    "message": "Database cleared",
                }),
            )
        }
        Err(e) => graph_error_response(e),
    }
}

/// Relationship listing; clamps the limit into `1..=MAX_RELATIONSHIP_LIMIT`.
pub async fn graph_inner(store: &dyn GraphStore, params: GraphParams) -> (StatusCode, Value) {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RELATIONSHIP_LIMIT)
        .clamp(1, MAX_RELATIONSHIP_LIMIT);

    match store.relationships(limit).await {
        Ok(rows) => (
            StatusCode::OK,
            json!({
                "count": rows.len(),
                "relationships": rows,
            }),
        ),
        Err(e) => graph_error_response(e),
    }
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

pub async fn root_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(root_inner()))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(state.store.as_ref()).await;
    (status, Json(body))
}

pub async fn push_handler(
    State(state): State<Arc<HttpState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> impl IntoResponse {
    let (status, body) = match body {
        Ok(Json(body)) => push_inner(state.store.as_ref(), body).await,
        Err(rejection) => rejection_response(rejection),
    };
    (status, Json(body))
}

pub async fn query_handler(
    State(state): State<Arc<HttpState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> impl IntoResponse {
    let (status, body) = match body {
        Ok(Json(body)) => query_inner(state.store.as_ref(), body).await,
        Err(rejection) => rejection_response(rejection),
    };
    (status, Json(body))
}

pub async fn clear_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = clear_inner(state.store.as_ref()).await;
    (status, Json(body))
}

pub async fn graph_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<GraphParams>,
) -> impl IntoResponse {
    let (status, body) = graph_inner(state.store.as_ref(), params).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================

//! agentverse-cli: direct access to the text agent and the graph gateway
//!
//! # Subcommands
//! - `generate <prompt>`: one generation call; writes the output record, prints the text
//! - `extract --notes F --transcript F [--push URL] [--output F]`: notes to graph JSON
//! - `status`: gateway health

use std::path::{Path, PathBuf};
use std::time::Duration;

use agentverse_core::{
    create_generator, extract::extract_graph, AgentverseConfig, GraphPayload, OutputRecord,
    PushSummary, TextAgent,
};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "agentverse-cli", version, about = "Agentverse text agent and graph gateway CLI")]
struct Cli {
    #[arg(short, long, default_value = "agentverse.toml")]
    config: String,

    /// Graph gateway URL (overrides AGENTVERSE_HTTP_URL env var)
    #[arg(long, env = "AGENTVERSE_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send one prompt to the text agent
    Generate {
        prompt: String,
    },

    /// Extract a knowledge graph from meeting notes and a transcript
    Extract {
        #[arg(long)]
        notes: PathBuf,

        #[arg(long)]
        transcript: PathBuf,

        /// Push the extracted graph to this gateway URL
        #[arg(long)]
        push: Option<String>,

        /// Write the graph JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show graph gateway status
    Status,
}

// ============================================================================
// Commands
// ============================================================================

async fn do_generate(config: &AgentverseConfig, prompt: &str) -> anyhow::Result<()> {
    let agent = TextAgent::new(
        create_generator(&config.generation)?,
        OutputRecord::new(&config.generation.output_path),
    );
    let text = agent.respond(prompt).await?;
    println!("{}", text);
    Ok(())
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}

async fn do_extract(
    config: &AgentverseConfig,
    notes: &Path,
    transcript: &Path,
    push: Option<&str>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let notes = read_input(notes)?;
    let transcript = read_input(transcript)?;

    let generator = create_generator(&config.generation)?;
    let payload = extract_graph(generator.as_ref(), &notes, &transcript).await?;
    let json = serde_json::to_string_pretty(&payload)?;

    match output {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("cannot write {}", path.display()))?;
            eprintln!(
                "Wrote {} nodes and {} relationships to {}",
                payload.nodes.len(),
                payload.relationships.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }

    if let Some(server) = push {
        let client = http_client(30)?;
        let summary = push_graph(&client, server, &payload).await?;
        eprintln!(
            "Pushed to {}: {} nodes, {} relationships",
            server, summary.nodes_created, summary.relationships_created
        );
    }
    Ok(())
}

fn http_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// POST the payload to the gateway's `/push`.
async fn push_graph(
    client: &reqwest::Client,
    server: &str,
    payload: &GraphPayload,
) -> anyhow::Result<PushSummary> {
    let url = format!("{}/push", server.trim_end_matches('/'));
    let resp = client
        .post(&url)
        .json(payload)
        .send()
        .await
        .with_context(|| format!("connection failed to {}", url))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or_default();
        bail!(
            "server returned {}: {}",
            status,
            body["error"].as_str().unwrap_or("unknown error")
        );
    }
    Ok(resp.json().await?)
}

/// Human-readable lines for a `/health` body.
fn format_status(body: &Value) -> Vec<String> {
    let mut lines = vec![format!(
        "Graph gateway: {}",
        body["status"].as_str().unwrap_or("unknown")
    )];
    if let Some(db) = body["neo4j"].as_object() {
        for (k, v) in db {
            let v = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
            lines.push(format!("  {}: {}", k, v));
        }
    }
    if let Some(err) = body["error"].as_str() {
        lines.push(format!("Error:         {}", err));
    }
    lines
}

async fn do_status(server: &str) -> anyhow::Result<()> {
    let client = http_client(10)?;
    let url = format!("{}/health", server);

    let resp = match client.get(&url).send().await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("agentverse-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let healthy = resp.status().is_success();
    let body: Value = resp.json().await.unwrap_or_default();
    for line in format_status(&body) {
        println!("{}", line);
    }
    if !healthy {
        std::process::exit(1);
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // stdout carries command output; logs go to stderr
    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let server = cli.server.trim_end_matches('/').to_string();
    let config = match AgentverseConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("agentverse-cli: failed to load config from {}: {}", cli.config, e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Generate { prompt } => do_generate(&config, &prompt).await,
        Commands::Extract {
            notes,
            transcript,
            push,
            output,
        } => {
            do_extract(
                &config,
                &notes,
                &transcript,
                push.as_deref(),
                output.as_deref(),
            )
            .await
        }
        Commands::Status => do_status(&server).await,
    };

    if let Err(e) = result {
        eprintln!("agentverse-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use agentverse_core::GraphNode;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_payload() -> GraphPayload {
        GraphPayload {
            nodes: vec![GraphNode {
                id: "1".to_string(),
                label: "Person".to_string(),
                properties: json!({"name": "John"}).as_object().unwrap().clone(),
            }],
            relationships: vec![],
        }
    }

    // ========================================================================
    // TEST 1: healthy status lists database fields
    // ========================================================================
    #[test]
    fn test_format_status_healthy() {
        let lines = format_status(&json!({
            "status": "healthy",
            "neo4j": {"status": "connected"}
        }));
        assert_eq!(lines[0], "Graph gateway: healthy");
        assert_eq!(lines[1], "  status: connected");
    }

    // ========================================================================
    // TEST 2: unhealthy status surfaces the error
    // ========================================================================
    #[test]
    fn test_format_status_unhealthy() {
        let lines = format_status(&json!({"status": "unhealthy", "error": "connection refused"}));
        assert_eq!(lines[0], "Graph gateway: unhealthy");
        assert!(lines.last().unwrap().contains("connection refused"));
    }

    // ========================================================================
    // TEST 3: missing fields degrade to "unknown"
    // ========================================================================
    #[test]
    fn test_format_status_empty_body() {
        assert_eq!(format_status(&Value::Null), vec!["Graph gateway: unknown"]);
    }

    // ========================================================================
    // TEST 4: push posts the payload and parses the summary
    // ========================================================================
    #[tokio::test]
    async fn test_push_graph_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push"))
            .and(body_partial_json(json!({"nodes": [{"id": "1", "label": "Person"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success", "nodes_created": 1, "relationships_created": 0
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = http_client(5).unwrap();
        let url = format!("{}/", server.uri());
        let summary = push_graph(&client, &url, &sample_payload()).await.unwrap();
        assert_eq!(summary, PushSummary::success(&sample_payload()));
    }

    // ========================================================================
    // TEST 5: gateway validation errors are reported, not parsed as success
    // ========================================================================
    #[tokio::test]
    async fn test_push_graph_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "Missing 'nodes' field in JSON", "status": "error"
            })))
            .mount(&server)
            .await;

        let client = http_client(5).unwrap();
        let err = push_graph(&client, &server.uri(), &sample_payload())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Missing 'nodes' field"));
    }

    // ========================================================================
    // TEST 6: unreadable input names the file
    // ========================================================================
    #[test]
    fn test_read_input_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("notes.txt");
        let err = read_input(&missing).unwrap_err();
        assert!(err.to_string().contains("notes.txt"));
    }
}

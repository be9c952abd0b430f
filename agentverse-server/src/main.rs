use clap::Parser;
use agentverse_core::AgentverseConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Agentverse graph API gateway", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "agentverse.toml")]
    config: String,

    /// Check the database connection and exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = match AgentverseConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Connect the graph store
    let store = match agentverse_core::create_store(&config.graph) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to create graph store: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match store.health().await {
            Ok(row) => println!("✅ {} connected: {}", store.name(), serde_json::Value::Object(row)),
            Err(e) => {
                println!("❌ {} connection failed: {}", store.name(), e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    agentverse_server::http::start_http_server(store, config, tx.subscribe()).await?;

    Ok(())
}

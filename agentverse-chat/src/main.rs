use std::sync::Arc;

use agentverse_chat::{ChatService, GoogleOAuthClient, IdentityProvider, SessionStore};
use agentverse_core::{AgentverseConfig, OutputRecord, TextAgent};
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Agentverse chat UI", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "agentverse.toml")]
    config: String,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let mut config = match AgentverseConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };
    if let Some(port) = args.port {
        config.chat.port = port;
    }

    let generator = agentverse_core::create_generator(&config.generation)?;
    let agent = TextAgent::new(
        generator,
        OutputRecord::new(&config.generation.output_path),
    );

    // The page still renders without OAuth; sign-in reports the problem.
    let identity: Option<Arc<dyn IdentityProvider>> = match GoogleOAuthClient::new(&config.oauth) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "Sign-in disabled");
            None
        }
    };

    let service = ChatService::new(
        SessionStore::from_minutes(config.chat.session_ttl_minutes),
        agent,
        identity,
    );

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

    agentverse_chat::http::start_chat_server(service, config, tx.subscribe()).await?;

    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use rxgate_core::provider::PredictionProvider;
use rxgate_model::{remote, RemoteModelProvider, ResilientProvider, RuleBasedProvider};
use rxgate_server::ServerConfig;
use rxgate_store::Database;

/// Prescription-suggestion service: WebSocket front end, pluggable
/// prediction provider, SQLite persistence.
#[derive(Parser, Debug)]
#[command(name = "rxgate", version)]
struct Args {
    /// Interface to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8765)]
    port: u16,

    /// SQLite database path.
    #[arg(long, default_value = "rxgate.db")]
    db_path: PathBuf,

    /// Remote inference endpoint. When absent, the rule engine serves
    /// predictions instead.
    #[arg(long)]
    model_endpoint: Option<String>,

    /// Deadline for provider calls, in seconds.
    #[arg(long, default_value_t = 30)]
    provider_deadline_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    tracing::info!("starting rxgate server");

    let db = Database::open(&args.db_path).context("failed to open database")?;

    let deadline = Duration::from_secs(args.provider_deadline_secs);
    let provider: Arc<dyn PredictionProvider> = match &args.model_endpoint {
        Some(endpoint) => {
            let token = std::env::var(remote::TOKEN_ENV).ok();
            tracing::info!(endpoint = %endpoint, authenticated = token.is_some(), "using remote model provider");
            Arc::new(ResilientProvider::new(
                RemoteModelProvider::new(endpoint.clone(), token),
                deadline,
            ))
        }
        None => {
            tracing::info!("using rule-based provider");
            Arc::new(ResilientProvider::new(RuleBasedProvider::new(), deadline))
        }
    };

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        ..Default::default()
    };
    let handle = rxgate_server::start(config, db, provider)
        .await
        .context("failed to start server")?;

    tracing::info!(addr = %handle.addr(), "rxgate ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    handle.shutdown();
    tracing::info!("shutting down");
    Ok(())
}

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use njvox_core::config::NjvoxConfig;
use njvox_core::secrets::{NullBackend, Secrets};
use tracing::{info, warn};

mod app;
mod auth;
mod error;
mod http;
mod providers;
mod repl;
mod ws;

#[derive(Parser)]
#[command(name = "njvox-gateway", about = "NJ Vox analytics assistant gateway")]
struct Cli {
    /// Path to a TOML config file. Falls back to NJVOX_CONFIG, then defaults.
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP/WS gateway (default).
    Serve,
    /// Run the dev-only text REPL against the same orchestrator.
    Repl {
        #[arg(long, default_value = "dev-user")]
        user_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "njvox_gateway=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(|| std::env::var("NJVOX_CONFIG").ok());
    let config = NjvoxConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        NjvoxConfig::default()
    });

    let secrets = Arc::new(Secrets::new(Arc::new(NullBackend)));
    let state = Arc::new(app::AppState::new(config.clone(), secrets)?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, state).await,
        Command::Repl { user_id } => repl::run(state, user_id).await,
    }
}

async fn serve(config: NjvoxConfig, state: Arc<app::AppState>) -> anyhow::Result<()> {
    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("njvox gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use flowengine_core::config::EngineConfig;

#[derive(Parser, Debug)]
#[command(name = "flowengine-gateway", about = "Conversational-flow execution gateway")]
struct Args {
    /// Path to flowengine.toml. Defaults to FLOWENGINE_CONFIG, then
    /// ~/.flowengine/flowengine.toml.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = args.config.or_else(|| std::env::var("FLOWENGINE_CONFIG").ok());
    let config = EngineConfig::load(config_path.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(format!("flowengine_gateway={}", config.log.level))
        }))
        .init();

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let state = Arc::new(flowengine_gateway::AppState::new(config)?);
    let router = flowengine_gateway::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!(%addr, "flowengine gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install ctrl-c handler");
    }
    info!("shutdown signal received, draining connections");
}

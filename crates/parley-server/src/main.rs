//! Negotiation copilot server: `/negotiate`, `/health` and the `/ws/mcts` event stream.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use clap::Parser;
use parley_oracle::OracleClient;
use parley_server::{AppState, ServerConfig, app, spawn_reaper};
use tracing::info;

#[derive(Parser)]
#[command(name = "parley-server")]
#[command(about = "MCTS negotiation copilot backed by a chat model")]
struct Args {
    /// YAML config file (defaults to the embedded config)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind the server to (overrides the config)
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on (overrides the config)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("parley_server=info".parse()?)
                .add_directive("parley_core=info".parse()?)
                .add_directive("parley_oracle=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::from_yaml_path(path)?,
        None => ServerConfig::from_default_yaml()?,
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let oracle = OracleClient::from_config(config.oracle.clone())?;
    info!(
        model = %config.oracle.model,
        base_url = %config.oracle.base_url,
        iterations = config.search.iterations,
        "oracle ready"
    );

    let state = AppState::new(&config, Arc::new(oracle));
    spawn_reaper(state.clone(), config.sessions.reap_interval());

    let addr: SocketAddr = format!("{}:{}", config.bind, config.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

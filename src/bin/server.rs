//! HTTP API server for natural-language queries over the PMS database

use anyhow::Result;
use clap::Parser;
use pms_agentic::config::{init_tracing, Settings};
use pms_agentic::server::{serve, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "PMS Agentic AI HTTP API")]
struct Args {
    /// Bind host (overrides SERVER_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides SERVER_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Schema dump with CREATE TABLE statements (overrides SCHEMA_FILE)
    #[arg(long)]
    schema_file: Option<PathBuf>,

    /// permissive or strict (overrides CROSS_CHECK_MODE)
    #[arg(long)]
    cross_check: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing("info");

    let args = Args::parse();
    let mut settings = Settings::from_env()?.with_overrides(args.schema_file, args.cross_check.as_deref())?;
    if let Some(host) = args.host {
        settings.server_host = host;
    }
    if let Some(port) = args.port {
        settings.server_port = port;
    }

    let address = settings.bind_address();
    let state = Arc::new(AppState::build(settings).await);
    let listener = TcpListener::bind(&address).await?;
    info!("API available at http://{}{}", address, state.settings.api_prefix);

    serve(listener, state).await?;
    Ok(())
}

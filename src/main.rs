use anyhow::Result;
use clap::Parser;
use pms_agentic::config::{init_tracing, Settings};
use pms_agentic::models::AgenticQueryRequest;
use pms_agentic::server::AppState;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "pms-agentic")]
#[command(about = "Run one natural-language question against the PMS database and print the JSON response")]
struct Args {
    /// The question in natural language
    query: String,

    /// Caller role (admin, manager, employee, executive)
    #[arg(short, long)]
    role: Option<String>,

    /// Skip the natural-language explanation
    #[arg(long)]
    no_explanation: bool,

    /// Record the turn in this conversation session
    #[arg(long, conflicts_with = "new_session")]
    session: Option<String>,

    /// Record the turn in a freshly generated session
    #[arg(long)]
    new_session: bool,

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
    init_tracing("warn");

    let args = Args::parse();
    let settings = Settings::from_env()?.with_overrides(args.schema_file, args.cross_check.as_deref())?;

    let mut request = AgenticQueryRequest::new(args.query);
    if let Err(message) = request.normalise(settings.max_query_length) {
        anyhow::bail!(message);
    }
    request.role = args.role;
    request.include_explanation = !args.no_explanation;
    request.session_id = match (args.session, args.new_session) {
        (Some(session), _) => Some(session),
        (None, true) => Some(uuid::Uuid::new_v4().to_string()),
        (None, false) => None,
    };
    if let Some(session) = &request.session_id {
        info!("Recording turn in session {}", session);
    }

    let state = AppState::build(settings).await;
    let response = state.service.process_query(&request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}

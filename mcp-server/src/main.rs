use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use mark_stats::config;
use mark_stats_mcp::connection::conn;
use mark_stats_mcp::mcp_handler::{MCPHandler, stdio};
use mark_stats_mcp::use_cases::{BetUseCase, DrawUseCase, RemoteUseCase, StatsUseCase};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Mark Six stats server on {}", config.database_url);

    let db_conn_arc = Arc::new(conn(&config.database_url)?);

    let handler = MCPHandler::new(
        Arc::new(DrawUseCase::new(Arc::clone(&db_conn_arc))),
        Arc::new(BetUseCase::new(Arc::clone(&db_conn_arc))),
        Arc::new(StatsUseCase::new(Arc::clone(&db_conn_arc))),
        Arc::new(RemoteUseCase::new(Arc::clone(&db_conn_arc), config)),
    );

    let (reader, writer) = stdio();

    handler.serve(reader, writer).await.inspect_err(|e| {
        tracing::error!("serving error: {:?}", e);
    })?;

    Ok(())
}

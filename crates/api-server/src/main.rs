//! API Server Binary Entry Point

use anyhow::Result;
use field_report_api_server::{build_state, start_server, ServerConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "field_report=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Optional YAML config, path from FIELD_REPORT_CONFIG
    let config_path = std::env::var_os("FIELD_REPORT_CONFIG").map(PathBuf::from);
    let config = ServerConfig::load(config_path.as_deref())?;
    let state = build_state(&config).await?;

    tracing::info!("Starting Field Report API Server");
    start_server(&config.addr, state).await?;

    Ok(())
}

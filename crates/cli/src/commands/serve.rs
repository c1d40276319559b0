//! `serve`: run the HTTP API

use anyhow::Result;
use clap::Args;
use field_report_api_server::{build_state, start_server, ServerConfig};
use std::path::PathBuf;

#[derive(Args)]
pub struct ServeCommand {
    /// YAML config file; environment variables override it
    #[arg(short, long, env = "FIELD_REPORT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bind address, overrides the config file
    #[arg(long)]
    pub addr: Option<String>,
}

impl ServeCommand {
    pub async fn execute(self) -> Result<()> {
        let mut config = ServerConfig::load(self.config.as_deref())?;
        if let Some(addr) = self.addr {
            config.addr = addr;
        }
        let state = build_state(&config).await?;
        start_server(&config.addr, state).await?;
        Ok(())
    }
}

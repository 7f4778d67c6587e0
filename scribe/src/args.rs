use std::path::PathBuf;

use clap::Parser;

/// Scribe AI routing service
#[derive(Debug, Parser)]
#[command(name = "scribe", about = "Model routing and dispatch service for the blog platform")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "scribe.toml", env = "SCRIBE_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "SCRIBE_LISTEN")]
    pub listen: Option<std::net::SocketAddr>,

    /// Emit logs as JSON
    #[arg(long, env = "SCRIBE_LOG_JSON")]
    pub log_json: bool,
}

//! CLI commands
//!
//! - `serve`: start the HTTP/WebSocket server (default)
//! - `init`: write a starter `.env` file

use clap::{Parser, Subcommand};
use tracing::info;

/// Maestro orchestrator CLI
#[derive(Parser, Debug)]
#[command(name = "maestro")]
#[command(about = "Multi-agent AI workflow orchestrator")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server (default)
    Serve,
    /// Write a starter .env file
    Init,
}

const ENV_TEMPLATE: &str = "\
# Maestro configuration overrides (MAESTRO_<SECTION>__<KEY>)
MAESTRO_SERVER__HOST=127.0.0.1
MAESTRO_SERVER__PORT=8080
MAESTRO_DATABASE__PATH=data/maestro.db
# MAESTRO_WORKFLOW__BASE_URL=http://localhost:5678
MAESTRO_BUDGET__DAILY_LIMIT_USD=10.0
MAESTRO_BUDGET__MONTHLY_LIMIT_USD=100.0
";

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Init) => {
            if std::path::Path::new(".env").exists() {
                info!(".env already exists, leaving it untouched");
            } else {
                std::fs::write(".env", ENV_TEMPLATE)?;
                info!("Wrote starter .env");
            }
            Ok(())
        }
        Some(Commands::Serve) | None => crate::server::run().await,
    }
}

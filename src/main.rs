mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mnema::{config, server};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mnema", version, about = "Cognitive memory engine for AI agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server
    Serve {
        /// Serve over streamable HTTP instead of stdio
        #[arg(long)]
        http: bool,
    },
    /// Run one salience decay sweep
    Decay,
    /// Run the coactivation queue worker until interrupted
    Worker,
    /// Print store statistics and health
    Stats,
    /// Destroy stored data (dangerous)
    Wipe {
        /// Only wipe this user's memories and facts
        #[arg(long)]
        user: Option<String>,
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = config::MnemaConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { http } => {
            if http || config.server.transport == "http" {
                server::serve_http(config).await?;
            } else {
                server::serve_stdio(config).await?;
            }
        }
        Command::Decay => cli::decay(config).await?,
        Command::Worker => cli::worker(config).await?,
        Command::Stats => cli::stats(config)?,
        Command::Wipe { user, yes } => cli::wipe(config, user, yes).await?,
    }

    Ok(())
}

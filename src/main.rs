use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use engram::{cli, config, server};

#[derive(Parser)]
#[command(name = "engram", version, about = "Knowledge-graph memory MCP server for AI agents")]
struct Cli {
    /// Config file path (default: ~/.engram/config.toml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server
    Serve {
        /// Serve over HTTP/SSE with the web UI instead of stdio
        #[arg(long)]
        http: bool,
    },
    /// Show the running daemon's status
    Status,
    /// Stop the running daemon
    Stop,
    /// Print local database statistics
    Stats,
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to the cache directory
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::EngramConfig::load_from(path)?,
        None => config::EngramConfig::load()?,
    };

    // Log to stderr (or the configured file) so stdout stays clean for
    // MCP JSON-RPC on the stdio transport.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match &config.server.log_file {
        Some(path) => {
            let path = config::expand_tilde(path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(move || file.try_clone().expect("log file clone"))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }

    match cli.command {
        Command::Serve { http } => {
            if http {
                server::serve_http(config).await?;
            } else {
                server::serve_stdio(config).await?;
            }
        }
        Command::Status => cli::status().await?,
        Command::Stop => cli::stop().await?,
        Command::Stats => cli::stats(&config)?,
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
    }

    Ok(())
}

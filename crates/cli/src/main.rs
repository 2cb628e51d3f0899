//! medctx CLI: the main entry point.
//!
//! Commands:
//! - `init`      write a default config
//! - `status`    show config and store health
//! - `serve`     start the HTTP gateway
//! - `context`   aggregate context for one query and print it as JSON
//! - `classify`  classify a query
//! - `insights`  summarize one patient's history

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "medctx",
    about = "medctx: context aggregation for telemedicine assistants",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.medctx/config.toml
    #[arg(short, long, global = true, env = "MEDCTX_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Show configuration and store health
    Status,

    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Aggregate context for a query and print it as JSON
    Context {
        #[arg(short, long)]
        subject: String,

        #[arg(short, long)]
        query: String,

        #[arg(long)]
        conversation: Option<String>,

        /// Only run these contributors (comma separated)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,

        /// Override the token budget
        #[arg(short, long)]
        budget: Option<usize>,
    },

    /// Classify a query into a service type
    Classify { query: String },

    /// Summarize a patient's history
    Insights { subject: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays machine-readable.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Init { force } => commands::init::run(config_path, force)?,
        Commands::Status => commands::status::run(config_path).await?,
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Context {
            subject,
            query,
            conversation,
            only,
            budget,
        } => {
            let args = commands::context::ContextArgs {
                subject,
                query,
                conversation,
                only,
                budget,
            };
            commands::context::run(config_path, args).await?
        }
        Commands::Classify { query } => commands::classify::run(config_path, &query).await?,
        Commands::Insights { subject } => commands::insights::run(config_path, &subject).await?,
    }

    Ok(())
}

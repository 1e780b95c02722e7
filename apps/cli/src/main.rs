//! gemlink CLI - command-line client for the gemlink orchestrator
//!
//! Sends prompts to Gemini through the multi-model orchestrator, which picks a
//! model, retries on rate limits and falls back across models.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use config::CliConfig;
use gemlink_models::{DEFAULT_BASE_URL, GeminiClient};
use gemlink_orchestrator::Orchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, debug};
use tracing_subscriber::FmtSubscriber;

/// gemlink - multi-model Gemini client with retry and fallback
#[derive(Parser, Debug)]
#[command(
    name = "gemlink",
    author,
    version,
    about = "gemlink - multi-model Gemini client with retry and fallback"
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// API key (overrides GEMINI_API_KEY, GOOGLE_AI_API_KEY and the config file)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// API base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a single prompt and print the answer
    Ask {
        /// The prompt
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,

        /// Ask for an image instead of text
        #[arg(long)]
        image: bool,

        /// Write the result to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Interactive prompt loop
    Chat,

    /// List the models a request would try, in order
    Models {
        /// Show candidates for image requests
        #[arg(long)]
        image: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_level(level: &str) -> Level {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let cli_config = CliConfig::discover_and_load()?;

    // Initialize tracing
    let level = parse_level(args.log_level.as_deref().or(cli_config.log_level.as_deref()).unwrap_or("warn"));
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let credentials =
        config::resolve_credentials(args.api_key.as_deref(), &cli_config, |var| std::env::var(var).ok());
    let base_url = args
        .base_url
        .or_else(|| cli_config.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    debug!(base_url = %base_url, credentials = ?credentials, "Configuration loaded");

    let backend = Arc::new(GeminiClient::with_base_url(base_url));
    let orchestrator = Orchestrator::new(backend, cli_config.orchestrator.unwrap_or_default())?;

    match args.command {
        Command::Ask { prompt, image, output } => {
            commands::ask::execute(&orchestrator, &credentials, prompt.join(" "), image, output).await?;
        }
        Command::Chat => {
            commands::chat::execute(&orchestrator, &credentials).await?;
        }
        Command::Models { image, json } => {
            commands::models::execute(&orchestrator, &credentials, image, json).await?;
        }
    }

    Ok(())
}

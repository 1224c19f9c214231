//! toolstream CLI — the main entry point.
//!
//! Commands:
//! - `extract` — Stream text through the tool-call extractor
//! - `replay`  — Run the agent loop against a scripted model
//! - `prompt`  — Print the system prompt the model would receive
//! - `config`  — Show, locate or validate the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use toolstream_config::{AppConfig, LoggingConfig};

mod commands;

#[derive(Parser)]
#[command(
    name = "toolstream",
    about = "toolstream — streaming tool calls and a bounded agent loop",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.toolstream/config.toml
    #[arg(long, global = true, env = "TOOLSTREAM_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract tool calls from model output (a file, or stdin)
    Extract {
        /// Read from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Characters per simulated stream delta
        #[arg(short, long, default_value_t = 16)]
        chunk_size: usize,

        /// Print a JSON report instead of plain text
        #[arg(long)]
        json: bool,
    },

    /// Run the agent loop with scripted model responses and dry-run tools
    Replay {
        /// JSON array of responses, one per model call
        script: PathBuf,

        /// The question to answer
        #[arg(short, long)]
        question: String,

        /// Override agent.max_iterations
        #[arg(long)]
        max_iterations: Option<usize>,
    },

    /// Print the system prompt, tool instructions included
    Prompt,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Validate the config file
    Validate,
}

fn init_tracing(verbose: bool, logging: &LoggingConfig) {
    let filter = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    // stdout carries command output; logs go to stderr
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logging settings come from the config file when it is readable
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::config_path);
    let config = AppConfig::load_with_env(&config_path);
    let logging = config.as_ref().map(|c| c.logging.clone()).unwrap_or_default();
    init_tracing(cli.verbose, &logging);

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config?)?,
            ConfigAction::Path => commands::config_cmd::path(&config_path),
            ConfigAction::Validate => commands::config_cmd::validate(config)?,
        },
        Commands::Extract {
            file,
            chunk_size,
            json,
        } => commands::extract::run(config?, file, chunk_size, json).await?,
        Commands::Replay {
            script,
            question,
            max_iterations,
        } => commands::replay::run(config?, script, question, max_iterations).await?,
        Commands::Prompt => commands::prompt::run(&config?),
    }

    Ok(())
}

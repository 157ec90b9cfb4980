//! monologue CLI: the main entry point.
//!
//! Commands:
//! - `chat`    Interactive session with an agent chain, or one message with `-m`
//! - `config`  Show or initialize configuration

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use monologue_config::{AppConfig, LoggingConfig};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "monologue", about = "Monologue agent engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.monologue/config.toml
    #[arg(long, global = true, env = "MONOLOGUE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with an agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));

    // `config init` must work even when the existing file is broken
    if let Commands::Config {
        action: ConfigAction::Init { force },
    } = &cli.command
    {
        init_tracing(&LoggingConfig::default(), cli.verbose);
        return commands::config_cmd::init(&config_path, *force);
    }
    if let Commands::Config {
        action: ConfigAction::Path,
    } = &cli.command
    {
        println!("{}", config_path.display());
        return Ok(());
    }

    let mut config = AppConfig::load_from(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config.apply_env();
    init_tracing(&config.logging, cli.verbose);

    match cli.command {
        Commands::Chat { message } => commands::chat::run(config, message).await?,
        Commands::Config { .. } => commands::config_cmd::show(&config)?,
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // logs go to stderr so they don't interleave with answers on stdout
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

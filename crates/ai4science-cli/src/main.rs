//! AI4Science CLI - sign in through the browser and manage the stored session.

mod browser;
mod commands;
mod context;
mod output;
mod user_cache;

use std::path::PathBuf;

use app_config_and_utils::{init_logging, Config, Paths};
use clap::{Parser, Subcommand};
use context::AuthContext;
use tracing::debug;

/// AI4Science command-line interface.
#[derive(Parser)]
#[command(name = "ai4science")]
#[command(about = "AI4Science CLI for authentication")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, logs and caches. Defaults to ~/.ai4science
    #[arg(long, global = true, env = "AI4SCIENCE_HOME")]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in through the browser
    Login,

    /// Sign out and clear stored credentials
    Logout,

    /// Check authentication status
    Status,

    /// Complete sign-in from a callback URL delivered by the OS
    HandleUrl {
        /// The ai4science://auth/callback URL
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging("ai4science-cli", level, &paths, false);
    debug!(base_dir = %paths.base_dir().display(), "Loaded configuration");

    let ctx = AuthContext::new(config, paths)?;

    match cli.command {
        Commands::Login => commands::login(&ctx, &cli.format).await,
        Commands::Logout => commands::logout(&ctx, &cli.format).await,
        Commands::Status => commands::status(&ctx, &cli.format).await,
        Commands::HandleUrl { url } => commands::handle_url(&ctx, &url, &cli.format).await,
    }
}

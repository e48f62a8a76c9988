use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::{
    ApplyCommand, ConfigCommand, FlushCommand, PullCommand, StatusCommand, WatchCommand,
};
use config::Config;

#[derive(Parser)]
#[command(name = "statsync")]
#[command(version)]
#[command(about = "Offline-first sync for gamification stats", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a stats change locally and push it
    Apply(ApplyCommand),

    /// Fetch the server snapshot and merge it
    Pull(PullCommand),

    /// Push all pending changes now
    Flush(FlushCommand),

    /// Show local stats, pending changes and server status
    Status(StatusCommand),

    /// Stay connected and print every stats change
    Watch(WatchCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "statsync=info,statsync_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Apply(cmd)) => cmd.run(&config).await?,
        Some(Commands::Pull(cmd)) => cmd.run(&config).await?,
        Some(Commands::Flush(cmd)) => cmd.run(&config).await?,
        Some(Commands::Status(cmd)) => cmd.run(&config).await?,
        Some(Commands::Watch(cmd)) => cmd.run(&config).await?,
        Some(Commands::Config(cmd)) => cmd.run(&config)?,
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

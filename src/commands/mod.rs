//! CLI subcommands. Each opens the engine over the local data directory,
//! runs one operation and shuts it down again.

mod apply;
mod config_cmd;
mod flush;
mod pull;
mod status;
mod watch;

pub use apply::ApplyCommand;
pub use config_cmd::ConfigCommand;
pub use flush::FlushCommand;
pub use pull::PullCommand;
pub use status::StatusCommand;
pub use watch::WatchCommand;

use std::sync::Arc;

use statsync_core::{
    Engine, EngineConfig, FileStore, FlushReport, HttpStatsApi, StaticToken, SyncError,
    UserStatsSnapshot,
};

use crate::config::{Config, ConfigError};

/// Opens the engine for the configured user.
///
/// Without a token the engine starts offline and changes wait in the
/// queue for a run that has one.
pub fn open_engine(config: &Config, engine_config: EngineConfig) -> Result<Engine, CommandError> {
    let user_id = config.require_user()?;
    let token = config.token.value.clone();
    let online = engine_config.start_online && token.is_some();

    let api = HttpStatsApi::new(
        config.server_url.value.clone(),
        Arc::new(StaticToken(token.unwrap_or_default())),
    );
    let storage = FileStore::new(config.data_dir.value.clone());

    let engine = Engine::init(
        user_id,
        engine_config.with_start_online(online),
        Arc::new(api),
        Arc::new(storage),
    )?;
    Ok(engine)
}

/// Engine settings for one-shot commands: no background pulls.
pub fn one_shot_config(config: &Config) -> EngineConfig {
    config.sync.engine_config().with_pull_interval(None)
}

pub fn print_snapshot(snapshot: &UserStatsSnapshot) {
    println!("XP:          {}", snapshot.xp);
    println!("Level:       {}", snapshot.level);
    println!("Diamonds:    {}", snapshot.diamonds);
    println!("Hearts:      {}/{}", snapshot.hearts, snapshot.max_hearts);
    println!(
        "Streak:      {} (best {})",
        snapshot.streak, snapshot.max_streak
    );
    println!(
        "Answers:     {} correct, {} wrong, {} completed",
        snapshot.correct_answers, snapshot.wrong_answers, snapshot.completed_questions
    );
    if let Some(accuracy) = snapshot.accuracy {
        println!("Accuracy:    {:.1}%", accuracy);
    }
    match snapshot.updated_at {
        Some(at) => println!("Updated:     {}", at.to_rfc3339()),
        None => println!("Updated:     never"),
    }
}

pub fn print_report(report: &FlushReport) {
    if report.already_running {
        println!("A push is already in progress.");
        return;
    }
    println!(
        "Pushed {}, dropped {}, {} still pending{}",
        report.pushed,
        report.dropped,
        report.remaining,
        if report.retries > 0 {
            format!(" ({} retries)", report.retries)
        } else {
            String::new()
        }
    );
}

/// Errors from CLI commands
#[derive(Debug)]
pub enum CommandError {
    Config(ConfigError),
    Sync(SyncError),
    InvalidInput(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Config(e) => write!(f, "{}", e),
            CommandError::Sync(e) => write!(f, "{}", e),
            CommandError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Config(e) => Some(e),
            CommandError::Sync(e) => Some(e),
            CommandError::InvalidInput(_) => None,
        }
    }
}

impl From<ConfigError> for CommandError {
    fn from(e: ConfigError) -> Self {
        CommandError::Config(e)
    }
}

impl From<SyncError> for CommandError {
    fn from(e: SyncError) -> Self {
        CommandError::Sync(e)
    }
}

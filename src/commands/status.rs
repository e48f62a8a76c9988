use clap::Args;
use statsync_core::check_server;

use super::{one_shot_config, open_engine, print_snapshot, CommandError};
use crate::config::Config;

/// Show local stats, pending changes and server status
#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CommandError> {
        let user_id = config.require_user()?;

        println!("Sync Status");
        println!("===========");
        println!();
        println!("User:      {}", user_id);
        println!("Server:    {}", config.server_url.value);
        match &config.token.value {
            Some(token) => println!("Token:     {}...", token.chars().take(8).collect::<String>()),
            None => println!("Token:     not set (STATSYNC_TOKEN)"),
        }
        println!("Data dir:  {}", config.data_dir.value.display());

        print!("Server:    ");
        if check_server(&config.server_url.value).await {
            println!("✓ reachable");
        } else {
            println!("✗ unreachable");
        }
        println!();

        // Offline so opening the engine never pushes recovered jobs.
        let engine = open_engine(config, one_shot_config(config).with_start_online(false))?;
        print_snapshot(&engine.snapshot());
        println!();
        println!("Pending changes: {}", engine.pending_jobs());

        engine.destroy();
        Ok(())
    }
}

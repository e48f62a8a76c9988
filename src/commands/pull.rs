use clap::Args;
use statsync_core::PullOutcome;

use super::{one_shot_config, open_engine, print_snapshot, CommandError};
use crate::config::Config;

/// Fetch the server snapshot and merge it
#[derive(Debug, Args)]
pub struct PullCommand {}

impl PullCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CommandError> {
        config.require_token()?;
        let engine = open_engine(config, one_shot_config(config))?;

        match engine.force_pull().await {
            PullOutcome::Applied(snapshot) => {
                println!("Server snapshot is newer; local stats updated.");
                println!();
                print_snapshot(&snapshot);
            }
            PullOutcome::KeptLocal => {
                println!("Local stats are up to date.");
            }
            PullOutcome::Failed => {
                println!("Pull failed; local stats unchanged. Run with RUST_LOG=statsync=debug for details.");
            }
        }

        engine.destroy();
        Ok(())
    }
}

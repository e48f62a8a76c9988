use clap::Args;

use super::{one_shot_config, open_engine, print_report, CommandError};
use crate::config::Config;

/// Push all pending changes now
#[derive(Debug, Args)]
pub struct FlushCommand {}

impl FlushCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CommandError> {
        config.require_token()?;
        let engine = open_engine(config, one_shot_config(config))?;

        if engine.pending_jobs() == 0 {
            println!("Nothing to push.");
        } else {
            print_report(&engine.flush_queue().await);
        }

        engine.destroy();
        Ok(())
    }
}

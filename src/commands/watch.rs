use clap::Args;
use statsync_core::RealtimeCredentials;

use super::{open_engine, CommandError};
use crate::config::Config;

/// Stay connected and print every stats change
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Skip the realtime channel and rely on periodic pulls
    #[arg(long)]
    no_realtime: bool,
}

impl WatchCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CommandError> {
        let token = config.require_token()?.to_string();
        let user_id = config.require_user()?.to_string();
        let engine = open_engine(config, config.sync.engine_config())?;

        let _subscription = engine.subscribe(|snapshot| {
            println!(
                "xp={} level={} diamonds={} hearts={}/{} streak={}",
                snapshot.xp,
                snapshot.level,
                snapshot.diamonds,
                snapshot.hearts,
                snapshot.max_hearts,
                snapshot.streak
            );
        });

        if !self.no_realtime {
            engine.connect_realtime(RealtimeCredentials::new(
                config.server_url.value.clone(),
                user_id,
                token,
            ));
        }

        tracing::info!("Watching stats, press Ctrl-C to stop");
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }

        let report = engine.flush_queue().await;
        if report.remaining > 0 {
            println!("{} change(s) still pending.", report.remaining);
        }

        engine.destroy();
        Ok(())
    }
}

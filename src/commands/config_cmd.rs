use clap::{Args, Subcommand, ValueEnum};

use crate::config::Config;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("server_url: {}", config.server_url.value);
                        println!("  source: {}", config.server_url.source);
                        println!();

                        println!(
                            "user_id: {}",
                            config.user_id.value.as_deref().unwrap_or("(not set)")
                        );
                        println!("  source: {}", config.user_id.source);
                        println!();

                        let token = match &config.token.value {
                            Some(t) => format!("{}...", t.chars().take(8).collect::<String>()),
                            None => "(not set)".to_string(),
                        };
                        println!("token: {}", token);
                        println!("  source: {}", config.token.source);
                        println!();

                        println!("data_dir: {}", config.data_dir.value.display());
                        println!("  source: {}", config.data_dir.source);
                        println!();

                        let engine = config.sync.engine_config();
                        println!("sync:");
                        println!("  debounce: {:?}", engine.debounce);
                        println!("  throttle: {:?}", engine.throttle);
                        println!("  timeout: {:?}", engine.push_timeout);
                        println!(
                            "  backoff: {:?} .. {:?}",
                            engine.backoff_base, engine.backoff_max
                        );
                        match engine.max_retries_per_flush {
                            Some(n) => println!("  max_retries: {}", n),
                            None => println!("  max_retries: unlimited"),
                        }
                        match engine.pull_interval {
                            Some(interval) => println!("  pull_interval: {:?}", interval),
                            None => println!("  pull_interval: disabled"),
                        }
                        println!("  heartbeat: {:?}", engine.realtime.heartbeat);
                    }
                }
                Ok(())
            }
        }
    }
}

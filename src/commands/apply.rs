use clap::Args;
use statsync_core::StatsDelta;

use super::{one_shot_config, open_engine, print_report, print_snapshot, CommandError};
use crate::config::Config;

/// Apply a stats change locally and push it
#[derive(Debug, Args)]
pub struct ApplyCommand {
    /// XP to add (negative to remove)
    #[arg(long, allow_hyphen_values = true)]
    xp: Option<i64>,

    /// Diamonds to add
    #[arg(long, allow_hyphen_values = true)]
    diamonds: Option<i64>,

    /// Hearts to add
    #[arg(long, allow_hyphen_values = true)]
    hearts: Option<i64>,

    /// Heart slots to add
    #[arg(long, allow_hyphen_values = true)]
    max_hearts: Option<i64>,

    /// Levels to add
    #[arg(long, allow_hyphen_values = true)]
    level: Option<i64>,

    /// Streak days to add
    #[arg(long, allow_hyphen_values = true)]
    streak: Option<i64>,

    /// Correct answers to add
    #[arg(long, allow_hyphen_values = true)]
    correct: Option<i64>,

    /// Wrong answers to add
    #[arg(long, allow_hyphen_values = true)]
    wrong: Option<i64>,

    /// Completed questions to add
    #[arg(long, allow_hyphen_values = true)]
    completed: Option<i64>,

    /// Replace accuracy (percent)
    #[arg(long)]
    accuracy: Option<f64>,

    /// Replace last game results (JSON)
    #[arg(long)]
    results: Option<String>,

    /// Only record locally; leave the change queued
    #[arg(long)]
    offline: bool,
}

impl ApplyCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CommandError> {
        let delta = self.delta()?;
        if delta.is_empty() {
            return Err(CommandError::InvalidInput(
                "no changes given, see --help".to_string(),
            ));
        }

        let engine_config = one_shot_config(config).with_start_online(!self.offline);
        let engine = open_engine(config, engine_config)?;

        let snapshot = engine.apply_delta(&delta);
        print_snapshot(&snapshot);
        println!();

        if engine.is_online() {
            print_report(&engine.flush_queue().await);
        } else {
            println!(
                "Saved locally; {} change(s) pending.",
                engine.pending_jobs()
            );
        }

        engine.destroy();
        Ok(())
    }

    fn delta(&self) -> Result<StatsDelta, CommandError> {
        let last_game_results = self
            .results
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| CommandError::InvalidInput(format!("--results: {}", e)))?;

        Ok(StatsDelta {
            xp: self.xp,
            diamonds: self.diamonds,
            hearts: self.hearts,
            max_hearts: self.max_hearts,
            level: self.level,
            streak: self.streak,
            max_streak: None,
            accuracy: self.accuracy,
            completed_questions: self.completed,
            correct_answers: self.correct,
            wrong_answers: self.wrong,
            last_game_results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        apply: ApplyCommand,
    }

    fn parse(args: &[&str]) -> ApplyCommand {
        let mut argv = vec!["statsync"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().apply
    }

    #[test]
    fn test_negative_counter_deltas() {
        let delta = parse(&[
            "--xp", "-5", "--correct", "-1", "--wrong", "-2", "--completed", "-3",
        ])
        .delta()
        .unwrap();

        assert_eq!(delta.xp, Some(-5));
        assert_eq!(delta.correct_answers, Some(-1));
        assert_eq!(delta.wrong_answers, Some(-2));
        assert_eq!(delta.completed_questions, Some(-3));
    }

    #[test]
    fn test_invalid_results_json() {
        let command = parse(&["--results", "{not json"]);
        assert!(matches!(
            command.delta(),
            Err(CommandError::InvalidInput(_))
        ));
    }
}

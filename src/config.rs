use serde::{Deserialize, Serialize};
use statsync_core::{EngineConfig, RealtimeConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Engine timing overrides, all in milliseconds.
///
/// Unset values keep the engine defaults. A `pull_interval_ms` of 0 disables
/// periodic pulls.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TimingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_base_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_max_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_ms: Option<u64>,
}

impl TimingConfig {
    /// Builds the engine configuration, applying any overrides.
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::new();

        if let Some(ms) = self.debounce_ms {
            config = config.with_debounce(Duration::from_millis(ms));
        }
        if let Some(ms) = self.throttle_ms {
            config = config.with_throttle(Duration::from_millis(ms));
        }
        if let Some(ms) = self.timeout_ms {
            config = config.with_timeout(Duration::from_millis(ms));
        }
        if self.backoff_base_ms.is_some() || self.backoff_max_ms.is_some() {
            let base = self
                .backoff_base_ms
                .map(Duration::from_millis)
                .unwrap_or(config.backoff_base);
            let max = self
                .backoff_max_ms
                .map(Duration::from_millis)
                .unwrap_or(config.backoff_max);
            config = config.with_backoff(base, max);
        }
        if let Some(retries) = self.max_retries {
            config = config.with_max_retries_per_flush(Some(retries));
        }
        if let Some(ms) = self.pull_interval_ms {
            let interval = (ms > 0).then(|| Duration::from_millis(ms));
            config = config.with_pull_interval(interval);
        }
        if let Some(ms) = self.heartbeat_ms {
            let realtime = RealtimeConfig {
                heartbeat: Duration::from_millis(ms),
                ..config.realtime.clone()
            };
            config = config.with_realtime(realtime);
        }

        config
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Stats server base URL
    pub server_url: ConfigValue<String>,
    /// Bearer token for the stats endpoints and the realtime channel
    #[serde(skip_serializing)]
    pub token: ConfigValue<Option<String>>,
    /// User whose stats are synced
    pub user_id: ConfigValue<Option<String>>,
    /// Directory holding the local snapshot and pending queue
    pub data_dir: ConfigValue<PathBuf>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Engine timing overrides
    pub sync: TimingConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    server_url: Option<String>,
    token: Option<String>,
    user_id: Option<String>,
    data_dir: Option<PathBuf>,
    sync: Option<TimingConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut server_url = ConfigValue::new(
            "http://localhost:8080".to_string(),
            ConfigSource::Default,
        );
        let mut token = ConfigValue::new(None, ConfigSource::Default);
        let mut user_id = ConfigValue::new(None, ConfigSource::Default);
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut config_file = None;
        let mut sync = TimingConfig::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(url) = file_config.server_url {
                server_url = ConfigValue::new(url, ConfigSource::File);
            }
            if let Some(t) = file_config.token {
                token = ConfigValue::new(Some(t), ConfigSource::File);
            }
            if let Some(user) = file_config.user_id {
                user_id = ConfigValue::new(Some(user), ConfigSource::File);
            }
            if let Some(dir) = file_config.data_dir {
                // Resolve relative paths against config file's directory
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                data_dir = ConfigValue::new(resolved, ConfigSource::File);
            }
            if let Some(timing) = file_config.sync {
                sync = timing;
            }
        }

        if let Ok(url) = std::env::var("STATSYNC_SERVER_URL") {
            server_url = ConfigValue::new(url, ConfigSource::Environment);
        }
        if let Ok(t) = std::env::var("STATSYNC_TOKEN") {
            token = ConfigValue::new(Some(t), ConfigSource::Environment);
        }
        if let Ok(user) = std::env::var("STATSYNC_USER_ID") {
            user_id = ConfigValue::new(Some(user), ConfigSource::Environment);
        }
        if let Ok(dir) = std::env::var("STATSYNC_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }

        Ok(Self {
            server_url,
            token,
            user_id,
            data_dir,
            config_file,
            sync,
        })
    }

    /// Returns the configured user, or an error naming how to set it.
    pub fn require_user(&self) -> Result<&str, ConfigError> {
        self.user_id
            .value
            .as_deref()
            .ok_or(ConfigError::Missing("user_id", "STATSYNC_USER_ID"))
    }

    /// Returns the configured token, or an error naming how to set it.
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.token
            .value
            .as_deref()
            .ok_or(ConfigError::Missing("token", "STATSYNC_TOKEN"))
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/statsync/
    /// - macOS: ~/Library/Application Support/statsync/
    /// - Windows: %APPDATA%/statsync/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("statsync")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/statsync/
    /// - macOS: ~/Library/Application Support/statsync/
    /// - Windows: %APPDATA%/statsync/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("statsync")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    /// A required value is unset: (config key, environment variable)
    Missing(&'static str, &'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Missing(key, env) => {
                write!(
                    f,
                    "No {} configured. Set '{}' in the config file or {}",
                    key, key, env
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path)).unwrap();
        assert!(config.data_dir.value.ends_with("statsync"));
        assert_eq!(config.data_dir.source, ConfigSource::Default);
        assert_eq!(config.server_url.value, "http://localhost:8080");
        assert_eq!(config.server_url.source, ConfigSource::Default);
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "server_url: https://stats.example.com").unwrap();
        writeln!(file, "token: abc123").unwrap();
        writeln!(file, "user_id: learner-7").unwrap();
        writeln!(file, "data_dir: /custom/statsync").unwrap();

        let config = Config::load(Some(config_path.clone())).unwrap();
        assert_eq!(config.server_url.value, "https://stats.example.com");
        assert_eq!(config.server_url.source, ConfigSource::File);
        assert_eq!(config.require_token().unwrap(), "abc123");
        assert_eq!(config.require_user().unwrap(), "learner-7");
        assert_eq!(config.data_dir.value, PathBuf::from("/custom/statsync"));
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_relative_data_dir_resolves_against_config_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "data_dir: state").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.data_dir.value, temp_dir.path().join("state"));
    }

    #[test]
    #[ignore] // Run with --ignored; env vars can pollute parallel tests
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "user_id: fromfile").unwrap();

        std::env::set_var("STATSYNC_USER_ID", "fromenv");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.user_id.value.as_deref(), Some("fromenv"));
        assert_eq!(config.user_id.source, ConfigSource::Environment);

        std::env::remove_var("STATSYNC_USER_ID");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(Some(config_path));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_missing_user_error() {
        let temp_dir = tempdir().unwrap();
        let config = Config::load(Some(temp_dir.path().join("none.yaml"))).unwrap();

        let err = config.require_user().unwrap_err();
        assert!(err.to_string().contains("STATSYNC_USER_ID"));
    }

    #[test]
    fn test_timing_overrides() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "sync:").unwrap();
        writeln!(file, "  debounce_ms: 50").unwrap();
        writeln!(file, "  backoff_max_ms: 2000").unwrap();
        writeln!(file, "  pull_interval_ms: 0").unwrap();
        writeln!(file, "  heartbeat_ms: 5000").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        let engine = config.sync.engine_config();
        assert_eq!(engine.debounce, Duration::from_millis(50));
        assert_eq!(engine.throttle, Duration::from_millis(600));
        assert_eq!(engine.backoff_base, Duration::from_millis(400));
        assert_eq!(engine.backoff_max, Duration::from_millis(2000));
        assert!(engine.pull_interval.is_none());
        assert_eq!(engine.realtime.heartbeat, Duration::from_secs(5));
    }
}

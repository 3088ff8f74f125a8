//! # CLI Configuration
//!
//! Configuration is layered, lowest priority first:
//!
//! 1. Programmatic defaults.
//! 2. An optional YAML file (`config.yml` or the `--config` path). `${VAR}`
//!    placeholders are substituted from the environment before parsing.
//! 3. `NARRATIVELENS_*` environment variables, with `__` separating nested
//!    keys (e.g. `NARRATIVELENS_RETRY__DELAY_SECS=1`).
//!
//! The API key falls back to `GOOGLE_API_KEY` when not configured.

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use narrativelens::providers::ai::gemini::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    General(#[from] config::ConfigError),
    #[error("Config file not found at '{0}'")]
    NotFound(String),
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("No API key configured. Set GOOGLE_API_KEY or `api_key` in the config file.")]
    MissingApiKey,
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            delay_secs: default_retry_delay_secs(),
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepairConfig {
    #[serde(default = "default_repair_attempts")]
    pub max_attempts: u32,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_repair_attempts(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TaskConfig {
    #[serde(default)]
    pub prompt_path: Option<String>,
}

/// The root configuration structure, mapping directly to `config.yml`.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Root URL of the Gemini API.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Path to the SQLite feature store.
    #[serde(default = "default_db_url")]
    pub db_url: String,
    /// Directory holding the production assets. Dry and test runs read the
    /// sibling `<asset_root>_dry` and `<asset_root>_test` directories.
    #[serde(default = "default_asset_root")]
    pub asset_root: String,
    #[serde(default = "default_asset_extensions")]
    pub asset_extensions: Vec<String>,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub repair: RepairConfig,
    #[serde(default)]
    pub tasks: HashMap<String, TaskConfig>,
}

fn default_api_url() -> String {
    DEFAULT_GEMINI_BASE_URL.to_string()
}
fn default_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}
fn default_db_url() -> String {
    "db/narrativelens.db".to_string()
}
fn default_asset_root() -> String {
    "data/video_ads".to_string()
}
fn default_asset_extensions() -> Vec<String> {
    vec!["mp4".to_string()]
}
fn default_log_file() -> String {
    "narrativelens.log".to_string()
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_secs() -> u64 {
    5
}
fn default_repair_attempts() -> u32 {
    3
}

impl AppConfig {
    /// The API key from the config, or from `GOOGLE_API_KEY`.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| env::var("GOOGLE_API_KEY").ok().filter(|k| !k.trim().is_empty()))
            .ok_or(ConfigError::MissingApiKey)
    }

    /// The prompt file for a task.
    pub fn prompt_path(&self, task: &str) -> String {
        self.tasks
            .get(task)
            .and_then(|t| t.prompt_path.clone())
            .unwrap_or_else(|| match task {
                "features" => "prompts/feature_extractor_prompt.txt".to_string(),
                "ugc" => "prompts/is_ugc_prompt.txt".to_string(),
                other => format!("prompts/{other}_prompt.txt"),
            })
    }

    /// Reads the prompt file for a task.
    pub fn load_prompt(&self, task: &str) -> Result<String, ConfigError> {
        let path = self.prompt_path(task);
        fs::read_to_string(&path).map_err(|source| ConfigError::Read { path, source })
    }
}

// Reads a file and substitutes `${VAR}` placeholders from the environment.
fn read_and_substitute(path: &str) -> Result<String, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;

    let re = Regex::new(r"\$\{(?P<var>[A-Z0-9_]+)\}")?;
    let expanded = re.replace_all(&content, |caps: &regex::Captures| {
        env::var(&caps["var"]).unwrap_or_default()
    });
    Ok(expanded.into_owned())
}

/// Loads the configuration.
///
/// An explicitly requested file must exist; the default `config.yml` is
/// optional.
pub fn get_config(config_path_override: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut builder = ConfigBuilder::builder();

    let path = config_path_override.unwrap_or(DEFAULT_CONFIG_FILE);
    if Path::new(path).exists() {
        let content = read_and_substitute(path)?;
        builder = builder.add_source(File::from_str(&content, FileFormat::Yaml));
    } else if config_path_override.is_some() {
        return Err(ConfigError::NotFound(path.to_string()));
    }

    let settings = builder
        .add_source(
            Environment::with_prefix("NARRATIVELENS")
                .prefix_separator("_")
                .try_parsing(true)
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Mutex, MutexGuard};
    use tempfile::NamedTempFile;

    // Serializes tests that read or mutate the process environment.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_guard() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_fill_missing_keys() {
        let _env = env_guard();
        let file = write_config("model: gemini-test\n");
        let config = get_config(file.path().to_str()).unwrap();

        assert_eq!(config.model, "gemini-test");
        assert_eq!(config.api_url, DEFAULT_GEMINI_BASE_URL);
        assert_eq!(config.asset_extensions, vec!["mp4".to_string()]);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.delay(), Duration::from_secs(5));
        assert_eq!(config.repair.max_attempts, 3);
    }

    #[test]
    fn test_placeholders_are_substituted() {
        let _env = env_guard();
        env::set_var("NL_CONFIG_TEST_ASSET_ROOT", "/srv/ads");
        let file =
            write_config("asset_root: ${NL_CONFIG_TEST_ASSET_ROOT}\nretry:\n  delay_secs: 1\n");
        let config = get_config(file.path().to_str()).unwrap();

        assert_eq!(config.asset_root, "/srv/ads");
        assert_eq!(config.retry.delay_secs, 1);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_environment_overrides_file() {
        let _env = env_guard();
        let file = write_config("model: from-file\nretry:\n  delay_secs: 7\n  max_attempts: 4\n");
        env::set_var("NARRATIVELENS_RETRY__DELAY_SECS", "1");
        env::set_var("NARRATIVELENS_MODEL", "from-env");
        let result = get_config(file.path().to_str());
        env::remove_var("NARRATIVELENS_RETRY__DELAY_SECS");
        env::remove_var("NARRATIVELENS_MODEL");
        let config = result.unwrap();

        assert_eq!(config.retry.delay_secs, 1);
        assert_eq!(config.retry.delay(), Duration::from_secs(1));
        assert_eq!(config.retry.max_attempts, 4, "sibling keys keep their file value");
        assert_eq!(config.model, "from-env");
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let result = get_config(Some("/definitely/not/here/config.yml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_prompt_paths_per_task() {
        let _env = env_guard();
        let file = write_config("tasks:\n  ugc:\n    prompt_path: custom/ugc.txt\n");
        let config = get_config(file.path().to_str()).unwrap();

        assert_eq!(config.prompt_path("ugc"), "custom/ugc.txt");
        assert_eq!(
            config.prompt_path("features"),
            "prompts/feature_extractor_prompt.txt"
        );
    }

    #[test]
    fn test_unreadable_prompt_is_an_error() {
        let _env = env_guard();
        let file = write_config("tasks:\n  ugc:\n    prompt_path: /definitely/not/here.txt\n");
        let config = get_config(file.path().to_str()).unwrap();
        assert!(matches!(
            config.load_prompt("ugc"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_configured_api_key_wins() {
        let _env = env_guard();
        let file = write_config("api_key: from-file\n");
        let config = get_config(file.path().to_str()).unwrap();
        assert_eq!(config.resolve_api_key().unwrap(), "from-file");
    }
}

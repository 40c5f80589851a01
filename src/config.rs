//! Configuration
//!
//! Layered the same way on every start: built-in defaults, then an optional
//! YAML file, then `LARDER_*` environment overrides (a `.env` file is loaded
//! by `main` before this runs). Every component receives the section it needs
//! by value at construction time; nothing reads configuration globally.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "larder.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LarderConfig {
    pub database: DatabaseConfig,
    pub commands: CommandConfig,
    pub feedback: FeedbackConfig,
    pub display: DisplayConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file, or `:memory:`.
    pub path: String,
    /// Upper bound on waiting for the write lock and the commit.
    pub commit_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "larder.db".to_string(),
            commit_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub similarity_threshold: f64,
    pub special_quantities: BTreeMap<String, u32>,
    pub min_quantity: u32,
    pub max_quantity: u32,
    pub max_command_length: usize,
    pub max_item_name_length: usize,
    pub undo_words: Vec<String>,
    pub repeat_words: Vec<String>,
    pub verbs: VerbConfig,
    pub nlp: NlpConfig,
}

impl Default for CommandConfig {
    fn default() -> Self {
        let special_quantities = [
            ("a", 1), ("an", 1), ("one", 1), ("two", 2), ("three", 3), ("four", 4),
            ("five", 5), ("six", 6), ("seven", 7), ("eight", 8), ("nine", 9), ("ten", 10),
            ("couple", 2), ("few", 3), ("several", 3), ("dozen", 12),
        ]
        .into_iter()
        .map(|(word, n)| (word.to_string(), n))
        .collect();

        Self {
            similarity_threshold: 0.8,
            special_quantities,
            min_quantity: 0,
            max_quantity: 10_000,
            max_command_length: 500,
            max_item_name_length: 100,
            undo_words: strings(&["undo", "reverse", "cancel", "revert", "take back"]),
            repeat_words: strings(&["repeat", "again"]),
            verbs: VerbConfig::default(),
            nlp: NlpConfig::default(),
        }
    }
}

/// Surface forms that select each mutation kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerbConfig {
    pub add: Vec<String>,
    pub remove: Vec<String>,
    pub set: Vec<String>,
}

impl Default for VerbConfig {
    fn default() -> Self {
        Self {
            add: strings(&["add", "put", "place", "store", "stock", "insert", "got", "bought", "purchased"]),
            remove: strings(&[
                "remove", "take", "delete", "use", "used", "consume", "consumed", "subtract", "ate", "finished",
            ]),
            set: strings(&["set", "change", "update", "adjust", "modify", "correct", "fix", "have"]),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NlpConfig {
    /// Use the tokenizer-backed lemma tagger when its model loads.
    pub enabled: bool,
    /// `tokenizer.json` providing the pre-tokenizer.
    pub tokenizer_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub queue_capacity: usize,
    /// Consecutive failures before a channel is disabled for good.
    pub failure_threshold: u32,
    pub shutdown_timeout_ms: u64,
    /// External TTS program, invoked as `<command> <text>`.
    pub speech_command: Option<String>,
    /// External player, invoked as `<command> <sound file>`.
    pub sound_command: Option<String>,
    pub sounds: SoundFiles,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            failure_threshold: 3,
            shutdown_timeout_ms: 2_000,
            speech_command: None,
            sound_command: None,
            sounds: SoundFiles::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundFiles {
    pub success: PathBuf,
    pub error: PathBuf,
    pub warning: PathBuf,
}

impl Default for SoundFiles {
    fn default() -> Self {
        Self {
            success: PathBuf::from("assets/sounds/success.wav"),
            error: PathBuf::from("assets/sounds/error.wav"),
            warning: PathBuf::from("assets/sounds/warning.wav"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub enabled: bool,
    pub low_stock_threshold: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            low_stock_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub log_level: String,
    /// When set, logs are also written to a daily rolling file here.
    pub log_dir: Option<PathBuf>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl LarderConfig {
    /// Load from an explicit path, or `larder.yaml` if it exists, then apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&raw)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Apply `LARDER_*` overrides. `lookup` is injected so tests do not touch
    /// the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LARDER_DB_PATH") {
            self.database.path = v;
        }
        if let Some(v) = lookup("LARDER_LOG_LEVEL") {
            self.system.log_level = v;
        }
        if let Some(v) = lookup("LARDER_LOG_DIR") {
            self.system.log_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("LARDER_TOKENIZER_PATH") {
            self.commands.nlp.tokenizer_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("LARDER_SPEECH_COMMAND") {
            self.feedback.speech_command = Some(v);
        }
        if let Some(v) = lookup("LARDER_NLP_ENABLED") {
            self.commands.nlp.enabled = matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on");
        }
        override_parsed(&lookup, "LARDER_SIMILARITY_THRESHOLD", &mut self.commands.similarity_threshold);
        override_parsed(&lookup, "LARDER_FEEDBACK_QUEUE", &mut self.feedback.queue_capacity);
        override_parsed(&lookup, "LARDER_FAILURE_THRESHOLD", &mut self.feedback.failure_threshold);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.commands;
        if !(0.0..=1.0).contains(&c.similarity_threshold) {
            return Err(ConfigError::Invalid(format!(
                "similarity_threshold must be within [0, 1], got {}",
                c.similarity_threshold
            )));
        }
        if c.min_quantity > c.max_quantity {
            return Err(ConfigError::Invalid(format!(
                "min_quantity {} exceeds max_quantity {}",
                c.min_quantity, c.max_quantity
            )));
        }
        if c.max_command_length == 0 || c.max_item_name_length == 0 {
            return Err(ConfigError::Invalid("length caps must be non-zero".to_string()));
        }
        if self.feedback.queue_capacity == 0 {
            return Err(ConfigError::Invalid("feedback.queue_capacity must be non-zero".to_string()));
        }
        if self.feedback.failure_threshold == 0 {
            return Err(ConfigError::Invalid("feedback.failure_threshold must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + std::fmt::Display,
{
    let Some(raw) = lookup(key) else { return };
    match raw.trim().parse::<T>() {
        Ok(value) => {
            info!("Applied environment override: {} = {}", key, value);
            *slot = value;
        }
        Err(_) => warn!("Ignoring invalid value for {}: {}", key, raw),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = LarderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.commands.similarity_threshold, 0.8);
        assert_eq!(config.commands.special_quantities.get("dozen"), Some(&12));
        assert_eq!(config.feedback.failure_threshold, 3);
        assert_eq!(config.database.commit_timeout_secs, 30);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "commands:\n  similarity_threshold: 0.7\ndatabase:\n  path: ':memory:'\n";
        let config = LarderConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.commands.similarity_threshold, 0.7);
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.commands.max_quantity, 10_000);
        assert!(config.commands.verbs.add.contains(&"bought".to_string()));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("LARDER_DB_PATH", "/tmp/x.db"),
            ("LARDER_SIMILARITY_THRESHOLD", "0.65"),
            ("LARDER_FAILURE_THRESHOLD", "not-a-number"),
            ("LARDER_NLP_ENABLED", "yes"),
        ]
        .into_iter()
        .collect();

        let mut config = LarderConfig::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.database.path, "/tmp/x.db");
        assert_eq!(config.commands.similarity_threshold, 0.65);
        assert_eq!(config.feedback.failure_threshold, 3);
        assert!(config.commands.nlp.enabled);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = LarderConfig::default();
        config.commands.similarity_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = LarderConfig::default();
        config.commands.min_quantity = 20;
        config.commands.max_quantity = 10;
        assert!(config.validate().is_err());

        let mut config = LarderConfig::default();
        config.feedback.queue_capacity = 0;
        assert!(config.validate().is_err());
    }
}

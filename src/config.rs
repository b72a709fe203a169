//! Configuration with file persistence
//!
//! Loaded from `<config dir>/constellation/config.toml` (or an explicit
//! path). A missing file yields the defaults. API keys are never read from
//! the file; `[inference] api_key_env` names the environment variable that
//! holds one.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pipeline::DataFiles;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("could not determine the {0} directory")]
    NoDirectory(&'static str),

    #[error("environment variable {0} is not set")]
    MissingApiKey(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub discovery: DiscoveryConfig,
    pub inference: InferenceConfig,
    pub review: ReviewConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding staging, approved, checkpoint and export files
    pub data_dir: Option<PathBuf>,
    /// SQLite graph database
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub cluster_size: usize,
    pub min_confidence: f64,
    /// Concurrent inference calls
    pub concurrency: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cluster_size: 50,
            min_confidence: 0.6,
            concurrency: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
    pub api_key_env: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: crate::inference::DEFAULT_BASE_URL.to_string(),
            model: "gpt-4.1-mini".to_string(),
            temperature: 0.3,
            max_tokens: 4000,
            timeout_secs: 120,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

impl InferenceConfig {
    pub fn resolved_api_key(&self) -> Result<String, ConfigError> {
        env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey(self.api_key_env.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Name stamped as `reviewed_by` on interactive decisions
    pub reviewer: String,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            reviewer: "human".to_string(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(custom_dir) = env::var("CONSTELLATION_CONFIG_DIR") {
            return Ok(PathBuf::from(custom_dir).join("config.toml"));
        }
        Ok(dirs::config_dir()
            .ok_or(ConfigError::NoDirectory("config"))?
            .join("constellation")
            .join("config.toml"))
    }

    /// Load from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`, or return defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery.cluster_size == 0 {
            return Err(ConfigError::Invalid(
                "discovery.cluster_size must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.discovery.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "discovery.min_confidence must be within [0, 1], got {}",
                self.discovery.min_confidence
            )));
        }
        if self.discovery.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "discovery.concurrency must be at least 1".to_string(),
            ));
        }
        if self.inference.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "inference.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Data directory (defaults to `<data dir>/constellation`)
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.paths.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dirs::data_dir()
                .or_else(|| dirs::home_dir().map(|h| h.join(".local/share")))
                .ok_or(ConfigError::NoDirectory("data"))?
                .join("constellation")),
        }
    }

    /// Graph database path (defaults to `constellation.db` in the data directory)
    pub fn db_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.paths.db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.data_dir()?.join("constellation.db")),
        }
    }

    pub fn data_files(&self) -> Result<DataFiles, ConfigError> {
        Ok(DataFiles::new(self.data_dir()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_constants() {
        let config = Config::default();
        assert_eq!(config.discovery.cluster_size, 50);
        assert_eq!(config.discovery.min_confidence, 0.6);
        assert_eq!(config.discovery.concurrency, 5);
        assert_eq!(config.inference.model, "gpt-4.1-mini");
        assert_eq!(config.review.reviewer, "human");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.discovery.cluster_size, 50);
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            [paths]
            data_dir = "/tmp/constellation-data"

            [discovery]
            cluster_size = 20
            "#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.discovery.cluster_size, 20);
        assert_eq!(config.discovery.min_confidence, 0.6);
        assert_eq!(
            config.db_path().unwrap(),
            PathBuf::from("/tmp/constellation-data/constellation.db")
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[discovery]\ncluster_size = 0\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Invalid(_))
        ));

        let mut config = Config::default();
        config.discovery.min_confidence = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[discovery\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}

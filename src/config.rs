//! Configuration for binscope.

use crate::core::{Aggregation, StoreConfig, StoreError, WindowAggregator};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bin width, history capacity and sample size of the store
    #[serde(default)]
    pub store: StoreConfig,

    /// Directories watched as sources, in registry order
    #[serde(default)]
    pub sources: Vec<PathBuf>,

    /// Views queried after every ingest
    #[serde(default = "default_plots")]
    pub plots: Vec<PlotConfig>,

    /// How often source directories are polled for changes
    #[serde(with = "duration_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Directory for JSON-lines frame exports
    #[serde(default = "default_export_path")]
    pub export_path: PathBuf,
}

fn default_plots() -> Vec<PlotConfig> {
    vec![
        PlotConfig::new("signal", Aggregation::Mean, 1),
        PlotConfig::new("spectrogram", Aggregation::Mean, 300),
    ]
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_export_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("binscope")
        .join("exports")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            sources: Vec::new(),
            plots: default_plots(),
            poll_interval: default_poll_interval(),
            export_path: default_export_path(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults when absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("binscope")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Check the store parameters and every plot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate().map_err(ConfigError::Invalid)?;
        for plot in &self.plots {
            plot.aggregator().map_err(ConfigError::Invalid)?;
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(StoreError::InvalidArgument(
                "poll interval must be positive".to_string(),
            )));
        }
        Ok(())
    }

    /// Name a source directory is registered under.
    pub fn source_name(path: &Path) -> String {
        path.display().to_string()
    }
}

/// One view over the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotConfig {
    pub name: String,
    pub mode: Aggregation,
    /// Output rows requested per query
    pub window: usize,
    /// Sources included; empty means every registered source
    #[serde(default)]
    pub selection: Vec<String>,
}

impl PlotConfig {
    pub fn new(name: &str, mode: Aggregation, window: usize) -> Self {
        Self {
            name: name.to_string(),
            mode,
            window,
            selection: Vec::new(),
        }
    }

    pub fn aggregator(&self) -> Result<WindowAggregator, StoreError> {
        WindowAggregator::new(self.mode, self.window)
    }

    /// Resolve the selection against the registered sources.
    pub fn resolve_selection<'a>(&'a self, registered: &[&'a str]) -> Vec<&'a str> {
        if self.selection.is_empty() {
            registered.to_vec()
        } else {
            self.selection.iter().map(String::as_str).collect()
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(StoreError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration, stored as whole milliseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.bin_width, 1.0);
        assert_eq!(config.store.history_capacity, 100);
        assert_eq!(config.store.sample_size, 720);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.plots.len(), 2);
        assert_eq!(config.plots[1].window, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.sources = vec![PathBuf::from("/data/a"), PathBuf::from("/data/b")];
        config.poll_interval = Duration::from_millis(250);
        config.save_to(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"poll_interval\": 250"));
        assert!(text.contains("\"mode\": \"mean\""));

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.sources, config.sources);
        assert_eq!(loaded.poll_interval, Duration::from_millis(250));
        assert_eq!(loaded.plots, config.plots);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("none.json")).unwrap();
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"sources": ["/tmp/x"]}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.sources, vec![PathBuf::from("/tmp/x")]);
        assert_eq!(config.store.sample_size, 720);
        assert_eq!(config.plots.len(), 2);
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_plot() {
        let mut config = Config::default();
        config.plots.push(PlotConfig::new("bad", Aggregation::None, 10));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.store.bin_width = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_selection() {
        let mut plot = PlotConfig::new("p", Aggregation::Sum, 1);
        assert_eq!(plot.resolve_selection(&["a", "b"]), vec!["a", "b"]);

        plot.selection = vec!["b".to_string()];
        assert_eq!(plot.resolve_selection(&["a", "b"]), vec!["b"]);
    }
}

//! Engine configuration - can be loaded from YAML

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use streamby_core::ParallelConfig;
use tracing::Level;

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum rows handed to one `add_chunk` call
    pub chunk_size: usize,
    /// Sharded parallel ingestion
    pub parallel: ParallelConfig,
    /// Logging configuration
    pub logging: LoggingSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            parallel: ParallelConfig::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Include target in logs
    pub show_target: bool,
    /// Include thread IDs in logs
    pub show_thread_ids: bool,
    /// Include file and line numbers
    pub show_location: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_location: false,
        }
    }
}

impl LoggingSettings {
    /// Get log level
    pub fn log_level(&self) -> Level {
        match self.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write default config to a file (for generating a starter config)
    pub fn write_default(path: impl AsRef<Path>) -> Result<()> {
        let yaml = Self::default().to_yaml()?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(EngineError::Config("chunk_size must be positive".to_string()));
        }
        if self.parallel.run_threshold == 0 {
            return Err(EngineError::Config(
                "parallel.run_threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Size the global rayon pool used for sharded ingestion.
    ///
    /// Must run before the pool is first used; a second call fails.
    pub fn install_thread_pool(&self) -> Result<()> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallel.effective_thread_pool_size())
            .build_global()
            .map_err(|e| EngineError::Config(format!("thread pool: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.parallel.run_threshold, 64);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = EngineConfig::from_yaml(
            r#"
chunk_size: 512
parallel:
  max_shards: 2
"#,
        )
        .unwrap();
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.parallel.max_shards, 2);
        assert_eq!(config.parallel.run_threshold, 64);
        assert_eq!(config.logging, LoggingSettings::default());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = EngineConfig::from_yaml("chunk_size: 0").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = EngineConfig::from_yaml("chunk_size: [1, 2").unwrap_err();
        assert!(matches!(err, EngineError::Yaml(_)));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streamby.yml");
        EngineConfig::write_default(&path).unwrap();
        let loaded = EngineConfig::from_file(&path).unwrap();
        assert_eq!(loaded, EngineConfig::default());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "logging:\n  level: debug\n  show_location: true").unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.logging.log_level(), Level::DEBUG);
        assert!(config.logging.show_location);
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::from_file("/nonexistent/streamby.yml").unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }

    #[test]
    fn test_log_level_fallback() {
        let settings = LoggingSettings {
            level: "verbose".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.log_level(), Level::INFO);
    }
}

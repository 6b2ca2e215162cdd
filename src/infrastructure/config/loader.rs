use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid variance_threshold: {0}. Must be within (0, 1]")]
    InvalidVarianceThreshold(f64),

    #[error("Invalid max_reforecasts: {0}. Must be at least 1")]
    InvalidMaxReforecasts(u32),

    #[error("Invalid event_buffer: {0}. Must be at least 1")]
    InvalidEventBuffer(usize),

    #[error("Invalid agent timeout: {0}. Must be positive")]
    InvalidAgentTimeout(u64),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .merchflow/config.yaml (project config)
    /// 3. .merchflow/local.yaml (project local overrides, optional)
    /// 4. Environment variables (MERCHFLOW_* prefix, highest priority)
    ///
    /// Configuration is always project-local (pwd/.merchflow/) so multiple
    /// planning projects on one machine stay independent.
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".merchflow/config.yaml"))
            .merge(Yaml::file(".merchflow/local.yaml"))
            .merge(Env::prefixed("MERCHFLOW_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.orchestrator.variance_threshold <= 0.0
            || config.orchestrator.variance_threshold > 1.0
        {
            return Err(ConfigError::InvalidVarianceThreshold(
                config.orchestrator.variance_threshold,
            ));
        }
        if config.orchestrator.max_reforecasts == 0 {
            return Err(ConfigError::InvalidMaxReforecasts(
                config.orchestrator.max_reforecasts,
            ));
        }
        if config.orchestrator.event_buffer == 0 {
            return Err(ConfigError::InvalidEventBuffer(config.orchestrator.event_buffer));
        }

        for timeout in [
            config.agents.demand_timeout_secs,
            config.agents.inventory_timeout_secs,
            config.agents.pricing_timeout_secs,
        ] {
            if timeout == 0 {
                return Err(ConfigError::InvalidAgentTimeout(timeout));
            }
        }

        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = Config::default();
        config.orchestrator.variance_threshold = 0.0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidVarianceThreshold(_))
        ));
    }

    #[test]
    fn test_inverted_backoff_rejected() {
        let mut config = Config::default();
        config.retry.initial_backoff_ms = 10_000;
        config.retry.max_backoff_ms = 100;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(_, _))
        ));
    }

    #[test]
    fn test_load_from_yaml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "orchestrator:\n  variance_threshold: 0.25\n  max_reforecasts: 5\n",
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.orchestrator.variance_threshold, 0.25);
        assert_eq!(config.orchestrator.max_reforecasts, 5);
        // Untouched sections keep their defaults.
        assert_eq!(config.database.max_connections, 5);
    }
}

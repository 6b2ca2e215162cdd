//! Configuration model for merchflow.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub agents: AgentsConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            agents: AgentsConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to the `SQLite` database file.
    #[serde(default = "default_database_path")]
    pub path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".merchflow/merchflow.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// One of: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// One of: json, pretty.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Orchestrator tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OrchestratorConfig {
    /// Absolute variance beyond which a re-forecast is triggered.
    #[serde(default = "default_variance_threshold")]
    pub variance_threshold: f64,

    /// Same-week re-forecasts allowed before the workflow fails.
    #[serde(default = "default_max_reforecasts")]
    pub max_reforecasts: u32,

    /// Per-subscriber live event buffer in the status publisher.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

const fn default_variance_threshold() -> f64 {
    0.20
}

const fn default_max_reforecasts() -> u32 {
    3
}

const fn default_event_buffer() -> usize {
    256
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            variance_threshold: default_variance_threshold(),
            max_reforecasts: default_max_reforecasts(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Per-agent invocation bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AgentsConfig {
    #[serde(default = "default_agent_timeout_secs")]
    pub demand_timeout_secs: u64,

    #[serde(default = "default_agent_timeout_secs")]
    pub inventory_timeout_secs: u64,

    #[serde(default = "default_agent_timeout_secs")]
    pub pricing_timeout_secs: u64,
}

const fn default_agent_timeout_secs() -> u64 {
    120
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            demand_timeout_secs: default_agent_timeout_secs(),
            inventory_timeout_secs: default_agent_timeout_secs(),
            pricing_timeout_secs: default_agent_timeout_secs(),
        }
    }
}

impl AgentsConfig {
    /// Timeout for a named agent; unknown names get the demand bound.
    pub fn timeout_for(&self, agent: &str) -> Duration {
        let secs = match agent {
            "inventory" => self.inventory_timeout_secs,
            "pricing" => self.pricing_timeout_secs,
            _ => self.demand_timeout_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Transient-error retry policy for the handoff adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_initial_backoff_ms() -> u64 {
    250
}

const fn default_max_backoff_ms() -> u64 {
    5_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

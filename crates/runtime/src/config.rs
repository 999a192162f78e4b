//! Configuration management for the coordination runtime.
//!
//! Layered env-var → file → default precedence, the same shape the donor
//! runtime's configuration module used: a `Config::default()` baseline,
//! `from_env()` overlaying environment variables, `from_file()` for a
//! `serde_yaml` document, and a `validate()` pass before the runtime starts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("io error reading config file: {message}")]
    IoError { message: String },

    #[error("configuration parsing error: {message}")]
    ParseError { message: String },
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub bus: BusConfig,
    pub state_graph: StateGraphConfig,
    pub activation: ActivationConfig,
    pub policy: PolicyFilesConfig,
    pub finality: FinalityConfig,
    pub logging: LoggingConfig,
    pub api: ApiConfig,
}

/// Durable bus connection/retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub database_path: PathBuf,
    /// Retention window; messages older than this are eligible for
    /// dead-letter sweep regardless of ack state.
    pub retention_days: u32,
    pub max_retention_bytes: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/bus.sqlite3"),
            retention_days: 7,
            max_retention_bytes: 500 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateGraphConfig {
    pub database_path: PathBuf,
    /// Closed transition table: `lastNode -> nextNode` per spec.md §4.3.
    pub transitions: HashMap<String, String>,
}

impl Default for StateGraphConfig {
    fn default() -> Self {
        let mut transitions = HashMap::new();
        transitions.insert("ContextIngested".to_string(), "FactsExtracted".to_string());
        transitions.insert("FactsExtracted".to_string(), "DriftChecked".to_string());
        transitions.insert("DriftChecked".to_string(), "ContextIngested".to_string());
        Self {
            database_path: PathBuf::from("./data/state_graph.sqlite3"),
            transitions,
        }
    }
}

/// Per-role activation-filter defaults; overridable per role by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationConfig {
    pub cooldown_ms: u64,
    pub max_idle_cycles: u32,
    pub per_role_overrides: HashMap<String, u32>,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 1_000,
            max_idle_cycles: 10,
            per_role_overrides: HashMap::new(),
        }
    }
}

/// Paths to the declarative policy and finality rule files (mode, rules,
/// transition_rules per spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyFilesConfig {
    pub policy_file: Option<PathBuf>,
    pub default_mode: String,
}

impl Default for PolicyFilesConfig {
    fn default() -> Self {
        Self {
            policy_file: None,
            default_mode: "MITL".to_string(),
        }
    }
}

/// Goal-score weights and gate thresholds (spec.md §4.11/§4.11a).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalityConfig {
    pub weight_confidence: f64,
    pub weight_contradictions: f64,
    pub weight_goals: f64,
    pub weight_risk: f64,
    pub near_threshold: f64,
    pub auto_threshold: f64,
    pub monotonicity_window: u32,
    pub trajectory_quality_min: f64,
    pub plateau_threshold: f64,
    pub plateau_rounds: u32,
    pub ema_alpha: f64,
    pub divergence_rate: f64,
    pub extraction_worker_url: Option<String>,
    pub embedding_service_url: Option<String>,
}

impl Default for FinalityConfig {
    fn default() -> Self {
        Self {
            weight_confidence: 0.30,
            weight_contradictions: 0.30,
            weight_goals: 0.25,
            weight_risk: 0.15,
            near_threshold: 0.5,
            auto_threshold: 0.85,
            monotonicity_window: 3,
            trajectory_quality_min: 0.7,
            plateau_threshold: 0.01,
            plateau_rounds: 3,
            ema_alpha: 0.3,
            divergence_rate: 0.0,
            extraction_worker_url: None,
            embedding_service_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub structured: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            structured: true,
        }
    }
}

/// The bearer-authenticated HTTP surface config (fronted by
/// `crates/approval-relay`; `crates/runtime` itself exposes no HTTP).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub host: String,
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            auth_token: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(port) = env::var("CONCLAVE_API_PORT") {
            config.api.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "CONCLAVE_API_PORT".to_string(),
                reason: "invalid port number".to_string(),
            })?;
        }

        if let Ok(host) = env::var("CONCLAVE_API_HOST") {
            config.api.host = host;
        }

        if let Ok(token) = env::var("CONCLAVE_API_AUTH_TOKEN") {
            match Self::validate_auth_token(&token) {
                Ok(validated) => config.api.auth_token = Some(validated),
                Err(e) => {
                    tracing::error!("invalid CONCLAVE_API_AUTH_TOKEN: {}", e);
                }
            }
        }

        if let Ok(level) = env::var("CONCLAVE_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(path) = env::var("CONCLAVE_BUS_DB") {
            config.bus.database_path = PathBuf::from(path);
        }

        if let Ok(path) = env::var("CONCLAVE_STATE_GRAPH_DB") {
            config.state_graph.database_path = PathBuf::from(path);
        }

        if let Ok(path) = env::var("CONCLAVE_POLICY_FILE") {
            config.policy.policy_file = Some(PathBuf::from(path));
        }

        if let Ok(url) = env::var("CONCLAVE_EXTRACTION_WORKER_URL") {
            config.finality.extraction_worker_url = Some(url);
        }

        if let Ok(url) = env::var("CONCLAVE_EMBEDDING_SERVICE_URL") {
            config.finality.embedding_service_url = Some(url);
        }

        Ok(config)
    }

    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            message: e.to_string(),
        })?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "api.port".to_string(),
                reason: "port cannot be 0".to_string(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let weight_sum = self.finality.weight_confidence
            + self.finality.weight_contradictions
            + self.finality.weight_goals
            + self.finality.weight_risk;
        if (weight_sum - 1.0).abs() > 0.01 {
            return Err(ConfigError::InvalidValue {
                key: "finality.weight_*".to_string(),
                reason: format!("goal-score weights must sum to 1.0, got {weight_sum}"),
            });
        }

        if self.finality.near_threshold > self.finality.auto_threshold {
            return Err(ConfigError::InvalidValue {
                key: "finality.near_threshold".to_string(),
                reason: "near_threshold must not exceed auto_threshold".to_string(),
            });
        }

        Ok(())
    }

    pub fn get_api_auth_token(&self) -> Result<String, ConfigError> {
        self.api.auth_token.clone().ok_or(ConfigError::MissingRequired {
            key: "CONCLAVE_API_AUTH_TOKEN".to_string(),
        })
    }

    /// Rejects empty, too-short, and known weak/default tokens.
    fn validate_auth_token(token: &str) -> Result<String, ConfigError> {
        let trimmed = token.trim();

        if trimmed.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "auth_token".to_string(),
                reason: "token cannot be empty".to_string(),
            });
        }

        const WEAK_TOKENS: &[&str] = &[
            "dev", "test", "password", "secret", "token", "api_key", "12345678", "admin", "root",
            "default", "changeme", "letmein", "qwerty", "abc123", "password123",
        ];

        if WEAK_TOKENS.contains(&trimmed.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "auth_token".to_string(),
                reason: format!("token '{trimmed}' is a known weak/default token"),
            });
        }

        if trimmed.len() < 8 {
            return Err(ConfigError::InvalidValue {
                key: "auth_token".to_string(),
                reason: "token must be at least 8 characters".to_string(),
            });
        }

        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut config = Config::default();
        config.api.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn weak_token_is_rejected() {
        assert!(Config::validate_auth_token("password").is_err());
        assert!(Config::validate_auth_token("a-strong-random-token").is_ok());
    }

    #[test]
    fn short_token_is_rejected() {
        assert!(Config::validate_auth_token("short").is_err());
    }
}

//! Validated configuration value handed to the core at construction (spec
//! §6). Loading the YAML file itself is out of scope (spec §1) — this
//! crate only models the already-parsed shape plus the legacy environment
//! variable overlay the core must still honor.

mod env;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use env::apply_env_overrides;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required config field: {0}")]
    MissingField(&'static str),
    #[error("invalid config field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// `server.*` (spec §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub socket_path: String,
    pub listen_address: String,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    #[serde(with = "duration_secs")]
    pub shutdown_timeout: Duration,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            socket_path: "/tmp/atest-ext-ai.sock".to_string(),
            listen_address: "127.0.0.1:0".to_string(),
            timeout: Duration::from_secs(120),
            shutdown_timeout: Duration::from_secs(10),
            max_connections: 64,
        }
    }
}

/// One entry of `ai.services` (spec §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub enabled: bool,
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Empty means auto-select per spec §9's open question.
    #[serde(default)]
    pub model: String,
    pub max_tokens: u32,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    #[serde(default)]
    pub priority: i32,
}

/// `ai.retry.*` (spec §6 / §4.D).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(with = "duration_secs")]
    pub initial_delay: Duration,
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// `ai.*` (spec §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiConfig {
    pub default_service: String,
    #[serde(default)]
    pub fallback_order: Vec<String>,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub services: BTreeMap<String, ServiceConfig>,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            default_service: "ollama".to_string(),
            fallback_order: Vec::new(),
            timeout: Duration::from_secs(120),
            services: BTreeMap::new(),
            retry: RetryConfig::default(),
        }
    }
}

impl AiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_service.is_empty() {
            return Err(ConfigError::MissingField("ai.default_service"));
        }
        for (tag, service) in &self.services {
            if service.enabled && service.max_tokens == 0 {
                return Err(ConfigError::InvalidField {
                    field: "ai.services.max_tokens",
                    reason: format!("service '{tag}' has max_tokens == 0"),
                });
            }
        }
        Ok(())
    }
}

/// The top-level validated configuration value the core is constructed
/// from (spec §1 "the core receives a validated configuration value").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ai: AiConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ai.validate()
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_missing_default_service() {
        let config = AiConfig {
            default_service: String::new(),
            fallback_order: Vec::new(),
            timeout: Duration::from_secs(30),
            services: BTreeMap::new(),
            retry: RetryConfig::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_max_tokens_on_enabled_service() {
        let mut services = BTreeMap::new();
        services.insert(
            "ollama".to_string(),
            ServiceConfig {
                enabled: true,
                provider: "ollama".to_string(),
                endpoint: None,
                api_key: None,
                model: "qwen2".to_string(),
                max_tokens: 0,
                timeout: Duration::from_secs(30),
                priority: 0,
            },
        );
        let config = AiConfig {
            default_service: "ollama".to_string(),
            fallback_order: Vec::new(),
            timeout: Duration::from_secs(30),
            services,
            retry: RetryConfig::default(),
        };
        assert!(config.validate().is_err());
    }
}

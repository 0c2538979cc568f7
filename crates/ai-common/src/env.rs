//! Legacy-compatibility environment variable overlay (spec §6). Applied on
//! top of an already-parsed `AppConfig`; never the sole source of config.

use std::time::Duration;

use crate::{AppConfig, ServiceConfig};

const OLLAMA_ENDPOINT: &str = "ATEST_EXT_AI_OLLAMA_ENDPOINT";
const OLLAMA_MODEL: &str = "ATEST_EXT_AI_OLLAMA_MODEL";
const OPENAI_API_KEY: &str = "ATEST_EXT_AI_OPENAI_API_KEY";
const OPENAI_MODEL: &str = "ATEST_EXT_AI_OPENAI_MODEL";
const DEFAULT_SERVICE: &str = "ATEST_EXT_AI_DEFAULT_SERVICE";
const AI_TIMEOUT: &str = "ATEST_EXT_AI_AI_TIMEOUT";

/// Overlays recognized `ATEST_EXT_AI_*` variables onto `config`, using the
/// given lookup function so callers can inject a fake environment in tests.
pub fn apply_env_overrides(config: &mut AppConfig, get: impl Fn(&str) -> Option<String>) {
    if let Some(endpoint) = get(OLLAMA_ENDPOINT) {
        service_mut(config, "ollama").endpoint = Some(endpoint);
    }
    if let Some(model) = get(OLLAMA_MODEL) {
        service_mut(config, "ollama").model = model;
    }
    if let Some(api_key) = get(OPENAI_API_KEY) {
        service_mut(config, "openai").api_key = Some(api_key);
    }
    if let Some(model) = get(OPENAI_MODEL) {
        service_mut(config, "openai").model = model;
    }
    if let Some(tag) = get(DEFAULT_SERVICE) {
        config.ai.default_service = tag;
    }
    if let Some(secs) = get(AI_TIMEOUT).and_then(|value| value.parse::<u64>().ok()) {
        config.ai.timeout = Duration::from_secs(secs);
    }
}

fn service_mut<'a>(config: &'a mut AppConfig, tag: &str) -> &'a mut ServiceConfig {
    config
        .ai
        .services
        .entry(tag.to_string())
        .or_insert_with(|| ServiceConfig {
            enabled: true,
            provider: tag.to_string(),
            endpoint: None,
            api_key: None,
            model: String::new(),
            max_tokens: 1024,
            timeout: Duration::from_secs(30),
            priority: 0,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AiConfig, RetryConfig, ServerConfig};
    use std::collections::BTreeMap;

    fn base_config() -> AppConfig {
        AppConfig {
            server: ServerConfig::default(),
            ai: AiConfig {
                default_service: "ollama".to_string(),
                fallback_order: Vec::new(),
                timeout: Duration::from_secs(30),
                services: BTreeMap::new(),
                retry: RetryConfig::default(),
            },
        }
    }

    #[test]
    fn overlays_recognized_variables() {
        let mut config = base_config();
        let env = [
            (OLLAMA_ENDPOINT, "http://remote:11434"),
            (OPENAI_API_KEY, "sk-test"),
            (DEFAULT_SERVICE, "openai"),
            (AI_TIMEOUT, "45"),
        ]
        .into_iter()
        .collect::<std::collections::HashMap<_, _>>();

        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.ai.default_service, "openai");
        assert_eq!(config.ai.timeout, Duration::from_secs(45));
        assert_eq!(
            config.ai.services["ollama"].endpoint.as_deref(),
            Some("http://remote:11434")
        );
        assert_eq!(config.ai.services["openai"].api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn leaves_config_untouched_when_env_is_empty() {
        let mut config = base_config();
        let before = config.clone();
        apply_env_overrides(&mut config, |_| None);
        assert_eq!(config, before);
    }
}

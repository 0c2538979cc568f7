use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// The wire protocol family a provider speaks (GLOSSARY: "provider kind").
/// `local` is accepted on input and normalizes to `Ollama`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    OpenAI,
    DeepSeek,
    Claude,
    Custom,
}

impl ProviderKind {
    /// Case-insensitive parse with the `local -> ollama` alias from spec §3/§4.F.
    pub fn parse_loose(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("local") || value.eq_ignore_ascii_case("ollama") {
            return Some(ProviderKind::Ollama);
        }
        if value.eq_ignore_ascii_case("openai") {
            return Some(ProviderKind::OpenAI);
        }
        if value.eq_ignore_ascii_case("deepseek") {
            return Some(ProviderKind::DeepSeek);
        }
        if value.eq_ignore_ascii_case("claude") {
            return Some(ProviderKind::Claude);
        }
        if value.eq_ignore_ascii_case("custom") {
            return Some(ProviderKind::Custom);
        }
        None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenAI => "openai",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Claude => "claude",
            ProviderKind::Custom => "custom",
        }
    }

    fn requires_api_key(self) -> bool {
        matches!(
            self,
            ProviderKind::OpenAI | ProviderKind::DeepSeek | ProviderKind::Claude
        )
    }
}

/// Immutable per-client configuration (spec §3 "ProviderConfig"). Constructed
/// once, validated at construction, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub default_model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

const DEEPSEEK_DEFAULT_ENDPOINT: &str = "https://api.deepseek.com";
const OLLAMA_DEFAULT_ENDPOINT: &str = "http://localhost:11434";

impl ProviderConfig {
    /// Validates and normalizes a raw configuration entry. Fails closed:
    /// any missing required field is an error, never a silent default, except
    /// for the well-known endpoint defaults named in spec §4.B.
    pub fn new(
        kind_raw: &str,
        endpoint: Option<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        let kind = ProviderKind::parse_loose(kind_raw).ok_or_else(|| {
            CoreError::bad_request(format!("unknown provider kind '{kind_raw}'"))
        })?;

        let endpoint = match (kind, endpoint) {
            (_, Some(value)) if !value.trim().is_empty() => value,
            (ProviderKind::DeepSeek, _) => DEEPSEEK_DEFAULT_ENDPOINT.to_string(),
            (ProviderKind::Ollama, _) => OLLAMA_DEFAULT_ENDPOINT.to_string(),
            (ProviderKind::Custom, _) => {
                return Err(CoreError::bad_request(
                    "custom provider requires an explicit endpoint",
                ));
            }
            (other, _) => {
                return Err(CoreError::bad_request(format!(
                    "{} provider requires an explicit endpoint",
                    other.as_str()
                )));
            }
        };

        if kind.requires_api_key() && api_key.as_deref().unwrap_or("").is_empty() {
            return Err(CoreError::bad_request(format!(
                "{} provider requires an api_key",
                kind.as_str()
            )));
        }

        if max_tokens == 0 {
            return Err(CoreError::bad_request("max_tokens must be > 0"));
        }
        if timeout.is_zero() {
            return Err(CoreError::bad_request("timeout must be > 0"));
        }

        Ok(Self {
            kind,
            endpoint,
            api_key,
            default_model: default_model.into(),
            max_tokens,
            timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_alias_normalizes_to_ollama() {
        let cfg = ProviderConfig::new(
            "local",
            None,
            None,
            "qwen2",
            1024,
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(cfg.kind, ProviderKind::Ollama);
        assert_eq!(cfg.endpoint, OLLAMA_DEFAULT_ENDPOINT);
    }

    #[test]
    fn deepseek_defaults_endpoint() {
        let cfg = ProviderConfig::new(
            "deepseek",
            None,
            Some("k".to_string()),
            "deepseek-chat",
            1024,
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(cfg.endpoint, DEEPSEEK_DEFAULT_ENDPOINT);
    }

    #[test]
    fn custom_requires_endpoint() {
        let err = ProviderConfig::new(
            "custom",
            None,
            Some("k".to_string()),
            "m",
            1024,
            Duration::from_secs(30),
        )
        .unwrap_err();
        assert_eq!(err.kind, crate::errors::ProviderErrorKind::BadRequest);
    }

    #[test]
    fn openai_requires_api_key() {
        let err = ProviderConfig::new(
            "openai",
            Some("https://api.openai.com".to_string()),
            None,
            "gpt-4o-mini",
            1024,
            Duration::from_secs(30),
        )
        .unwrap_err();
        assert_eq!(err.kind, crate::errors::ProviderErrorKind::BadRequest);
    }

    #[test]
    fn rejects_zero_max_tokens() {
        let err = ProviderConfig::new(
            "ollama",
            None,
            None,
            "qwen2",
            0,
            Duration::from_secs(30),
        )
        .unwrap_err();
        assert_eq!(err.kind, crate::errors::ProviderErrorKind::BadRequest);
    }
}

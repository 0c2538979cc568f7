//! Generic HTTP client (spec §4.B). Backs the `ollama`/`local` provider
//! kind: the local generation endpoint for `generate`, the tags endpoint
//! for `capabilities`, the version endpoint for `healthCheck`. No auth.

use std::time::Instant;

use ai_provider_core::{CoreError, GenerateOptions, Health, ModelInfo, Provider, ProviderConfig, ProviderKind, Usage};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::http_util::{ensure_success, race};

pub struct OllamaProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, CoreError> {
        if !matches!(config.kind, ProviderKind::Ollama) {
            return Err(CoreError::internal("OllamaProvider requires kind=ollama"));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| CoreError::internal(err.to_string()))?;
        Ok(Self { config, client })
    }

    fn base_url(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponseBody {
    #[serde(default)]
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TagsResponseBody {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(
        &self,
        ctx: &CancellationToken,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<(String, Usage), CoreError> {
        let model = opts
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());
        let body = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": opts.temperature,
                "num_predict": opts.max_tokens,
            },
        });

        let url = format!("{}/api/generate", self.base_url());
        let resp = race(ctx, self.config.timeout, self.client.post(url).json(&body).send()).await?;
        let resp = ensure_success(resp).await?;

        let parsed: GenerateResponseBody = resp
            .json()
            .await
            .map_err(|err| CoreError::bad_response(err.to_string()))?;

        let usage = Usage {
            prompt_tokens: parsed.prompt_eval_count,
            completion_tokens: parsed.eval_count,
            total_tokens: match (parsed.prompt_eval_count, parsed.eval_count) {
                (Some(p), Some(c)) => Some(p + c),
                _ => None,
            },
        };

        Ok((parsed.response, usage))
    }

    async fn capabilities(&self, ctx: &CancellationToken) -> Result<Vec<ModelInfo>, CoreError> {
        let url = format!("{}/api/tags", self.base_url());
        let resp = race(ctx, self.config.timeout, self.client.get(url).send()).await?;
        let resp = ensure_success(resp).await?;

        let parsed: TagsResponseBody = resp
            .json()
            .await
            .map_err(|err| CoreError::bad_response(err.to_string()))?;

        Ok(parsed
            .models
            .into_iter()
            .map(|entry| ModelInfo::new(entry.name))
            .collect())
    }

    async fn health_check(&self, ctx: &CancellationToken) -> Result<Health, CoreError> {
        let started = Instant::now();
        let url = format!("{}/api/version", self.base_url());
        match race(ctx, self.config.timeout, self.client.get(url).send()).await {
            Ok(resp) => Ok(Health {
                healthy: resp.status().is_success(),
                status: resp.status().to_string(),
                response_time: started.elapsed(),
            }),
            Err(err) => Ok(Health {
                healthy: false,
                status: err.to_string(),
                response_time: started.elapsed(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(endpoint: &str) -> ProviderConfig {
        ProviderConfig::new("ollama", Some(endpoint.to_string()), None, "qwen2", 1024, Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn local_alias_resolves_to_ollama_kind() {
        let cfg = ProviderConfig::new("local", Some("http://localhost:11434".to_string()), None, "qwen2", 1024, Duration::from_secs(5)).unwrap();
        assert_eq!(cfg.kind, ai_provider_core::ProviderKind::Ollama);
    }

    #[tokio::test]
    async fn generate_against_unreachable_host_is_transport_error() {
        let provider = OllamaProvider::new(config("http://127.0.0.1:1")).unwrap();
        let ctx = CancellationToken::new();
        let err = provider
            .generate(&ctx, "hi", &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.kind,
            ai_provider_core::ProviderErrorKind::Transport | ai_provider_core::ProviderErrorKind::Timeout
        ));
    }

    #[tokio::test]
    async fn health_check_against_unreachable_host_reports_unhealthy_not_error() {
        let provider = OllamaProvider::new(config("http://127.0.0.1:1")).unwrap();
        let ctx = CancellationToken::new();
        let health = provider.health_check(&ctx).await.unwrap();
        assert!(!health.healthy);
    }
}

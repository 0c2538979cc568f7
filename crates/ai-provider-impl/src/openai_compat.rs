//! OpenAI-compatible chat-completions client (spec §4.B). Backs the
//! `openai`, `deepseek`, and `custom` provider kinds: one user message
//! carrying the prompt, bearer-token auth, model/max-tokens/temperature
//! taken from the caller's `GenerateOptions`.

use std::time::Instant;

use ai_provider_core::{CoreError, GenerateOptions, Health, ModelInfo, Provider, ProviderConfig, ProviderKind, Usage};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::http_util::{ensure_success, race};

pub struct OpenAICompatProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OpenAICompatProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, CoreError> {
        if !matches!(
            config.kind,
            ProviderKind::OpenAI | ProviderKind::DeepSeek | ProviderKind::Custom
        ) {
            return Err(CoreError::internal(format!(
                "OpenAICompatProvider cannot back provider kind {}",
                config.kind.as_str()
            )));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| CoreError::internal(err.to_string()))?;
        Ok(Self { config, client })
    }

    fn chat_url(&self) -> String {
        match self.config.kind {
            ProviderKind::Custom => self.config.endpoint.clone(),
            _ => format!("{}/v1/chat/completions", self.config.endpoint.trim_end_matches('/')),
        }
    }

    fn models_url(&self) -> String {
        format!("{}/v1/models", self.config.endpoint.trim_end_matches('/'))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) if !key.is_empty() => builder.bearer_auth(key),
            _ => builder,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageOut,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
    #[serde(default)]
    total_tokens: Option<u32>,
}

#[async_trait]
impl Provider for OpenAICompatProvider {
    fn name(&self) -> &str {
        self.config.kind.as_str()
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
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": opts.max_tokens,
            "temperature": opts.temperature,
        });

        let req = self.authorize(self.client.post(self.chat_url()).json(&body));
        let resp = race(ctx, self.config.timeout, req.send()).await?;
        let resp = ensure_success(resp).await?;

        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|err| CoreError::bad_response(err.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CoreError::bad_response("no choices in chat completion response"))?;

        let usage = parsed
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok((text, usage))
    }

    async fn capabilities(&self, _ctx: &CancellationToken) -> Result<Vec<ModelInfo>, CoreError> {
        // Cloud chat-completions APIs get a static, build-time list rather
        // than a live discovery call (spec §4.A).
        Ok(vec![ModelInfo::new(self.config.default_model.clone())])
    }

    async fn health_check(&self, ctx: &CancellationToken) -> Result<Health, CoreError> {
        if matches!(self.config.kind, ProviderKind::Custom) {
            let started = Instant::now();
            let req = self.authorize(self.client.get(&self.config.endpoint));
            return match race(ctx, self.config.timeout, req.send()).await {
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
            };
        }

        let started = Instant::now();
        let req = self.authorize(self.client.get(self.models_url()));
        match race(ctx, self.config.timeout, req.send()).await {
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

    fn config(kind: &str, endpoint: Option<&str>) -> ProviderConfig {
        ProviderConfig::new(
            kind,
            endpoint.map(str::to_string),
            Some("test-key".to_string()),
            "gpt-4o-mini",
            1024,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn chat_url_for_openai_appends_standard_path() {
        let provider = OpenAICompatProvider::new(config("openai", Some("https://api.openai.com"))).unwrap();
        assert_eq!(provider.chat_url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn chat_url_for_custom_uses_endpoint_verbatim() {
        let provider =
            OpenAICompatProvider::new(config("custom", Some("https://example.test/generate"))).unwrap();
        assert_eq!(provider.chat_url(), "https://example.test/generate");
    }

    #[test]
    fn deepseek_defaults_to_well_known_endpoint() {
        let provider = OpenAICompatProvider::new(config("deepseek", None)).unwrap();
        assert_eq!(provider.chat_url(), "https://api.deepseek.com/v1/chat/completions");
    }

    #[test]
    fn rejects_mismatched_kind() {
        let cfg = ProviderConfig::new(
            "ollama",
            None,
            None,
            "qwen2",
            1024,
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(OpenAICompatProvider::new(cfg).is_err());
    }

    #[tokio::test]
    async fn generate_against_unreachable_host_is_transport_error() {
        let provider =
            OpenAICompatProvider::new(config("custom", Some("http://127.0.0.1:1"))).unwrap();
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
    async fn capabilities_are_static() {
        let provider = OpenAICompatProvider::new(config("openai", Some("https://api.openai.com"))).unwrap();
        let ctx = CancellationToken::new();
        let models = provider.capabilities(&ctx).await.unwrap();
        assert_eq!(models, vec![ModelInfo::new("gpt-4o-mini")]);
    }
}

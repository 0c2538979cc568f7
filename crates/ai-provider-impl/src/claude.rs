//! Anthropic Messages API client (spec §4.B / §3 — `claude` provider kind).
//! Distinct from the chat-completions family: `x-api-key` + `anthropic-version`
//! headers, and a response shape with a `content` block array instead of
//! `choices`.

use std::time::Instant;

use ai_provider_core::{CoreError, GenerateOptions, Health, ModelInfo, Provider, ProviderConfig, ProviderKind, Usage};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::http_util::{ensure_success, race};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct ClaudeProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl ClaudeProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, CoreError> {
        if !matches!(config.kind, ProviderKind::Claude) {
            return Err(CoreError::internal("ClaudeProvider requires kind=claude"));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| CoreError::internal(err.to_string()))?;
        Ok(Self { config, client })
    }

    fn base_url(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let key = self.config.api_key.as_deref().unwrap_or("");
        builder
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: Option<u32>,
    #[serde(default)]
    output_tokens: Option<u32>,
}

#[async_trait]
impl Provider for ClaudeProvider {
    fn name(&self) -> &str {
        "claude"
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
            "max_tokens": opts.max_tokens,
            "temperature": opts.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });

        let url = format!("{}/v1/messages", self.base_url());
        let req = self.authorize(self.client.post(url).json(&body));
        let resp = race(ctx, self.config.timeout, req.send()).await?;
        let resp = ensure_success(resp).await?;

        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|err| CoreError::bad_response(err.to_string()))?;

        let text = parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| CoreError::bad_response("no text content block in messages response"))?;

        let usage = parsed
            .usage
            .map(|u| Usage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: match (u.input_tokens, u.output_tokens) {
                    (Some(i), Some(o)) => Some(i + o),
                    _ => None,
                },
            })
            .unwrap_or_default();

        Ok((text, usage))
    }

    async fn capabilities(&self, _ctx: &CancellationToken) -> Result<Vec<ModelInfo>, CoreError> {
        Ok(vec![ModelInfo::new(self.config.default_model.clone())])
    }

    async fn health_check(&self, ctx: &CancellationToken) -> Result<Health, CoreError> {
        let started = Instant::now();
        let url = format!("{}/v1/models", self.base_url());
        let req = self.authorize(self.client.get(url));
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

//! Maps a decoded method to an `AIManager` operation and encodes the
//! result back into the flat envelope (spec §4.G). The sole place in the
//! core that translates `ProviderErrorKind` into a host-visible status
//! code (spec §7).

use std::sync::Arc;

use ai_manager::{AIManager, GenerateRequest};
use ai_provider_core::{CoreError, ProviderErrorKind};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::confidence;
use crate::envelope::{RawRequest, RawResponse};
use crate::parser::{self, ParsedRequest};

const SUPPORTED_METHODS: [&str; 5] = ["generate", "models", "capabilities", "test_connection", "discover"];
const SUPPORTED_PROVIDER_KINDS: [&str; 5] = ["ollama", "openai", "deepseek", "claude", "custom"];

pub struct Dispatcher {
    manager: Arc<AIManager>,
}

impl Dispatcher {
    pub fn new(manager: Arc<AIManager>) -> Self {
        Self { manager }
    }

    /// Never returns an `Err` — every failure is encoded as a failure
    /// envelope so the transport layer always has one well-formed response
    /// to write back.
    pub async fn dispatch(&self, ctx: &CancellationToken, raw: RawRequest) -> RawResponse {
        match self.try_dispatch(ctx, raw).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(kind = %err.kind, message = %err.message, "rpc call failed");
                RawResponse::failure(err.message, json!({ "status": host_status(err.kind) }))
            }
        }
    }

    async fn try_dispatch(&self, ctx: &CancellationToken, raw: RawRequest) -> Result<RawResponse, CoreError> {
        let parsed = parser::parse(&raw)?;
        match parsed {
            ParsedRequest::Generate {
                prompt,
                dialect,
                schema,
                model,
                runtime_override,
            } => {
                self.handle_generate(ctx, prompt, dialect, schema, model, runtime_override)
                    .await
            }
            ParsedRequest::Models { provider_tag } => self.handle_models(ctx, &provider_tag).await,
            ParsedRequest::Capabilities => Ok(self.handle_capabilities()),
            ParsedRequest::TestConnection { provider_config } => {
                self.handle_test_connection(ctx, provider_config).await
            }
            ParsedRequest::Discover => self.handle_discover(ctx).await,
        }
    }

    async fn handle_generate(
        &self,
        ctx: &CancellationToken,
        prompt: String,
        dialect: String,
        schema: Option<String>,
        model: Option<String>,
        runtime_override: Option<ai_provider_core::ProviderConfig>,
    ) -> Result<RawResponse, CoreError> {
        let request = GenerateRequest {
            prompt,
            dialect: dialect.clone(),
            schema,
            preferred_model: model,
            runtime_override,
        };
        let outcome = self.manager.generate(ctx, request).await?;

        let confidence = confidence::estimate(&outcome.text, &dialect);
        let explanation = format!(
            "Generated a {dialect} statement using model '{}' via provider '{}'.",
            outcome.model, outcome.provider
        );

        let meta = json!({
            "model": outcome.model,
            "provider": outcome.provider,
            "confidence": confidence,
            "processing_ms": outcome.duration.as_millis() as u64,
            "token_usage": {
                "prompt_tokens": outcome.usage.prompt_tokens,
                "completion_tokens": outcome.usage.completion_tokens,
                "total_tokens": outcome.usage.total_tokens,
            },
            "explanation": explanation,
        });

        Ok(RawResponse::success(json!(outcome.text), meta))
    }

    async fn handle_models(&self, ctx: &CancellationToken, provider_tag: &str) -> Result<RawResponse, CoreError> {
        let models = self.manager.list_models(ctx, provider_tag).await?;
        let content = json!(models
            .into_iter()
            .map(|m| json!({ "name": m.name, "description": m.description }))
            .collect::<Vec<_>>());
        Ok(RawResponse::success(content, json!({ "provider": provider_tag })))
    }

    fn handle_capabilities(&self) -> RawResponse {
        let content = json!({
            "methods": SUPPORTED_METHODS,
            "provider_kinds": SUPPORTED_PROVIDER_KINDS,
            "version": env!("CARGO_PKG_VERSION"),
        });
        RawResponse::success(content, json!({}))
    }

    async fn handle_test_connection(
        &self,
        ctx: &CancellationToken,
        provider_config: ai_provider_core::ProviderConfig,
    ) -> Result<RawResponse, CoreError> {
        let result = self.manager.test_connection(ctx, provider_config).await?;
        let content = json!({
            "success": result.success,
            "message": result.message,
            "response_time_ms": result.response_time.as_millis() as u64,
            "provider_kind": result.provider_kind,
        });
        Ok(RawResponse::success(content, json!({})))
    }

    async fn handle_discover(&self, ctx: &CancellationToken) -> Result<RawResponse, CoreError> {
        let providers = self.manager.discover_providers(ctx).await?;
        let content = json!(providers
            .into_iter()
            .map(|p| json!({
                "provider": p.provider,
                "available": p.available,
                "endpoint": p.endpoint,
                "models": p.models.into_iter().map(|m| m.name).collect::<Vec<_>>(),
            }))
            .collect::<Vec<_>>());
        Ok(RawResponse::success(content, json!({})))
    }
}

/// Spec §7 propagation table.
fn host_status(kind: ProviderErrorKind) -> &'static str {
    match kind {
        ProviderErrorKind::BadRequest => "InvalidArgument",
        ProviderErrorKind::ProviderNotFound => "NotFound",
        ProviderErrorKind::NoClientsAvailable | ProviderErrorKind::ManagerClosed => "FailedPrecondition",
        ProviderErrorKind::Transport | ProviderErrorKind::ServerError | ProviderErrorKind::RateLimit => "Unavailable",
        ProviderErrorKind::Timeout => "DeadlineExceeded",
        ProviderErrorKind::Canceled => "Canceled",
        ProviderErrorKind::ClientError | ProviderErrorKind::BadResponse | ProviderErrorKind::Internal => "Internal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai_common::{AiConfig, RetryConfig, ServiceConfig};
    use std::collections::BTreeMap;
    use std::time::Duration;

    // Points at a closed loopback port so `generate` fails fast and
    // deterministically without a live upstream.
    async fn manager_with_unreachable_ollama() -> AIManager {
        let mut services = BTreeMap::new();
        services.insert(
            "ollama".to_string(),
            ServiceConfig {
                enabled: true,
                provider: "ollama".to_string(),
                endpoint: Some("http://127.0.0.1:1".to_string()),
                api_key: None,
                model: "qwen2".to_string(),
                max_tokens: 64,
                timeout: Duration::from_millis(200),
                priority: 0,
            },
        );
        let config = AiConfig {
            default_service: "ollama".to_string(),
            fallback_order: Vec::new(),
            timeout: Duration::from_secs(5),
            services,
            retry: RetryConfig {
                max_attempts: 1,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                multiplier: 2.0,
                jitter: false,
            },
        };
        AIManager::new(config).await.unwrap()
    }

    fn raw(key: &str, sql: Option<&str>) -> RawRequest {
        RawRequest {
            kind: "ai".to_string(),
            key: key.to_string(),
            sql: sql.map(str::to_string),
            config: None,
        }
    }

    #[tokio::test]
    async fn unknown_method_yields_invalid_argument_status() {
        let dispatcher = Dispatcher::new(Arc::new(manager_with_unreachable_ollama().await));
        let ctx = CancellationToken::new();
        let response = dispatcher.dispatch(&ctx, raw("nope", None)).await;
        assert_eq!(response.success, "false");
        assert_eq!(response.meta["status"], "InvalidArgument");
    }

    #[tokio::test]
    async fn generate_against_unreachable_provider_yields_unavailable_status() {
        let dispatcher = Dispatcher::new(Arc::new(manager_with_unreachable_ollama().await));
        let ctx = CancellationToken::new();
        let response = dispatcher
            .dispatch(&ctx, raw("generate", Some(r#"{"prompt":"q","dialect":"mysql"}"#)))
            .await;
        assert_eq!(response.success, "false");
        assert_eq!(response.meta["status"], "Unavailable");
    }

    #[tokio::test]
    async fn capabilities_lists_supported_methods() {
        let dispatcher = Dispatcher::new(Arc::new(manager_with_unreachable_ollama().await));
        let ctx = CancellationToken::new();
        let response = dispatcher.dispatch(&ctx, raw("capabilities", None)).await;
        assert_eq!(response.success, "true");
        assert!(response.content["methods"].as_array().unwrap().len() == SUPPORTED_METHODS.len());
    }

    #[test]
    fn response_envelope_round_trips_through_json() {
        let response = RawResponse::success(json!("SELECT 1"), json!({ "provider": "ollama" }));
        let bytes = serde_json::to_vec(&response).unwrap();
        let decoded: RawResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, response);
    }
}

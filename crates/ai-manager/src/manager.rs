use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ai_common::AiConfig;
use ai_provider_core::{
    run_with_retry, CoreError, GenerateOptions, Health, ModelInfo, Provider, ProviderConfig,
    ProviderKind, RetryPolicy,
};
use ai_provider_impl::{build_provider, Discovery};
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::types::{GenerateOutcome, GenerateRequest, ProviderInfo, TestConnectionResult};

/// Low temperature favors deterministic SQL over creative phrasing; the
/// manager supplies it so no provider client hard-codes one (spec §4.B).
const GENERATE_TEMPERATURE: f32 = 0.2;

/// Caps `health_check_all` fan-out (spec §9 open question: unbounded
/// fan-out could hammer upstreams for large N; 8 is the chosen ceiling).
const MAX_HEALTH_CHECK_FANOUT: usize = 8;

struct ManagedClient {
    provider: Arc<dyn Provider>,
    config: ProviderConfig,
}

/// Owns the client pool and dispatches every manager-level operation
/// (spec §4.E). One instance per process; thread-safe via a read-write
/// lock around the client map.
pub struct AIManager {
    clients: RwLock<HashMap<String, ManagedClient>>,
    closed: AtomicBool,
    discovery: Discovery,
    default_service: String,
    fallback_order: Vec<String>,
    retry_policy: RetryPolicy,
}

impl AIManager {
    /// Builds one client per enabled service. Fails closed: the first
    /// construction error tears down every client already built and
    /// aborts (spec §4.E construction).
    pub async fn new(ai_config: AiConfig) -> Result<Self, CoreError> {
        let mut built: HashMap<String, ManagedClient> = HashMap::new();

        for (tag, service) in &ai_config.services {
            if !service.enabled {
                continue;
            }
            let provider_config = match ProviderConfig::new(
                &service.provider,
                service.endpoint.clone(),
                service.api_key.clone(),
                service.model.clone(),
                service.max_tokens,
                service.timeout,
            ) {
                Ok(config) => config,
                Err(err) => {
                    close_all(&built).await;
                    return Err(err);
                }
            };
            let provider = match build_provider(provider_config.clone()) {
                Ok(provider) => provider,
                Err(err) => {
                    close_all(&built).await;
                    return Err(err);
                }
            };
            built.insert(
                tag.clone(),
                ManagedClient {
                    provider,
                    config: provider_config,
                },
            );
        }

        if !built.contains_key(&ai_config.default_service) {
            close_all(&built).await;
            return Err(CoreError::bad_request(format!(
                "default_service '{}' has no corresponding enabled service entry",
                ai_config.default_service
            )));
        }

        let ollama_endpoint = ai_config
            .services
            .values()
            .find(|s| ProviderKind::parse_loose(&s.provider) == Some(ProviderKind::Ollama))
            .and_then(|s| s.endpoint.clone());

        let retry_policy = RetryPolicy {
            base: ai_config.retry.initial_delay,
            max_delay: ai_config.retry.max_delay,
            max_attempts: ai_config.retry.max_attempts.max(1),
        };

        Ok(Self {
            clients: RwLock::new(built),
            closed: AtomicBool::new(false),
            discovery: Discovery::new(ollama_endpoint),
            default_service: ai_config.default_service,
            fallback_order: ai_config.fallback_order,
            retry_policy,
        })
    }

    fn ensure_ready(&self) -> Result<(), CoreError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(CoreError::manager_closed())
        } else {
            Ok(())
        }
    }

    /// Default-then-fallback selection (spec §4.E step 2): try
    /// `default_service`, then walk `fallback_order`, then fall back to the
    /// lexicographically lowest tag for reproducible tests.
    async fn select_client(&self) -> Result<(String, Arc<dyn Provider>, ProviderConfig), CoreError> {
        let guard = self.clients.read().await;
        if let Some(client) = guard.get(&self.default_service) {
            return Ok((
                self.default_service.clone(),
                client.provider.clone(),
                client.config.clone(),
            ));
        }
        for tag in &self.fallback_order {
            if let Some(client) = guard.get(tag) {
                return Ok((tag.clone(), client.provider.clone(), client.config.clone()));
            }
        }
        if let Some((tag, client)) = guard.iter().min_by(|a, b| a.0.cmp(b.0)) {
            return Ok((tag.clone(), client.provider.clone(), client.config.clone()));
        }
        Err(CoreError::no_clients_available())
    }

    /// Model auto-selection (spec §9 open question): an explicit
    /// `preferred_model` wins, then the service's configured default, then
    /// the first entry of the provider's capability list. Never infers a
    /// quality ranking.
    async fn resolve_model(
        &self,
        ctx: &CancellationToken,
        provider: &Arc<dyn Provider>,
        preferred: Option<&str>,
        configured_default: &str,
    ) -> Result<Option<String>, CoreError> {
        if let Some(model) = preferred {
            if !model.is_empty() {
                return Ok(Some(model.to_string()));
            }
        }
        if !configured_default.is_empty() {
            return Ok(Some(configured_default.to_string()));
        }
        let models = provider.capabilities(ctx).await?;
        Ok(models.into_iter().next().map(|m| m.name))
    }

    /// Spec §4.E `generate`. Does not switch providers mid-retry: the
    /// selected client is re-used across attempts (failover only happens
    /// between independent requests).
    pub async fn generate(
        &self,
        ctx: &CancellationToken,
        request: GenerateRequest,
    ) -> Result<GenerateOutcome, CoreError> {
        self.ensure_ready()?;
        let started = Instant::now();

        let (provider_tag, provider, config, transient) = match request.runtime_override.clone() {
            Some(override_config) => {
                let provider = build_provider(override_config.clone())?;
                (
                    override_config.kind.as_str().to_string(),
                    provider,
                    override_config,
                    true,
                )
            }
            None => {
                let (tag, provider, config) = self.select_client().await?;
                (tag, provider, config, false)
            }
        };

        let model = match self
            .resolve_model(ctx, &provider, request.preferred_model.as_deref(), &config.default_model)
            .await
        {
            Ok(model) => model,
            Err(err) => {
                if transient {
                    let _ = provider.close().await;
                }
                return Err(err);
            }
        };

        let opts = GenerateOptions {
            model: model.clone(),
            max_tokens: config.max_tokens,
            temperature: GENERATE_TEMPERATURE,
        };
        let prompt = request.prompt.clone();
        let provider_for_attempts = provider.clone();

        let result = run_with_retry(ctx, &self.retry_policy, move |_attempt| {
            let provider = provider_for_attempts.clone();
            let prompt = prompt.clone();
            let opts = opts.clone();
            async move { provider.generate(ctx, &prompt, &opts).await }
        })
        .await;

        if transient {
            let _ = provider.close().await;
        }

        let (text, usage) = match result {
            Ok(ok) => ok,
            Err(err) => {
                tracing::warn!(provider = %provider_tag, %err, "generate failed");
                return Err(err);
            }
        };
        tracing::debug!(provider = %provider_tag, ?model, elapsed_ms = started.elapsed().as_millis(), "generate succeeded");
        Ok(GenerateOutcome {
            text,
            usage,
            model: model.unwrap_or_default(),
            provider: provider_tag,
            duration: started.elapsed(),
        })
    }

    /// Spec §4.E `listModels`. Single attempt, no retry.
    pub async fn list_models(
        &self,
        ctx: &CancellationToken,
        provider_tag: &str,
    ) -> Result<Vec<ModelInfo>, CoreError> {
        self.ensure_ready()?;
        let guard = self.clients.read().await;
        let client = guard
            .get(provider_tag)
            .ok_or_else(|| CoreError::provider_not_found(provider_tag))?;
        client.provider.capabilities(ctx).await
    }

    /// Spec §4.E `discoverProviders`. Never mutates the client map, never
    /// retries.
    pub async fn discover_providers(&self, ctx: &CancellationToken) -> Result<Vec<ProviderInfo>, CoreError> {
        self.ensure_ready()?;

        let local = self.discovery.probe().await;
        let mut infos = vec![ProviderInfo {
            provider: ProviderKind::Ollama.as_str().to_string(),
            available: local.available,
            endpoint: Some(local.endpoint),
            models: local.models,
        }];

        let snapshot: Vec<(String, Arc<dyn Provider>, ProviderConfig)> = {
            let guard = self.clients.read().await;
            guard
                .iter()
                .filter(|(_, client)| !matches!(client.config.kind, ProviderKind::Ollama))
                .map(|(tag, client)| (tag.clone(), client.provider.clone(), client.config.clone()))
                .collect()
        };

        for (tag, provider, config) in snapshot {
            let models = provider.capabilities(ctx).await.unwrap_or_default();
            infos.push(ProviderInfo {
                provider: tag,
                available: true,
                endpoint: Some(config.endpoint),
                models,
            });
        }

        Ok(infos)
    }

    /// Spec §4.E `testConnection`. The transient client is always closed
    /// before returning and is never added to the pool.
    pub async fn test_connection(
        &self,
        ctx: &CancellationToken,
        provider_config: ProviderConfig,
    ) -> Result<TestConnectionResult, CoreError> {
        self.ensure_ready()?;
        let provider = build_provider(provider_config.clone())?;
        let health = provider.health_check(ctx).await;
        let _ = provider.close().await;
        let health = health?;
        let mut result: TestConnectionResult = health.into();
        result.provider_kind = provider_config.kind.as_str().to_string();
        Ok(result)
    }

    pub async fn health_check(&self, ctx: &CancellationToken, provider_tag: &str) -> Result<Health, CoreError> {
        self.ensure_ready()?;
        let guard = self.clients.read().await;
        let client = guard
            .get(provider_tag)
            .ok_or_else(|| CoreError::provider_not_found(provider_tag))?;
        client.provider.health_check(ctx).await
    }

    /// Fans out with bounded parallelism (spec §9 open question).
    pub async fn health_check_all(&self, ctx: &CancellationToken) -> Result<HashMap<String, Health>, CoreError> {
        self.ensure_ready()?;

        let snapshot: Vec<(String, Arc<dyn Provider>)> = {
            let guard = self.clients.read().await;
            guard
                .iter()
                .map(|(tag, client)| (tag.clone(), client.provider.clone()))
                .collect()
        };

        let semaphore = Arc::new(Semaphore::new(MAX_HEALTH_CHECK_FANOUT));
        let mut tasks = Vec::with_capacity(snapshot.len());
        for (tag, provider) in snapshot {
            let semaphore = semaphore.clone();
            let ctx = ctx.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let health = provider.health_check(&ctx).await;
                (tag, health)
            }));
        }

        let mut results = HashMap::new();
        for task in tasks {
            match task.await {
                Ok((tag, Ok(health))) => {
                    results.insert(tag, health);
                }
                Ok((tag, Err(err))) => tracing::debug!(provider = %tag, %err, "health check failed"),
                Err(err) => tracing::warn!(%err, "health check task panicked"),
            }
        }
        Ok(results)
    }

    /// Idempotent: a second call is a no-op success (spec §8 property 9).
    pub async fn close(&self) -> Result<(), CoreError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("closing AI manager");
        let mut guard = self.clients.write().await;
        for (_, client) in guard.drain() {
            let _ = client.provider.close().await;
        }
        Ok(())
    }
}

async fn close_all(clients: &HashMap<String, ManagedClient>) {
    for client in clients.values() {
        let _ = client.provider.close().await;
    }
}

#[cfg(test)]
impl AIManager {
    /// Builds a manager directly from pre-built clients, bypassing
    /// `build_provider` so tests can inject stub providers.
    pub(crate) fn for_test(
        clients: Vec<(String, Arc<dyn Provider>, ProviderConfig)>,
        default_service: impl Into<String>,
        fallback_order: Vec<String>,
        retry_policy: RetryPolicy,
    ) -> Self {
        let mut map = HashMap::new();
        for (tag, provider, config) in clients {
            map.insert(tag, ManagedClient { provider, config });
        }
        Self {
            clients: RwLock::new(map),
            closed: AtomicBool::new(false),
            discovery: Discovery::new(None),
            default_service: default_service.into(),
            fallback_order,
            retry_policy,
        }
    }
}

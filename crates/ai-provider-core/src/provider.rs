use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::CoreError;

/// Per-call generation knobs (spec §4.A). The core supplies `temperature`
/// from request options; providers never hard-code one.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

/// Token counts reported by the upstream, if any (spec §3 "GenerateResponse").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// One entry of a provider's model list (spec §4.A "capabilities").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub description: Option<String>,
}

impl ModelInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Result of a reachability probe (spec §4.A "healthCheck").
#[derive(Debug, Clone)]
pub struct Health {
    pub healthy: bool,
    pub status: String,
    pub response_time: Duration,
}

/// The capability contract every provider client implements (spec §4.A,
/// §9 "model as a trait because multiple backing implementations exist").
///
/// Implementations must honor `ctx` cancellation at the request level and
/// must never retry internally — retrying is the Manager's job (spec §4.D).
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        ctx: &CancellationToken,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<(String, Usage), CoreError>;

    async fn capabilities(&self, ctx: &CancellationToken) -> Result<Vec<ModelInfo>, CoreError>;

    async fn health_check(&self, ctx: &CancellationToken) -> Result<Health, CoreError>;

    /// Releases transport resources. Idempotent.
    async fn close(&self) -> Result<(), CoreError> {
        Ok(())
    }
}
